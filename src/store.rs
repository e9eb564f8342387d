//! Store - collection handle over a document backend
//!
//! One `Store` addresses exactly one named collection through an injected
//! [`Database`] handle. Stores built from clones of the same handle share
//! the backend and observe each other's writes immediately.
//!
//! Only `seed`/`insert_records` and `reset` mutate. Unacknowledged writes
//! surface as [`Error::Persistence`].

use crate::backend::{DocumentBackend, Filter, MemoryBackend, Projection, WriteAck, ID_FIELD};
use crate::generator::{MonsterGenerator, RecordGenerator};
use crate::table::{Record, Table, EMPTY_TABLE};
use crate::{Database, Error, Result};

/// Batch size used when seeding a fresh collection
pub const DEFAULT_SEED_AMOUNT: usize = 1000;

/// Access object for one document collection.
///
/// ## Example
///
/// ```rust
/// use monster_lab::Database;
///
/// # async fn example() -> monster_lab::Result<()> {
/// let db = Database::builder().build()?;
/// let store = db.collection("Collection")?;
///
/// store.reset().await?;
/// store.seed(25).await?;
/// assert_eq!(store.count().await?, 25);
///
/// let table = store.export().await?;
/// assert_eq!(table.num_rows(), 25);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Store<B: DocumentBackend = MemoryBackend> {
    database: Database<B>,
    collection: String,
    namespace: String,
}

impl<B: DocumentBackend> Clone for Store<B> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            collection: self.collection.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<B: DocumentBackend> Store<B> {
    pub(crate) fn new(database: Database<B>, collection: String) -> Self {
        let namespace = database.namespace(&collection);
        Self {
            database,
            collection,
            namespace,
        }
    }

    /// Get the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Get the database handle this store was built from.
    #[must_use]
    pub const fn database(&self) -> &Database<B> {
        &self.database
    }

    /// Insert `amount` random monster records in one bulk write.
    ///
    /// `amount = 0` is a legal no-op insert.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection is closed or the write is not
    /// acknowledged
    pub async fn seed(&self, amount: usize) -> Result<WriteAck> {
        let mut generator = MonsterGenerator::new();
        self.seed_with(&mut generator, amount).await
    }

    /// Insert `amount` records from `generator` in one bulk write.
    ///
    /// Every record must carry exactly the generator's declared schema; the
    /// batch is validated in full before anything is written.
    ///
    /// # Errors
    ///
    /// - Generator failures, unchanged
    /// - `InvalidInput` if a record deviates from the declared schema
    /// - `Persistence` if the connection is closed or the write is not acknowledged
    pub async fn seed_with<G>(&self, generator: &mut G, amount: usize) -> Result<WriteAck>
    where
        G: RecordGenerator + Send + ?Sized,
    {
        self.database.ensure_open()?;

        let schema = generator.schema();
        let mut records = Vec::with_capacity(amount);
        for _ in 0..amount {
            let record = generator.generate()?;
            if !schema.conforms(&record) {
                return Err(Error::InvalidInput(format!(
                    "Generated record does not match schema v{} ({} fields expected, got {:?})",
                    schema.version,
                    schema.fields.len(),
                    record.keys().collect::<Vec<_>>()
                )));
            }
            records.push(record);
        }

        tracing::info!(
            collection = %self.collection,
            amount,
            schema_version = schema.version,
            "seeding collection"
        );
        self.insert_records(records).await
    }

    /// Insert caller-supplied records in one bulk write.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection is closed or the write is not
    /// acknowledged
    pub async fn insert_records(&self, records: Vec<Record>) -> Result<WriteAck> {
        self.database.ensure_open()?;
        let ack = self
            .database
            .backend()
            .insert_many(&self.namespace, records)
            .await?;
        self.require_ack(ack, "insert")
    }

    /// Delete every document in the collection.
    ///
    /// Idempotent: resetting an empty collection succeeds.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection is closed or the delete is not
    /// acknowledged
    pub async fn reset(&self) -> Result<WriteAck> {
        self.database.ensure_open()?;
        let ack = self
            .database
            .backend()
            .delete_many(&self.namespace, &Filter::all())
            .await?;
        tracing::info!(collection = %self.collection, deleted = ack.affected, "collection reset");
        self.require_ack(ack, "delete")
    }

    /// Exact number of documents at call time.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection is closed
    pub async fn count(&self) -> Result<u64> {
        self.database.ensure_open()?;
        let count = self
            .database
            .backend()
            .count_documents(&self.namespace, &Filter::all())
            .await?;
        tracing::debug!(collection = %self.collection, count, "counted documents");
        Ok(count)
    }

    /// All documents, minus `_id`, as a tabular view.
    ///
    /// An empty collection yields [`Table::empty`].
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the connection is closed, or an Arrow error if
    /// the documents cannot be materialized
    pub async fn export(&self) -> Result<Table> {
        self.database.ensure_open()?;
        let documents = self
            .database
            .backend()
            .find(&self.namespace, &Filter::all(), &Projection::exclude([ID_FIELD]))
            .await?;
        tracing::debug!(collection = %self.collection, rows = documents.len(), "exported documents");
        Table::from_records(&documents)
    }

    /// Text grid of [`export`](Self::export), or `"None"` when the collection is empty.
    ///
    /// # Errors
    ///
    /// Same as [`export`](Self::export)
    pub async fn render_table(&self) -> Result<String> {
        if self.count().await? == 0 {
            return Ok(EMPTY_TABLE.to_string());
        }
        self.export().await?.render()
    }

    /// HTML table of [`export`](Self::export), or `"None"` when the collection is empty.
    ///
    /// # Errors
    ///
    /// Same as [`export`](Self::export)
    pub async fn html_table(&self) -> Result<String> {
        if self.count().await? == 0 {
            return Ok(EMPTY_TABLE.to_string());
        }
        self.export().await?.to_html()
    }

    fn require_ack(&self, ack: WriteAck, operation: &str) -> Result<WriteAck> {
        if ack.acknowledged {
            Ok(ack)
        } else {
            tracing::warn!(collection = %self.collection, operation, "write not acknowledged");
            Err(Error::Persistence(format!(
                "Bulk {operation} on '{}' was not acknowledged",
                self.collection
            )))
        }
    }
}
