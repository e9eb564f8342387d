//! # monster-lab: Record Store + Rarity Classifier
//!
//! **Version**: 0.1.0
//!
//! monster-lab keeps monster records in a document collection, materializes
//! them as an Arrow tabular view, and trains a random forest that predicts a
//! record's rarity with a confidence score.
//!
//! ## Data Flow
//!
//! ```text
//! Store::seed ──> collection ──> Store::export ──> Table ──> Model::train
//!                                                              │
//!                         Model::predict <── Model::restore <── Model::save
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use monster_lab::generator::{MONSTER_FEATURES, RARITY_FIELD};
//! use monster_lab::{Database, Model};
//!
//! # async fn example() -> monster_lab::Result<()> {
//! let db = Database::builder().build()?;
//! let store = db.collection("Collection")?;
//! store.seed(1000).await?;
//!
//! let mut columns = MONSTER_FEATURES.to_vec();
//! columns.push(RARITY_FIELD);
//! let table = store.export().await?.select(&columns)?;
//!
//! let model = Model::fit(&table, RARITY_FIELD)?;
//! let row = table.row(0)?.drop_columns(&[RARITY_FIELD])?;
//! let prediction = model.predict(&row)?;
//! println!("{} ({:.2})", prediction.label, prediction.confidence);
//! println!("{}", model.describe()?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod backend;
pub mod error;
pub mod generator;
pub mod logging;
pub mod model;
pub mod store;
pub mod table;

pub use error::{Error, Result};
pub use model::{Model, Prediction};
pub use store::Store;
pub use table::{Record, Table};

use backend::{DocumentBackend, MemoryBackend, WriteConcern};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default database name
pub const DEFAULT_DATABASE: &str = "Database";

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "Collection";

/// Database connection handle
///
/// Explicitly constructed and explicitly closed. Clones share the same
/// backend and the same open/closed state; every [`Store`] built from the
/// handle (or any clone) fails with [`Error::Persistence`] once it is closed.
#[derive(Debug)]
pub struct Database<B: DocumentBackend = MemoryBackend> {
    name: String,
    backend: Arc<B>,
    closed: Arc<AtomicBool>,
}

impl<B: DocumentBackend> Clone for Database<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: Arc::clone(&self.backend),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl Database {
    /// Create a new database builder (in-memory backend)
    #[must_use]
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }
}

impl<B: DocumentBackend> Database<B> {
    /// Wrap an existing backend
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is empty or contains `.`
    pub fn with_backend(name: impl Into<String>, backend: B) -> Result<Self> {
        let name = name.into();
        validate_name("database", &name)?;
        Ok(Self {
            name,
            backend: Arc::new(backend),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the database name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the shared backend
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open a handle to one collection
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the collection name is empty or contains `.`
    pub fn collection(&self, name: impl Into<String>) -> Result<Store<B>> {
        let name = name.into();
        validate_name("collection", &name)?;
        Ok(Store::new(self.clone(), name))
    }

    /// Close the connection for every clone of this handle
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(database = %self.name, "database connection closed");
        }
    }

    /// Check whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Persistence(format!(
                "Connection to database '{}' is closed",
                self.name
            )))
        } else {
            Ok(())
        }
    }

    pub(crate) fn namespace(&self, collection: &str) -> String {
        format!("{}.{collection}", self.name)
    }
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{kind} name must not be empty")));
    }
    if name.contains('.') {
        return Err(Error::InvalidInput(format!(
            "{kind} name '{name}' must not contain '.'"
        )));
    }
    Ok(())
}

/// Database builder
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    name: String,
    write_concern: WriteConcern,
    capacity: usize,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            name: DEFAULT_DATABASE.to_string(),
            write_concern: WriteConcern::default(),
            capacity: 0,
        }
    }
}

impl DatabaseBuilder {
    /// Set the database name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the write acknowledgment policy
    #[must_use]
    pub const fn write_concern(mut self, write_concern: WriteConcern) -> Self {
        self.write_concern = write_concern;
        self
    }

    /// Pre-allocate room for this many collections
    #[must_use]
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Build the database
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name is empty or contains `.`
    pub fn build(self) -> Result<Database> {
        let backend = MemoryBackend::with_capacity(self.capacity, self.write_concern);
        let database = Database::with_backend(self.name, backend)?;
        tracing::debug!(
            database = %database.name,
            write_concern = ?self.write_concern,
            "database opened"
        );
        Ok(database)
    }
}
