//! Document store boundary
//!
//! A document backend owns named collections of flat documents. Bulk insert
//! and bulk delete are the only mutating operations; both report an
//! acknowledgment flag. Every stored document carries a reserved identifier
//! field ([`ID_FIELD`]) assigned by the backend.
//!
//! # Example
//!
//! ```rust
//! use monster_lab::backend::{DocumentBackend, Filter, MemoryBackend, Projection, ID_FIELD};
//! use serde_json::json;
//!
//! # async fn example() -> monster_lab::Result<()> {
//! let backend = MemoryBackend::new();
//! let doc = json!({"Name": "Imp", "Level": 1}).as_object().cloned().unwrap_or_default();
//!
//! let ack = backend.insert_many("Database.Collection", vec![doc]).await?;
//! assert!(ack.acknowledged);
//!
//! let docs = backend
//!     .find("Database.Collection", &Filter::all(), &Projection::exclude([ID_FIELD]))
//!     .await?;
//! assert!(!docs[0].contains_key(ID_FIELD));
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryBackend;

use crate::table::Record;
use crate::Result;
use serde_json::Value;
use std::future::Future;

/// Reserved per-document identifier field
pub const ID_FIELD: &str = "_id";

/// Write acknowledgment policy for a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConcern {
    /// Writes report `acknowledged = true` once applied (default)
    #[default]
    Acknowledged,
    /// Fire-and-forget: writes are applied but never acknowledged
    Unacknowledged,
}

/// Outcome of a bulk write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    /// Whether the backend confirmed the write was durably applied
    pub acknowledged: bool,
    /// Number of documents inserted or deleted
    pub affected: u64,
}

/// Equality filter over document fields. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Record,
}

impl Filter {
    /// Match-all filter
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `field == value`
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// True for the match-all filter
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check a document against every condition
    #[must_use]
    pub fn matches(&self, document: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

/// Field projection applied to documents returned by [`DocumentBackend::find`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    excluded: Vec<String>,
}

impl Projection {
    /// Return documents unchanged
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Drop the given fields from every returned document
    #[must_use]
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply the projection to one document
    #[must_use]
    pub fn apply(&self, document: &Record) -> Record {
        document
            .iter()
            .filter(|(field, _)| !self.excluded.iter().any(|excluded| excluded == *field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}

/// Document database driver.
///
/// Collections are addressed by namespace (`"<database>.<collection>"`).
/// Each call is atomic as a single request; nothing spans multiple calls.
pub trait DocumentBackend: Send + Sync {
    /// Insert documents in one bulk operation.
    ///
    /// Documents without an [`ID_FIELD`] get one assigned. An empty batch is a
    /// legal no-op.
    fn insert_many(
        &self,
        namespace: &str,
        documents: Vec<Record>,
    ) -> impl Future<Output = Result<WriteAck>> + Send;

    /// Delete every document matching `filter`.
    fn delete_many(
        &self,
        namespace: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<WriteAck>> + Send;

    /// Count documents matching `filter`.
    fn count_documents(
        &self,
        namespace: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Return matching documents in insertion order, projected.
    fn find(
        &self,
        namespace: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> impl Future<Output = Result<Vec<Record>>> + Send;
}
