//! In-memory document backend using `DashMap`.
//!
//! Data is lost on process restart. Each namespace lives in its own map
//! entry, so a bulk insert or delete holds that entry exclusively and is
//! applied all-or-nothing.

use super::{DocumentBackend, Filter, Projection, WriteAck, WriteConcern, ID_FIELD};
use crate::table::Record;
use crate::{Error, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Record>,
    next_id: u64,
}

impl Collection {
    fn assign_id(&mut self) -> Value {
        self.next_id += 1;
        Value::String(format!("{:024x}", self.next_id))
    }
}

/// In-memory document backend.
///
/// Thread-safe; clones of a [`Database`](crate::Database) handle share one
/// instance, so every store sees every other store's writes immediately.
///
/// # Example
///
/// ```rust
/// use monster_lab::backend::{DocumentBackend, Filter, MemoryBackend};
///
/// # async fn example() -> monster_lab::Result<()> {
/// let backend = MemoryBackend::new();
/// backend.insert_many("db.monsters", vec![Default::default()]).await?;
/// assert_eq!(backend.count_documents("db.monsters", &Filter::all()).await?, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    collections: DashMap<String, Collection>,
    write_concern: WriteConcern,
}

impl MemoryBackend {
    /// Create an empty backend with acknowledged writes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_write_concern(WriteConcern::Acknowledged)
    }

    /// Create an empty backend with the given write concern.
    #[must_use]
    pub fn with_write_concern(write_concern: WriteConcern) -> Self {
        Self {
            collections: DashMap::new(),
            write_concern,
        }
    }

    /// Create with pre-allocated capacity for `capacity` namespaces.
    #[must_use]
    pub fn with_capacity(capacity: usize, write_concern: WriteConcern) -> Self {
        Self {
            collections: DashMap::with_capacity(capacity),
            write_concern,
        }
    }

    /// Get the configured write concern.
    #[must_use]
    pub const fn write_concern(&self) -> WriteConcern {
        self.write_concern
    }

    /// Namespaces that have been written to.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    fn ack(&self, affected: usize) -> WriteAck {
        WriteAck {
            acknowledged: self.write_concern == WriteConcern::Acknowledged,
            affected: affected as u64,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBackend for MemoryBackend {
    async fn insert_many(&self, namespace: &str, documents: Vec<Record>) -> Result<WriteAck> {
        let mut collection = self.collections.entry(namespace.to_string()).or_default();

        // Reject the whole batch on a duplicate caller-supplied id
        let mut seen: HashSet<String> = collection
            .documents
            .iter()
            .filter_map(|doc| doc.get(ID_FIELD).map(Value::to_string))
            .collect();
        for doc in &documents {
            if let Some(id) = doc.get(ID_FIELD) {
                if !seen.insert(id.to_string()) {
                    return Err(Error::Persistence(format!(
                        "Duplicate key {id} in '{namespace}'"
                    )));
                }
            }
        }

        let inserted = documents.len();
        for doc in documents {
            let stored = if doc.contains_key(ID_FIELD) {
                doc
            } else {
                let mut with_id = Record::with_capacity(doc.len() + 1);
                with_id.insert(ID_FIELD.to_string(), collection.assign_id());
                with_id.extend(doc);
                with_id
            };
            collection.documents.push(stored);
        }

        Ok(self.ack(inserted))
    }

    async fn delete_many(&self, namespace: &str, filter: &Filter) -> Result<WriteAck> {
        let Some(mut collection) = self.collections.get_mut(namespace) else {
            return Ok(self.ack(0));
        };

        let before = collection.documents.len();
        if filter.is_empty() {
            collection.documents.clear();
        } else {
            collection.documents.retain(|doc| !filter.matches(doc));
        }

        Ok(self.ack(before - collection.documents.len()))
    }

    async fn count_documents(&self, namespace: &str, filter: &Filter) -> Result<u64> {
        let count = self.collections.get(namespace).map_or(0, |collection| {
            if filter.is_empty() {
                collection.documents.len()
            } else {
                collection
                    .documents
                    .iter()
                    .filter(|doc| filter.matches(doc))
                    .count()
            }
        });
        Ok(count as u64)
    }

    async fn find(
        &self,
        namespace: &str,
        filter: &Filter,
        projection: &Projection,
    ) -> Result<Vec<Record>> {
        Ok(self
            .collections
            .get(namespace)
            .map(|collection| {
                collection
                    .documents
                    .iter()
                    .filter(|doc| filter.matches(doc))
                    .map(|doc| projection.apply(doc))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NS: &str = "Database.Collection";

    fn doc(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_first() {
        let backend = MemoryBackend::new();
        let ack = backend
            .insert_many(NS, vec![doc(json!({"a": 1})), doc(json!({"a": 2}))])
            .await
            .unwrap();

        assert!(ack.acknowledged);
        assert_eq!(ack.affected, 2);

        let docs = backend.find(NS, &Filter::all(), &Projection::all()).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].keys().next().map(String::as_str), Some(ID_FIELD));
        assert_ne!(docs[0][ID_FIELD], docs[1][ID_FIELD]);
    }

    #[tokio::test]
    async fn test_insert_empty_batch_is_noop() {
        let backend = MemoryBackend::new();
        let ack = backend.insert_many(NS, vec![]).await.unwrap();
        assert!(ack.acknowledged);
        assert_eq!(ack.affected, 0);
        assert_eq!(backend.count_documents(NS, &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejects_whole_batch() {
        let backend = MemoryBackend::new();
        let batch = vec![
            doc(json!({"_id": "same", "a": 1})),
            doc(json!({"_id": "same", "a": 2})),
        ];

        let result = backend.insert_many(NS, batch).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(backend.count_documents(NS, &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_with_filter() {
        let backend = MemoryBackend::new();
        backend
            .insert_many(
                NS,
                vec![
                    doc(json!({"kind": "x"})),
                    doc(json!({"kind": "y"})),
                    doc(json!({"kind": "x"})),
                ],
            )
            .await
            .unwrap();

        let ack = backend
            .delete_many(NS, &Filter::all().eq("kind", "x"))
            .await
            .unwrap();
        assert_eq!(ack.affected, 2);
        assert_eq!(backend.count_documents(NS, &Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_namespace() {
        let backend = MemoryBackend::new();
        let ack = backend.delete_many("nowhere", &Filter::all()).await.unwrap();
        assert!(ack.acknowledged);
        assert_eq!(ack.affected, 0);
    }

    #[tokio::test]
    async fn test_unacknowledged_writes_still_apply() {
        let backend = MemoryBackend::with_write_concern(WriteConcern::Unacknowledged);
        let ack = backend.insert_many(NS, vec![doc(json!({"a": 1}))]).await.unwrap();
        assert!(!ack.acknowledged);
        assert_eq!(backend.count_documents(NS, &Filter::all()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let backend = MemoryBackend::with_capacity(4, WriteConcern::Acknowledged);
        backend.insert_many("db.a", vec![doc(json!({"v": 1}))]).await.unwrap();
        backend.insert_many("db.b", vec![]).await.unwrap();

        assert_eq!(backend.count_documents("db.a", &Filter::all()).await.unwrap(), 1);
        assert_eq!(backend.count_documents("db.b", &Filter::all()).await.unwrap(), 0);
        assert_eq!(backend.namespaces(), vec!["db.a", "db.b"]);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        use std::sync::Arc;

        let backend = Arc::new(MemoryBackend::new());
        let mut handles = vec![];

        for i in 0..20 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                let docs = (0..5).map(|j| doc(json!({"writer": i, "n": j}))).collect();
                backend.insert_many(NS, docs).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(backend.count_documents(NS, &Filter::all()).await.unwrap(), 100);
    }
}
