//! Document store seam.
//!
//! The ledger persists through a narrow, path-addressed document API:
//! upsert-with-merge at a full document path, append-only insert into a
//! collection, point reads, and ordered collection listings. Paths are
//! slash-separated segments, `root/{storeId}/{subcollection}/{docId}`.
//!
//! Two backends: [`sqlite::SqliteStore`] for durable local state and
//! [`MemoryStore`] for tests.

pub mod sqlite;

use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Errors specific to document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Path-addressed document API. Upserts merge shallowly, appends generate
/// their own document ids, and listings come back in insertion order.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Merge `doc` into the document at `path`, creating it when absent.
    /// Overlapping top-level fields are overwritten, last write wins;
    /// fields absent from `doc` are preserved.
    async fn upsert_merge(&self, path: &str, doc: Value) -> Result<(), StoreError>;

    /// Insert `doc` into `collection` under a generated id. Returns the id.
    async fn append(&self, collection: &str, doc: Value) -> Result<String, StoreError>;

    /// Read the document at `path`, if present.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// All documents directly inside `collection`, in insertion order.
    /// A merge keeps a document's original position.
    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError>;
}

/// Split a document path into `(collection, doc_id)`.
pub(crate) fn split_doc_path(path: &str) -> Result<(&str, &str), StoreError> {
    match path.rsplit_once('/') {
        Some((collection, doc_id)) if !collection.is_empty() && !doc_id.is_empty() => {
            Ok((collection, doc_id))
        }
        _ => Err(StoreError::InvalidPath(path.to_string())),
    }
}

/// Shallow field merge: top-level fields of `incoming` overwrite those of
/// `existing`; everything else is preserved. Non-object documents are
/// replaced outright.
pub(crate) fn merge_fields(existing: &mut Value, incoming: Value) {
    match (existing.as_object_mut(), incoming) {
        (Some(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (_, incoming) => *existing = incoming,
    }
}

/// In-memory document store. Backs tests and offline inspection; keeps
/// documents in insertion order like the SQLite backend.
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<Vec<(String, Value)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents held, across all collections.
    pub fn len(&self) -> usize {
        self.docs.lock().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_merge(&self, path: &str, doc: Value) -> Result<(), StoreError> {
        split_doc_path(path)?;
        let mut docs = self.docs.lock().map_err(|_| StoreError::LockPoisoned)?;
        match docs.iter_mut().find(|(p, _)| p == path) {
            Some((_, existing)) => merge_fields(existing, doc),
            None => docs.push((path.to_string(), doc)),
        }
        Ok(())
    }

    async fn append(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut docs = self.docs.lock().map_err(|_| StoreError::LockPoisoned)?;
        docs.push((format!("{collection}/{id}"), doc));
        Ok(id)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let docs = self.docs.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(docs
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, doc)| doc.clone()))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let docs = self.docs.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(docs
            .iter()
            .filter(|(p, _)| {
                p.strip_prefix(collection)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|doc_id| !doc_id.contains('/'))
            })
            .map(|(_, doc)| doc.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_split_doc_path() {
        let (collection, doc_id) =
            split_doc_path("stores/4340/daily_kpi/20251102_daily_kpi").unwrap();
        assert_eq!(collection, "stores/4340/daily_kpi");
        assert_eq!(doc_id, "20251102_daily_kpi");
        assert!(split_doc_path("no-slashes").is_err());
        assert!(split_doc_path("trailing/").is_err());
    }

    #[test]
    fn test_merge_fields_overwrites_and_preserves() {
        let mut existing = json!({"a": 1, "b": "keep"});
        merge_fields(&mut existing, json!({"a": 2, "c": true}));
        assert_eq!(existing, json!({"a": 2, "b": "keep", "c": true}));
    }

    #[tokio::test]
    async fn test_memory_upsert_merges_in_place() {
        let store = MemoryStore::new();
        store
            .upsert_merge("stores/4340/daily_kpi/doc", json!({"rows": 3}))
            .await
            .unwrap();
        store
            .upsert_merge("stores/4340/daily_kpi/doc", json!({"rows": 5, "x": 1}))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let doc = store.get("stores/4340/daily_kpi/doc").await.unwrap().unwrap();
        assert_eq!(doc, json!({"rows": 5, "x": 1}));
    }

    #[tokio::test]
    async fn test_memory_list_is_direct_children_in_order() {
        let store = MemoryStore::new();
        store
            .upsert_merge("stores/4340/daily_kpi/b", json!({"n": 1}))
            .await
            .unwrap();
        store
            .upsert_merge("stores/4340/daily_kpi/a", json!({"n": 2}))
            .await
            .unwrap();
        // Different collection and nested path stay out of the listing.
        store
            .upsert_merge("stores/4341/daily_kpi/c", json!({"n": 3}))
            .await
            .unwrap();

        let docs = store.list("stores/4340/daily_kpi").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0], json!({"n": 1}));
        assert_eq!(docs[1], json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_memory_append_generates_distinct_ids() {
        let store = MemoryStore::new();
        let a = store.append("public/kpi_reports", json!({"n": 1})).await.unwrap();
        let b = store.append("public/kpi_reports", json!({"n": 2})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list("public/kpi_reports").await.unwrap().len(), 2);
    }
}
