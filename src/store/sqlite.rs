//! SQLite-backed document store.
//!
//! The database lives at `~/.storekpi/storekpi.db` (overridable via config)
//! and holds one row per document: collection, document id, and the JSON
//! body. WAL mode keeps concurrent reads cheap. Insertion order is the
//! rowid, and a merge updates the body in place without moving the row, so
//! collection listings keep first-insertion order across merges.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{merge_fields, split_doc_path, DocumentStore, StoreError};
use crate::types::Config;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(collection, doc_id)
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
";

pub struct SqliteStore {
    // rusqlite::Connection is Send but not Sync; document writes are small
    // enough that a single guarded connection is not a bottleneck here.
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at its configured location and apply
    /// the schema.
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        let path = match &config.db_path {
            Some(custom) => PathBuf::from(custom),
            None => Self::default_db_path()?,
        };
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn default_db_path() -> Result<PathBuf, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeDirNotFound)?;
        Ok(home.join(".storekpi").join("storekpi.db"))
    }

    fn merge_doc(
        conn: &Connection,
        collection: &str,
        doc_id: &str,
        doc: Value,
    ) -> Result<(), StoreError> {
        let existing: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
                params![collection, doc_id],
                |row| row.get(0),
            )
            .optional()?;

        let now = Utc::now().to_rfc3339();
        match existing {
            Some(body) => {
                let mut merged: Value = serde_json::from_str(&body)?;
                merge_fields(&mut merged, doc);
                conn.execute(
                    "UPDATE documents SET body = ?1, updated_at = ?2
                     WHERE collection = ?3 AND doc_id = ?4",
                    params![serde_json::to_string(&merged)?, now, collection, doc_id],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO documents (collection, doc_id, body, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![collection, doc_id, serde_json::to_string(&doc)?, now],
                )?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert_merge(&self, path: &str, doc: Value) -> Result<(), StoreError> {
        let (collection, doc_id) = split_doc_path(path)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Self::merge_doc(&conn, collection, doc_id, doc)
    }

    async fn append(&self, collection: &str, doc: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO documents (collection, doc_id, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                collection,
                id,
                serde_json::to_string(&doc)?,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(id)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let (collection, doc_id) = split_doc_path(path)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_id = ?2",
                params![collection, doc_id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT body FROM documents WHERE collection = ?1 ORDER BY id ASC",
        )?;
        let bodies = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut docs = Vec::with_capacity(bodies.len());
        for body in bodies {
            docs.push(serde_json::from_str(&body)?);
        }
        Ok(docs)
    }
}
