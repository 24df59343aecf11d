//! Upload ledger: one entry per processed file.
//!
//! Records land in the document store under
//! `{storeRoot}/{storeId}/{subcollection}/{docId}`; the subcollection per
//! group comes from config. Writes are strict write-through: the in-memory
//! session view is updated only after the store accepts the document, so a
//! failed put is visible as a failure, never as phantom uploaded state.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::ProcessError;
use crate::store::DocumentStore;
use crate::types::{parse_date_key, Config, ReportGroup, UploadRecord};

pub struct Ledger {
    store: Arc<dyn DocumentStore>,
    config: Config,
    /// Records this process has durably written, per group, insertion order.
    session_files: Mutex<HashMap<ReportGroup, Vec<UploadRecord>>>,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> Self {
        let mut session_files = HashMap::new();
        for group in ReportGroup::ALL {
            session_files.insert(group, Vec::new());
        }
        Self {
            store,
            config: config.clone(),
            session_files: Mutex::new(session_files),
        }
    }

    /// Collection path for one store and group.
    fn collection_path(&self, store_id: &str, group: ReportGroup) -> String {
        format!(
            "{}/{}/{}",
            self.config.store_root,
            store_id,
            self.config.subcollection(group)
        )
    }

    fn doc_path(&self, record: &UploadRecord) -> String {
        format!(
            "{}/{}",
            self.collection_path(&record.store_id, record.group),
            record.doc_id()
        )
    }

    /// Merge a record into the ledger. Idempotent: a second put with the
    /// same key merges into the existing document. After the per-store
    /// write succeeds, a summary (record minus row data) is appended to the
    /// public feed; a feed failure is logged and does not fail the put.
    pub async fn put(&self, record: &UploadRecord) -> Result<(), ProcessError> {
        let path = self.doc_path(record);
        let payload = serde_json::to_value(record)
            .map_err(|e| ProcessError::StoreWriteFailed(e.to_string()))?;

        self.store
            .upsert_merge(&path, payload)
            .await
            .map_err(|e| ProcessError::StoreWriteFailed(e.to_string()))?;

        log::info!(
            "Saved {} ({}) -> {}",
            record.group.label().to_uppercase(),
            record.logical_type.label(),
            path
        );

        match self
            .store
            .append(&self.config.summary_feed, summary_value(record))
            .await
        {
            Ok(_) => log::debug!("Appended summary -> {}", self.config.summary_feed),
            Err(e) => log::warn!("Summary feed append failed: {e}"),
        }

        // Local echo only after the durable write above.
        if let Ok(mut files) = self.session_files.lock() {
            files.entry(record.group).or_default().push(record.clone());
        }
        Ok(())
    }

    /// Calendar dates with at least one daily record for the store.
    /// Records without a parseable date key cannot be placed on a calendar
    /// and are excluded.
    pub async fn uploaded_dates(&self, store_id: &str) -> Result<HashSet<NaiveDate>, ProcessError> {
        let collection = self.collection_path(store_id, ReportGroup::Daily);
        let docs = self
            .store
            .list(&collection)
            .await
            .map_err(|e| ProcessError::StoreUnavailable(e.to_string()))?;

        Ok(docs
            .iter()
            .filter_map(|doc| doc.get("dateKey").and_then(Value::as_str))
            .filter_map(parse_date_key)
            .collect())
    }

    /// Ledger entries for one store and group, in insertion order.
    /// Documents that no longer deserialize as records are skipped with a
    /// warning rather than failing the listing.
    pub async fn records_for_group(
        &self,
        store_id: &str,
        group: ReportGroup,
    ) -> Result<Vec<UploadRecord>, ProcessError> {
        let collection = self.collection_path(store_id, group);
        let docs = self
            .store
            .list(&collection)
            .await
            .map_err(|e| ProcessError::StoreUnavailable(e.to_string()))?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<UploadRecord>(doc) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping malformed ledger document in {collection}: {e}"),
            }
        }
        Ok(records)
    }

    /// Records written by this process during the current session.
    pub fn session_files(&self, group: ReportGroup) -> Vec<UploadRecord> {
        self.session_files
            .lock()
            .map(|files| files.get(&group).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

/// Summary document for the public feed: the record without its row data.
fn summary_value(record: &UploadRecord) -> Value {
    serde_json::json!({
        "storeId": record.store_id,
        "dateKey": record.date_key,
        "group": record.group,
        "logicalType": record.logical_type,
        "filename": record.filename,
        "sheetName": record.sheet_name,
        "rowCount": record.row_count,
        "processedAt": record.processed_at,
    })
}
