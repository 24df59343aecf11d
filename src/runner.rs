//! Batch ingestion: classify, extract, and record each workbook.
//!
//! A batch is one uploaded file: either a single workbook or a zip of
//! them. Archive entries are processed independently and concurrently; one
//! entry's failure never aborts its siblings. The batch always completes
//! and reports a mixed success/failure list ("wait for all, collect
//! errors"). There is no cancellation: a batch in flight runs to
//! completion.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::archive;
use crate::classifier;
use crate::error::{EntryFailure, ProcessError};
use crate::ledger::Ledger;
use crate::types::{ReportGroup, UploadRecord};
use crate::workbook::{self, ExtractMode};

/// Outcome of one batch: every entry lands in exactly one list.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub succeeded: Vec<UploadRecord>,
    pub failed: Vec<EntryFailure>,
}

impl BatchReport {
    pub fn summary_line(&self) -> String {
        format!(
            "{} succeeded / {} failed",
            self.succeeded.len(),
            self.failed.len()
        )
    }

    fn single_failure(name: &str, err: ProcessError) -> Self {
        Self {
            succeeded: Vec::new(),
            failed: vec![EntryFailure::new(name, &err)],
        }
    }
}

/// Ingest one uploaded file into the ledger.
///
/// `group_hint` is the bucket the user was uploading into; each entry's
/// filename classification can override it.
pub async fn run_batch(
    ledger: Arc<Ledger>,
    group_hint: ReportGroup,
    filename: &str,
    bytes: Vec<u8>,
    uploaded_by: Option<String>,
) -> BatchReport {
    log::info!("[{}] Reading file: {}", group_hint.label().to_uppercase(), filename);

    if archive::is_archive_name(filename) {
        run_archive(ledger, group_hint, filename, bytes, uploaded_by).await
    } else if archive::is_spreadsheet_name(filename) {
        match process_entry(ledger, group_hint, filename.to_string(), bytes, uploaded_by).await {
            Ok(record) => BatchReport {
                succeeded: vec![record],
                failed: Vec::new(),
            },
            Err(err) => BatchReport::single_failure(filename, err),
        }
    } else {
        BatchReport::single_failure(
            filename,
            ProcessError::UnsupportedFile(format!(
                "{filename} (expected .zip or a spreadsheet)"
            )),
        )
    }
}

async fn run_archive(
    ledger: Arc<Ledger>,
    group_hint: ReportGroup,
    filename: &str,
    bytes: Vec<u8>,
    uploaded_by: Option<String>,
) -> BatchReport {
    // Entry bytes come out of the archive sequentially (single reader, on
    // the blocking pool); the per-entry pipeline below runs concurrently.
    let entries = match tokio::task::spawn_blocking(move || {
        archive::read_spreadsheet_entries(&bytes)
    })
    .await
    {
        Ok(Ok(entries)) => entries,
        Ok(Err(err)) => {
            log::error!("[{}] {}: {}", group_hint.label().to_uppercase(), filename, err);
            return BatchReport::single_failure(filename, err);
        }
        Err(join_err) => {
            return BatchReport::single_failure(
                filename,
                ProcessError::TaskFailed(join_err.to_string()),
            );
        }
    };

    let mut report = BatchReport::default();
    let mut handles = Vec::new();

    for entry in entries {
        match entry.bytes {
            Ok(bytes) => {
                let ledger = ledger.clone();
                let uploaded_by = uploaded_by.clone();
                let name = entry.name.clone();
                handles.push((
                    entry.name,
                    tokio::spawn(process_entry(ledger, group_hint, name, bytes, uploaded_by)),
                ));
            }
            Err(err) => report.failed.push(EntryFailure::new(&entry.name, &err)),
        }
    }

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(record)) => report.succeeded.push(record),
            Ok(Err(err)) => report.failed.push(EntryFailure::new(&name, &err)),
            Err(join_err) => report.failed.push(EntryFailure::new(
                &name,
                &ProcessError::TaskFailed(join_err.to_string()),
            )),
        }
    }

    log::info!(
        "[{}] Processed {} workbook(s) from {} ({})",
        group_hint.label().to_uppercase(),
        report.succeeded.len(),
        filename,
        report.summary_line()
    );
    report
}

/// Classify, decode, and record one workbook.
async fn process_entry(
    ledger: Arc<Ledger>,
    group_hint: ReportGroup,
    name: String,
    bytes: Vec<u8>,
    uploaded_by: Option<String>,
) -> Result<UploadRecord, ProcessError> {
    let classification = classifier::classify(&name, group_hint);
    let mode = ExtractMode::for_type(classification.logical_type);

    let decoded = tokio::task::spawn_blocking(move || workbook::decode_workbook(&bytes, mode))
        .await
        .map_err(|e| ProcessError::TaskFailed(e.to_string()))??;

    let record = UploadRecord {
        store_id: classification.store_id,
        date_key: classification.date_key,
        group: classification.group,
        logical_type: classification.logical_type,
        filename: name.clone(),
        sheet_name: decoded.sheet_name,
        row_count: decoded.rows.len(),
        processed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        rows: decoded.rows,
        uploaded_by,
    };

    ledger.put(&record).await?;

    log::info!(
        "  [{} | {}] {} | sheet: {} | rows: {}",
        record.group.label().to_uppercase(),
        record.logical_type.label(),
        name,
        record.sheet_name,
        record.row_count
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;
    use crate::error::FailureKind;
    use crate::store::MemoryStore;
    use crate::types::{Config, LogicalType};
    use crate::workbook::fixtures::minimal_xlsx;

    fn test_ledger() -> Arc<Ledger> {
        Arc::new(Ledger::new(Arc::new(MemoryStore::new()), &Config::default()))
    }

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, body) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn test_single_workbook_batch() {
        let ledger = test_ledger();
        let bytes = minimal_xlsx(&[&["Store", "4340"], &["Sales", "1200"]]);

        let report = run_batch(
            ledger.clone(),
            ReportGroup::Daily,
            "Daily Sales KPI by Store-en-us-4340_20251102_083000.xlsx",
            bytes,
            Some("4340s".to_string()),
        )
        .await;

        assert_eq!(report.succeeded.len(), 1);
        assert!(report.failed.is_empty());
        let record = &report.succeeded[0];
        assert_eq!(record.logical_type, LogicalType::DailyKpi);
        assert_eq!(record.store_id, "4340");
        assert_eq!(record.date_key, Some("20251102".to_string()));
        assert_eq!(record.row_count, 2);
        assert_eq!(record.uploaded_by, Some("4340s".to_string()));

        let stored = ledger
            .records_for_group("4340", ReportGroup::Daily)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_partial_failure() {
        let ledger = test_ledger();
        let valid = minimal_xlsx(&[&["x"]]);
        let bytes = zip_of(&[
            ("storerecap_4340_20251101.xlsx", valid.clone()),
            ("storerecap_4340_20251102.xlsx", valid.clone()),
            ("storerecap_4340_20251103.xlsx", valid),
            ("storerecap_4340_broken.xlsx", b"corrupted".to_vec()),
        ]);

        let report = run_batch(
            ledger,
            ReportGroup::Recap,
            "recap-pack.zip",
            bytes,
            None,
        )
        .await;

        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "storerecap_4340_broken.xlsx");
        assert_eq!(report.failed[0].kind, FailureKind::WorkbookDecode);
        assert_eq!(report.summary_line(), "3 succeeded / 1 failed");
    }

    #[tokio::test]
    async fn test_archive_entries_classify_independently() {
        let ledger = test_ledger();
        let valid = minimal_xlsx(&[&["x"]]);
        let bytes = zip_of(&[
            ("Daily Sales KPI by Store-4340_20251102.xlsx", valid.clone()),
            ("Weekly Sales KPI by Store-4340.xlsx", valid.clone()),
            ("mystery_4340.xlsx", valid),
        ]);

        let report = run_batch(ledger, ReportGroup::Daily, "pack.zip", bytes, None).await;
        assert_eq!(report.succeeded.len(), 3);

        let types: Vec<(LogicalType, ReportGroup)> = report
            .succeeded
            .iter()
            .map(|r| (r.logical_type, r.group))
            .collect();
        assert!(types.contains(&(LogicalType::DailyKpi, ReportGroup::Daily)));
        // Weekly prefix overrides the daily hint.
        assert!(types.contains(&(LogicalType::WeeklyKpi, ReportGroup::Weekly)));
        // Unknown falls back to the hint.
        assert!(types.contains(&(LogicalType::Unknown, ReportGroup::Daily)));
    }

    #[tokio::test]
    async fn test_non_spreadsheet_entries_skipped() {
        let ledger = test_ledger();
        let bytes = zip_of(&[
            ("readme.txt", b"skip".to_vec()),
            ("storerecap_4340.xlsx", minimal_xlsx(&[&["x"]])),
        ]);

        let report = run_batch(ledger, ReportGroup::Recap, "pack.zip", bytes, None).await;
        assert_eq!(report.succeeded.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_single_file() {
        let report = run_batch(
            test_ledger(),
            ReportGroup::Daily,
            "report.csv",
            b"a,b,c".to_vec(),
            None,
        )
        .await;
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, FailureKind::UnsupportedFile);
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_one_failure() {
        let report = run_batch(
            test_ledger(),
            ReportGroup::Daily,
            "pack.zip",
            b"not a zip at all".to_vec(),
            None,
        )
        .await;
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].kind, FailureKind::ArchiveRead);
    }

    #[tokio::test]
    async fn test_dateless_entry_does_not_crash() {
        let ledger = test_ledger();
        let report = run_batch(
            ledger.clone(),
            ReportGroup::Daily,
            "soldmovement43401511.xls",
            minimal_xlsx(&[&["x"]]),
            None,
        )
        .await;

        // .xls extension is accepted by name; the body is xlsx, which the
        // auto-detecting decoder still reads.
        assert_eq!(report.succeeded.len(), 1);
        let record = &report.succeeded[0];
        assert_eq!(record.logical_type, LogicalType::SoldMovement);
        assert_eq!(record.store_id, "4340");
        assert_eq!(record.date_key, None);

        // A dateless record never contributes an uploaded date.
        assert!(ledger.uploaded_dates("4340").await.unwrap().is_empty());
    }
}
