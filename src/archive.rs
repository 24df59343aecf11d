//! Zip archive access for batch ingestion.
//!
//! Pulls spreadsheet entries out of an uploaded zip. Directory entries and
//! non-spreadsheet names are skipped. A password-protected archive is a
//! distinct, non-recoverable failure: the decompression step cannot proceed,
//! so it is surfaced as [`ProcessError::ArchiveEncrypted`] rather than a
//! generic read error.

use std::io::{Cursor, Read};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::ProcessError;

/// Spreadsheet extensions recognized inside an archive. Matches the formats
/// the workbook decoder auto-detects.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &[".xlsx", ".xls", ".xlsm", ".ods"];

pub fn is_spreadsheet_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    SPREADSHEET_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

pub fn is_archive_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".zip")
}

/// One entry pulled out of an archive: the raw bytes, or the error that
/// kept them out.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Result<Vec<u8>, ProcessError>,
}

/// Read every spreadsheet entry out of a zip archive.
///
/// Per-entry read failures are carried inside the returned list so siblings
/// still process. An encrypted archive fails the whole call: every entry
/// shares the password, so nothing in it is readable.
pub fn read_spreadsheet_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, ProcessError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(map_zip_err)?;

    let mut entries = Vec::new();
    for index in 0..archive.len() {
        match archive.by_index(index) {
            Ok(mut file) => {
                if file.is_dir() {
                    continue;
                }
                let name = file.name().to_string();
                if !is_spreadsheet_name(&name) {
                    continue;
                }
                let mut buf = Vec::with_capacity(file.size() as usize);
                let bytes = file
                    .read_to_end(&mut buf)
                    .map(|_| buf)
                    .map_err(|e| ProcessError::ArchiveRead(e.to_string()));
                entries.push(ArchiveEntry { name, bytes });
            }
            Err(err) => {
                let err = map_zip_err(err);
                if matches!(err, ProcessError::ArchiveEncrypted) {
                    return Err(err);
                }
                entries.push(ArchiveEntry {
                    name: format!("entry #{index}"),
                    bytes: Err(err),
                });
            }
        }
    }

    Ok(entries)
}

fn map_zip_err(err: ZipError) -> ProcessError {
    match err {
        ZipError::UnsupportedArchive(msg) if msg.contains("Password") => {
            ProcessError::ArchiveEncrypted
        }
        ZipError::InvalidPassword => ProcessError::ArchiveEncrypted,
        other => ProcessError::ArchiveRead(other.to_string()),
    }
}
