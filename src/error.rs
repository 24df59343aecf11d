//! Error types for the upload pipeline.
//!
//! Failures are classified by recoverability:
//! - Recoverable: the document store rejected or never received a write; the
//!   input itself is fine and can be retried.
//! - Non-recoverable: the input cannot be processed (unreadable workbook,
//!   password-protected archive, unsupported file type).
//!
//! Everything is caught at the batch-entry boundary and folded into the
//! batch report; nothing propagates far enough to take the process down.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while processing one file or archive entry.
#[derive(Debug, Error)]
pub enum ProcessError {
    // Non-recoverable input errors
    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Workbook has no sheets")]
    EmptyWorkbook,

    #[error("Workbook decode failed: {0}")]
    WorkbookDecode(String),

    #[error("Archive is password-protected")]
    ArchiveEncrypted,

    #[error("Archive read failed: {0}")]
    ArchiveRead(String),

    // Recoverable store errors
    #[error("Document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Document store write failed: {0}")]
    StoreWriteFailed(String),

    // Infrastructure
    #[error("Processing task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// True when retrying the same input later can succeed (the store was
    /// the problem, not the file).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProcessError::StoreUnavailable(_) | ProcessError::StoreWriteFailed(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessError::UnsupportedFile(_) => FailureKind::UnsupportedFile,
            ProcessError::EmptyWorkbook | ProcessError::WorkbookDecode(_) => {
                FailureKind::WorkbookDecode
            }
            ProcessError::ArchiveEncrypted => FailureKind::ArchiveEncrypted,
            ProcessError::ArchiveRead(_) => FailureKind::ArchiveRead,
            ProcessError::StoreUnavailable(_) => FailureKind::StoreUnavailable,
            ProcessError::StoreWriteFailed(_) => FailureKind::StoreWriteFailed,
            ProcessError::TaskFailed(_) => FailureKind::Task,
            ProcessError::Io(_) => FailureKind::Io,
        }
    }
}

/// Failure category surfaced in batch reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedFile,
    WorkbookDecode,
    ArchiveEncrypted,
    ArchiveRead,
    StoreUnavailable,
    StoreWriteFailed,
    Task,
    Io,
}

/// One failed entry in a batch report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryFailure {
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
    pub recoverable: bool,
}

impl EntryFailure {
    pub fn new(name: impl Into<String>, err: &ProcessError) -> Self {
        Self {
            name: name.into(),
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}
