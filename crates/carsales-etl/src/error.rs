//! Run-level error types
//!
//! Row-level problems ([`crate::normalize::RowError`], date parse failures)
//! are contained by the normalizer and never show up here. Everything in
//! [`EtlError`] aborts the run.

use std::path::PathBuf;
use thiserror::Error;

use crate::db::DbError;
use crate::source::SourceError;
use crate::storage::StorageError;

/// Result type alias for pipeline operations
pub type EtlResult<T> = std::result::Result<T, EtlError>;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Source file {} does not exist", .0.display())]
    PreconditionMissing(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not connect to the database after {attempts} attempts: {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: DbError,
    },

    #[error("Failed to ensure the cars table: {0}")]
    Schema(#[source] DbError),

    #[error("Failed to read source data: {0}")]
    Source(#[from] SourceError),

    #[error("Batch load failed: {0}")]
    Load(#[source] DbError),

    #[error("Failed to read stored rows: {0}")]
    Fetch(#[source] DbError),

    #[error("Failed to write export {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not upload archive after {attempts} attempts: {source}")]
    Upload {
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("Failed to remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EtlError {
    /// Whether retrying the whole run could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EtlError::Connect { .. } | EtlError::Upload { .. })
    }
}
