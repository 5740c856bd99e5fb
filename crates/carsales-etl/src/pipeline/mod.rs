//! End-to-end pipeline
//!
//! ```text
//! Init -> Connected -> TableEnsured -> Loaded -> Exported -> Archived -> CleanedUp -> Done
//!   \__________\____________\____________\__________\__________\______________> Failed
//! ```
//!
//! The store and the archive are reached through the [`StoreConnector`],
//! [`CarStore`] and [`ArchiveTarget`] traits so the orchestration can be
//! exercised without Postgres or S3.

pub mod orchestrator;

use async_trait::async_trait;
use carsales_common::types::{NormalizedRecord, StoredRecord};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::db::DbError;
use crate::error::EtlError;
use crate::storage::StorageError;

pub use orchestrator::Pipeline;

/// Opens the run's store connection
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: CarStore;

    async fn connect(&self) -> Result<Self::Store, DbError>;
}

/// The relational store holding sale records
#[async_trait]
pub trait CarStore: Send {
    /// Create the `cars` table if it does not exist
    async fn ensure_schema(&mut self) -> Result<(), DbError>;

    /// Insert all records, silently skipping vins that are already stored.
    /// Returns the number of records attempted.
    async fn load(&mut self, records: &[NormalizedRecord]) -> Result<usize, DbError>;

    /// Every stored row, in store order
    async fn fetch_all(&mut self) -> Result<Vec<StoredRecord>, DbError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<(), DbError>;
}

/// Remote destination for export files
#[async_trait]
pub trait ArchiveTarget: Send + Sync {
    async fn upload(&self, path: &Path, key: &str) -> Result<(), StorageError>;
}

/// Where a run is in its sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStage {
    Init,
    Connected,
    TableEnsured,
    Loaded,
    Exported,
    Archived,
    CleanedUp,
    Done,
    Failed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Init => "init",
            RunStage::Connected => "connect",
            RunStage::TableEnsured => "ensure-table",
            RunStage::Loaded => "load",
            RunStage::Exported => "export",
            RunStage::Archived => "archive",
            RunStage::CleanedUp => "cleanup",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters from a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: NaiveDateTime,
    pub rows_read: usize,
    pub rows_accepted: usize,
    pub rows_rejected: usize,
    pub date_fallbacks: usize,
    pub rows_attempted: usize,
    pub rows_exported: usize,
    pub archive_key: String,
}

/// How a run ended without failing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunReport),
    /// The source file was absent; the store was never contacted
    SourceMissing(PathBuf),
}

/// A run that aborted, with the stage it was trying to reach
#[derive(Debug, Error)]
#[error("Pipeline failed during {stage}: {error}")]
pub struct PipelineFailure {
    pub stage: RunStage,
    #[source]
    pub error: EtlError,
}
