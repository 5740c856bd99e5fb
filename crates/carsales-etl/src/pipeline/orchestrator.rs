//! Pipeline orchestrator
//!
//! Drives a single run: connect, ensure the table, normalize and load the
//! source, export the stored rows, archive the export, then delete it.
//! Stages run strictly one after another. Once connected, the connection is
//! released exactly once whichever way the run ends.

use chrono::{Local, NaiveDateTime};
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

use super::{
    ArchiveTarget, CarStore, PipelineFailure, RunOutcome, RunReport, RunStage, StoreConnector,
};
use crate::config::{EtlConfig, FileConfig};
use crate::error::{EtlError, EtlResult};
use crate::export::write_export;
use crate::normalize::Normalizer;
use crate::retry::{execute_with_backoff, RetryPolicy};
use crate::source::read_source;
use crate::storage::archive_key;

pub struct Pipeline<C, A> {
    connector: C,
    archive: A,
    normalizer: Normalizer,
    files: FileConfig,
    retry: RetryPolicy,
}

impl<C, A> Pipeline<C, A>
where
    C: StoreConnector,
    A: ArchiveTarget,
{
    pub fn new(config: &EtlConfig, connector: C, archive: A) -> EtlResult<Self> {
        let normalizer = Normalizer::new()
            .map_err(|e| EtlError::Config(format!("Invalid sale date pattern: {}", e)))?;

        Ok(Self {
            connector,
            archive,
            normalizer,
            files: config.files.clone(),
            retry: config.retry,
        })
    }

    /// Run once, stamping the archive with the current local time
    pub async fn run(&self) -> Result<RunOutcome, PipelineFailure> {
        self.run_at(Local::now().naive_local()).await
    }

    /// Run once as if started at `started_at`
    #[instrument(skip(self), fields(source = %self.files.source_path.display()))]
    pub async fn run_at(&self, started_at: NaiveDateTime) -> Result<RunOutcome, PipelineFailure> {
        let source_path = &self.files.source_path;
        if !source_path.is_file() {
            error!(
                error = %EtlError::PreconditionMissing(source_path.clone()),
                "Nothing to process"
            );
            return Ok(RunOutcome::SourceMissing(source_path.clone()));
        }

        let mut stage = RunStage::Connected;
        info!("Connecting to the database");
        let mut store = execute_with_backoff(&self.retry, "connect", |_| self.connector.connect())
            .await
            .map_err(|e| {
                self.fail(
                    stage,
                    EtlError::Connect {
                        attempts: e.attempts,
                        source: e.source,
                    },
                )
            })?;

        let result = self.run_connected(&mut store, started_at, &mut stage).await;

        if let Err(e) = store.close().await {
            warn!(error = %e, "Failed to close database connection");
        }

        match result {
            Ok(report) => {
                debug!(stage = %RunStage::Done, "Entered stage");
                info!(
                    rows_read = report.rows_read,
                    rows_accepted = report.rows_accepted,
                    rows_rejected = report.rows_rejected,
                    rows_exported = report.rows_exported,
                    archive_key = %report.archive_key,
                    "Pipeline completed"
                );
                Ok(RunOutcome::Completed(report))
            },
            Err(e) => Err(self.fail(stage, e)),
        }
    }

    async fn run_connected(
        &self,
        store: &mut C::Store,
        started_at: NaiveDateTime,
        stage: &mut RunStage,
    ) -> EtlResult<RunReport> {
        enter(stage, RunStage::TableEnsured);
        store.ensure_schema().await.map_err(EtlError::Schema)?;

        enter(stage, RunStage::Loaded);
        let rows = read_source(&self.files.source_path)?;
        let normalized = self.normalizer.normalize_all(rows);
        let attempted = store
            .load(&normalized.accepted)
            .await
            .map_err(EtlError::Load)?;
        info!(rows = attempted, "Inserted rows into the database");

        enter(stage, RunStage::Exported);
        let export_path = &self.files.export_path;
        info!(path = %export_path.display(), "Exporting stored rows");
        let stored = store.fetch_all().await.map_err(EtlError::Fetch)?;
        let exported = write_export(export_path, &stored).map_err(|source| EtlError::Export {
            path: export_path.clone(),
            source,
        })?;

        enter(stage, RunStage::Archived);
        let key = archive_key(started_at);
        execute_with_backoff(&self.retry, "upload", |_| {
            self.archive.upload(export_path, &key)
        })
        .await
        .map_err(|e| EtlError::Upload {
            attempts: e.attempts,
            source: e.source,
        })?;
        info!(key = %key, "Archived export");

        enter(stage, RunStage::CleanedUp);
        remove_if_present(export_path)?;

        Ok(RunReport {
            started_at,
            rows_read: normalized.rows_read(),
            rows_accepted: normalized.accepted.len(),
            rows_rejected: normalized.rejected.len(),
            date_fallbacks: normalized.date_fallbacks,
            rows_attempted: attempted,
            rows_exported: exported,
            archive_key: key,
        })
    }

    fn fail(&self, stage: RunStage, error: EtlError) -> PipelineFailure {
        error!(stage = %stage, state = %RunStage::Failed, error = %error, "Pipeline failed");
        PipelineFailure { stage, error }
    }
}

fn enter(current: &mut RunStage, next: RunStage) {
    debug!(from = %current, to = %next, "Entering stage");
    *current = next;
}

/// Delete a local file; a file that is already gone is fine.
fn remove_if_present(path: &Path) -> EtlResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed local export");
            Ok(())
        },
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Local export already gone");
            Ok(())
        },
        Err(source) => Err(EtlError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
