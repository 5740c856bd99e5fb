//! Carsales ETL - Main entry point

use anyhow::Result;
use carsales_common::logging::{init_logging, LogConfig};
use tracing::{error, info, warn};

use carsales_etl::{
    config::EtlConfig, db::PgConnector, storage::Storage, Pipeline, RunOutcome,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // .env may also carry the LOG_* settings
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .filter_directives("carsales_etl=info,sqlx=warn,aws_config=warn,aws_smithy_runtime=warn")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    info!("Starting carsales ETL run");

    let config = EtlConfig::load()?;
    info!(
        source = %config.files.source_path.display(),
        export = %config.files.export_path.display(),
        "Configuration loaded"
    );

    let connector = PgConnector::new(&config.database);
    let storage = Storage::from_env(config.archive.bucket.clone()).await;
    info!(bucket = storage.bucket(), "Archiving exports to S3");
    let pipeline = Pipeline::new(&config, connector, storage)?;

    match pipeline.run().await {
        Ok(RunOutcome::Completed(report)) => {
            info!(
                rows_read = report.rows_read,
                rows_rejected = report.rows_rejected,
                rows_exported = report.rows_exported,
                archive_key = %report.archive_key,
                "Run finished"
            );
            Ok(())
        },
        Ok(RunOutcome::SourceMissing(path)) => {
            warn!(path = %path.display(), "Source file not found, nothing was done");
            Ok(())
        },
        Err(failure) => {
            error!(
                stage = %failure.stage,
                transient = failure.error.is_transient(),
                "Run aborted"
            );
            if failure.error.is_transient() {
                warn!("The failure may clear up on its own; rerunning is safe");
            }
            Err(failure.into())
        },
    }
}
