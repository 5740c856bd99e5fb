//! Carsales ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch pipeline for vehicle sale transactions.
//!
//! # Overview
//!
//! One run moves a CSV of sale records through these steps:
//!
//! - **Source**: read `car_prices.csv`, resolving the 16 named columns
//! - **Normalize**: trim values, parse integers and the sale date, drop bad rows
//! - **Load**: insert into the Postgres `cars` table, skipping known vins
//! - **Export**: write every stored row to `processed_data.csv`
//! - **Archive**: upload the export to S3 under a timestamped key
//! - **Cleanup**: delete the local export
//!
//! Connecting and uploading are retried with exponential backoff. Every other
//! failure aborts the run, and the database connection is always released.
//!
//! # Example
//!
//! ```no_run
//! use carsales_etl::{config::EtlConfig, db::PgConnector, pipeline::Pipeline, storage::Storage};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let connector = PgConnector::new(&config.database);
//!     let storage = Storage::from_env(config.archive.bucket.clone()).await;
//!     let outcome = Pipeline::new(&config, connector, storage)?.run().await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod normalize;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod storage;

// Re-export commonly used types
pub use error::{EtlError, EtlResult};
pub use pipeline::{Pipeline, PipelineFailure, RunOutcome, RunReport, RunStage};
