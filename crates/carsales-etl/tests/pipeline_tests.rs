//! Pipeline orchestration tests
//!
//! Runs the whole pipeline against in-memory stand-ins for Postgres and S3.
//! Covers:
//! 1. Row accounting for a mixed source file
//! 2. Duplicate vins within a file and across runs
//! 3. Connect and upload retries, and giving up
//! 4. Fatal errors releasing the connection
//! 5. Local export cleanup

mod common;

use anyhow::Result;
use carsales_common::types::NormalizedRecord;
use carsales_common::CommonError;
use carsales_etl::db::DbError;
use carsales_etl::export::EXPORT_HEADER;
use carsales_etl::source::SourceError;
use carsales_etl::{EtlError, Pipeline, RunOutcome, RunReport, RunStage};
use chrono::{NaiveDate, NaiveDateTime};
use common::{fixture, init_tracing, test_config, MemoryArchive, MemoryConnector};
use std::path::Path;

const HEADER: &str = "year,make,model,trim,body,transmission,vin,state,condition,odometer,color,interior,seller,mmr,sellingprice,saledate";

fn started_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(9, 7, 22)
        .unwrap()
}

fn write_source(dir: &Path, rows: &[&str]) {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    std::fs::write(dir.join("car_prices.csv"), text).unwrap();
}

fn copy_fixture(dir: &Path) {
    std::fs::copy(fixture("car_prices_sample.csv"), dir.join("car_prices.csv")).unwrap();
}

fn completed(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_run_with_fixture() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    copy_fixture(dir.path());
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let archive = MemoryArchive::new();
    let pipeline = Pipeline::new(&config, connector.clone(), archive.clone())?;

    let report = completed(pipeline.run_at(started_at()).await?);

    assert_eq!(report.rows_read, 5);
    assert_eq!(report.rows_accepted, 4);
    assert_eq!(report.rows_rejected, 1);
    assert_eq!(report.date_fallbacks, 1);
    assert_eq!(report.rows_attempted, 4);
    assert_eq!(report.rows_exported, 3);
    assert_eq!(report.archive_key, "processed_data_20240305_090722.csv");

    let rows = connector.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].vin.as_deref(), Some("5xyktca69fg566472"));
    assert_eq!(rows[0].odometer, Some(16639));
    assert_eq!(
        rows[0].sale_date,
        NaiveDate::from_ymd_opt(2014, 12, 16)
            .unwrap()
            .and_hms_opt(12, 30, 0)
    );
    // unparseable date keeps the row
    assert_eq!(rows[2].maker.as_deref(), Some("Ford"));
    assert_eq!(rows[2].sale_date, None);

    assert!(connector.schema_ensured());
    assert_eq!(connector.connects(), 1);
    assert_eq!(connector.closes(), 1);

    let uploads = archive.uploads();
    assert_eq!(uploads.len(), 1);
    let (key, contents) = &uploads[0];
    assert_eq!(key, "processed_data_20240305_090722.csv");
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], EXPORT_HEADER.join(","));
    assert!(lines[1].starts_with("1,2015,Kia,Sorento,LX,SUV,automatic,5xyktca69fg566472,"));
    assert!(lines[1].ends_with(",2014-12-16 12:30:00"));
    assert!(lines[3].ends_with(",11500,11000,"));

    assert!(!config.files.export_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_vin_within_file_keeps_first() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_source(
        dir.path(),
        &[
            "2015,Kia,Sorento,LX,SUV,automatic,5xyktca69fg566472,ca,5,16639,white,black,kia motors,20500,21500,Tue Dec 16 2014 12:30:00 GMT-0800 (PST)",
            "2015,Kia,Sorento,LX,SUV,automatic,5xyktca69fg566472,ca,5,16639,white,black,kia motors,20500,99999,Tue Dec 16 2014 12:30:00 GMT-0800 (PST)",
        ],
    );
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let archive = MemoryArchive::new();
    let pipeline = Pipeline::new(&config, connector.clone(), archive.clone())?;

    let report = completed(pipeline.run_at(started_at()).await?);
    assert_eq!(report.rows_attempted, 2);
    assert_eq!(report.rows_exported, 1);

    let rows = connector.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].selling_price, Some(21500));

    let (_, contents) = &archive.uploads()[0];
    assert_eq!(contents.lines().count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_rerun_leaves_stored_rows_unchanged() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_source(
        dir.path(),
        &["2015,Kia,Sorento,LX,SUV,automatic,5xyktca69fg566472,ca,5,16639,white,black,kia motors,20500,21500,"],
    );
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    connector.seed(vec![NormalizedRecord {
        year: 2015,
        vin: Some("5xyktca69fg566472".to_string()),
        mmr: 1,
        ..Default::default()
    }]);

    let pipeline = Pipeline::new(&config, connector.clone(), MemoryArchive::new())?;
    let report = completed(pipeline.run_at(started_at()).await?);
    assert_eq!(report.rows_attempted, 1);
    assert_eq!(report.rows_exported, 1);

    let rows = connector.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, 1);
    assert_eq!(rows[0].mmr, Some(1));
    assert_eq!(rows[0].maker, None);
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    copy_fixture(dir.path());
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let pipeline = Pipeline::new(&config, connector.clone(), MemoryArchive::new())?;

    completed(pipeline.run_at(started_at()).await?);
    let first = connector.rows();

    let report = completed(pipeline.run_at(started_at()).await?);
    assert_eq!(report.rows_exported, 3);
    assert_eq!(connector.rows(), first);
    assert_eq!(connector.closes(), 2);
    Ok(())
}

#[tokio::test]
async fn test_connect_succeeds_on_third_attempt() -> Result<()> {
    let dir = tempfile::tempdir()?;
    copy_fixture(dir.path());
    let config = test_config(dir.path());

    let connector = MemoryConnector::failing(2);
    let pipeline = Pipeline::new(&config, connector.clone(), MemoryArchive::new())?;

    let report = completed(pipeline.run_at(started_at()).await?);
    assert_eq!(report.rows_exported, 3);
    assert_eq!(connector.connects(), 3);
    assert_eq!(connector.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_connect_gives_up_after_three_attempts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    copy_fixture(dir.path());
    let config = test_config(dir.path());

    let connector = MemoryConnector::failing(3);
    let archive = MemoryArchive::new();
    let pipeline = Pipeline::new(&config, connector.clone(), archive.clone())?;

    let failure = pipeline.run_at(started_at()).await.unwrap_err();
    assert_eq!(failure.stage, RunStage::Connected);
    assert!(matches!(
        failure.error,
        EtlError::Connect {
            attempts: 3,
            source: DbError::ConnectTimeout { .. }
        }
    ));
    assert!(failure.error.is_transient());

    assert_eq!(connector.connects(), 3);
    assert!(!connector.schema_ensured());
    assert!(connector.rows().is_empty());
    assert_eq!(connector.closes(), 0);
    assert_eq!(archive.attempts(), 0);
    assert!(!config.files.export_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_source_skips_everything() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let archive = MemoryArchive::new();
    let pipeline = Pipeline::new(&config, connector.clone(), archive.clone())?;

    let outcome = pipeline.run_at(started_at()).await?;
    assert_eq!(
        outcome,
        RunOutcome::SourceMissing(config.files.source_path.clone())
    );
    assert_eq!(connector.connects(), 0);
    assert_eq!(archive.attempts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_constraint_violation_aborts_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_source(
        dir.path(),
        &[
            "2014,BMW,3 Series,328i,Sedan,automatic,wba3c1c51ek116351,ca,45,1331,gray,black,bmw,31900,30000,",
            "2015,Kia,Sorento,LX,SUV,automatic,5xyktca69fg5664720,ca,5,16639,white,black,kia,20500,21500,",
        ],
    );
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let archive = MemoryArchive::new();
    let pipeline = Pipeline::new(&config, connector.clone(), archive.clone())?;

    let failure = pipeline.run_at(started_at()).await.unwrap_err();
    assert_eq!(failure.stage, RunStage::Loaded);
    assert!(matches!(
        failure.error,
        EtlError::Load(DbError::Constraint(_))
    ));
    assert!(!failure.error.is_transient());

    // nothing from the failed batch is kept
    assert!(connector.rows().is_empty());
    assert_eq!(connector.closes(), 1);
    assert_eq!(archive.attempts(), 0);
    assert!(!config.files.export_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_column_is_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("car_prices.csv"),
        "year,make,model\n2015,Kia,Sorento\n",
    )?;
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let pipeline = Pipeline::new(&config, connector.clone(), MemoryArchive::new())?;

    let failure = pipeline.run_at(started_at()).await.unwrap_err();
    assert_eq!(failure.stage, RunStage::Loaded);
    match failure.error {
        EtlError::Source(SourceError::Columns(CommonError::MissingColumns(missing))) => {
            assert_eq!(missing.len(), 13);
            assert!(missing.contains(&"vin".to_string()));
        },
        other => panic!("unexpected error: {other}"),
    }
    assert!(connector.schema_ensured());
    assert_eq!(connector.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_header_only_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_source(dir.path(), &[]);
    let config = test_config(dir.path());

    let archive = MemoryArchive::new();
    let pipeline = Pipeline::new(&config, MemoryConnector::new(), archive.clone())?;

    let report = completed(pipeline.run_at(started_at()).await?);
    assert_eq!(report.rows_read, 0);
    assert_eq!(report.rows_attempted, 0);
    assert_eq!(report.rows_exported, 0);

    let (_, contents) = &archive.uploads()[0];
    assert_eq!(contents.lines().count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_upload_succeeds_after_retries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    copy_fixture(dir.path());
    let config = test_config(dir.path());

    let archive = MemoryArchive::failing(2);
    let pipeline = Pipeline::new(&config, MemoryConnector::new(), archive.clone())?;

    completed(pipeline.run_at(started_at()).await?);
    assert_eq!(archive.attempts(), 3);
    assert_eq!(archive.uploads().len(), 1);
    assert!(!config.files.export_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_upload_failure_keeps_local_export() -> Result<()> {
    let dir = tempfile::tempdir()?;
    copy_fixture(dir.path());
    let config = test_config(dir.path());

    let connector = MemoryConnector::new();
    let archive = MemoryArchive::failing(3);
    let pipeline = Pipeline::new(&config, connector.clone(), archive.clone())?;

    let failure = pipeline.run_at(started_at()).await.unwrap_err();
    assert_eq!(failure.stage, RunStage::Archived);
    assert!(matches!(failure.error, EtlError::Upload { attempts: 3, .. }));

    // the load was committed before the export
    assert_eq!(connector.rows().len(), 3);
    assert_eq!(connector.closes(), 1);
    assert!(archive.uploads().is_empty());

    let export = std::fs::read_to_string(&config.files.export_path)?;
    assert_eq!(export.lines().count(), 4);
    Ok(())
}
