//! Common test utilities for carsales ETL integration tests
//!
//! In-memory stand-ins for the database and the object store, so pipeline
//! behavior can be checked without Docker:
//!
//! - [`MemoryConnector`] / [`MemoryStore`]: a `cars` table with vin uniqueness
//!   and the 17-character vin bound, plus counters for connects and closes
//! - [`MemoryArchive`]: captures uploaded files, optionally failing first
//!
//! All fakes are cheap to clone and share their state, so a test can keep a
//! handle after moving one into the pipeline.

#![allow(dead_code)]

use async_trait::async_trait;
use carsales_common::types::{NormalizedRecord, StoredRecord};
use carsales_etl::config::EtlConfig;
use carsales_etl::db::DbError;
use carsales_etl::pipeline::{ArchiveTarget, CarStore, StoreConnector};
use carsales_etl::retry::RetryPolicy;
use carsales_etl::storage::StorageError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Path of a file under `tests/fixtures`
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Config rooted in `dir`, retrying without delays
pub fn test_config(dir: &Path) -> EtlConfig {
    let mut config = EtlConfig::from_lookup(|key| match key {
        "DB_HOST" => Some("localhost".to_string()),
        "DB_USER" => Some("etl".to_string()),
        "DB_PASS" => Some("etl".to_string()),
        _ => None,
    })
    .expect("test config");

    config.files.source_path = dir.join("car_prices.csv");
    config.files.export_path = dir.join("processed_data.csv");
    config.retry = RetryPolicy::immediate(3);
    config
}

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,carsales_etl=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// In-memory store
// ============================================================================

const VIN_MAX_LEN: usize = 17;

#[derive(Debug, Default)]
pub struct StoreState {
    pub rows: Vec<StoredRecord>,
    pub schema_ensured: bool,
    pub connects: u32,
    pub closes: u32,
    next_id: i32,
}

impl StoreState {
    fn insert(&mut self, record: NormalizedRecord) -> bool {
        let duplicate = record.vin.is_some()
            && self.rows.iter().any(|stored| stored.vin == record.vin);
        if duplicate {
            return false;
        }

        self.next_id += 1;
        self.rows
            .push(StoredRecord::from_normalized(self.next_id, record));
        true
    }
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<StoreState>>,
    failures: Arc<Mutex<u32>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` connect attempts
    pub fn failing(count: u32) -> Self {
        let connector = Self::new();
        *connector.failures.lock().unwrap() = count;
        connector
    }

    /// Pre-populate the table as if by an earlier run
    pub fn seed(&self, records: Vec<NormalizedRecord>) {
        let mut state = self.state.lock().unwrap();
        for record in records {
            state.insert(record);
        }
    }

    pub fn rows(&self) -> Vec<StoredRecord> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub fn closes(&self) -> u32 {
        self.state.lock().unwrap().closes
    }

    pub fn schema_ensured(&self) -> bool {
        self.state.lock().unwrap().schema_ensured
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    type Store = MemoryStore;

    async fn connect(&self) -> Result<MemoryStore, DbError> {
        self.state.lock().unwrap().connects += 1;

        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(DbError::ConnectTimeout {
                target: "memory".to_string(),
                timeout: Duration::from_secs(10),
            });
        }

        Ok(MemoryStore {
            state: Arc::clone(&self.state),
            open: true,
        })
    }
}

pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    open: bool,
}

impl MemoryStore {
    fn check_open(&self) -> Result<(), DbError> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::Closed)
        }
    }
}

#[async_trait]
impl CarStore for MemoryStore {
    async fn ensure_schema(&mut self) -> Result<(), DbError> {
        self.check_open()?;
        self.state.lock().unwrap().schema_ensured = true;
        Ok(())
    }

    async fn load(&mut self, records: &[NormalizedRecord]) -> Result<usize, DbError> {
        self.check_open()?;

        // all-or-nothing, like the transaction around the real insert
        if let Some(vin) = records
            .iter()
            .filter_map(|r| r.vin.as_deref())
            .find(|vin| vin.chars().count() > VIN_MAX_LEN)
        {
            return Err(DbError::Constraint(format!(
                "value too long for type character varying(17): {}",
                vin
            )));
        }

        let mut state = self.state.lock().unwrap();
        for record in records {
            state.insert(record.clone());
        }
        Ok(records.len())
    }

    async fn fetch_all(&mut self) -> Result<Vec<StoredRecord>, DbError> {
        self.check_open()?;
        let mut rows = self.state.lock().unwrap().rows.clone();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if self.open {
            self.open = false;
            self.state.lock().unwrap().closes += 1;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory archive
// ============================================================================

#[derive(Debug, Default)]
struct ArchiveState {
    uploads: Vec<(String, String)>,
    attempts: u32,
    failures: u32,
}

#[derive(Clone, Default)]
pub struct MemoryArchive {
    state: Arc<Mutex<ArchiveState>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` uploads
    pub fn failing(count: u32) -> Self {
        let archive = Self::new();
        archive.state.lock().unwrap().failures = count;
        archive
    }

    /// `(key, contents)` of every successful upload
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }
}

#[async_trait]
impl ArchiveTarget for MemoryArchive {
    async fn upload(&self, path: &Path, key: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;

        let failed = |message: String| StorageError::Upload {
            bucket: "memory".to_string(),
            key: key.to_string(),
            message,
        };

        if state.failures > 0 {
            state.failures -= 1;
            return Err(failed("service unavailable".to_string()));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| failed(e.to_string()))?;
        state.uploads.push((key.to_string(), contents));
        Ok(())
    }
}
