//! Configuration management
//!
//! Database credentials come from the environment (optionally via a `.env`
//! file). Everything else is a fixed constant for a deployment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EtlError, EtlResult};
use crate::retry::RetryPolicy;

// ============================================================================
// Deployment Constants
// ============================================================================

/// Database holding the `cars` table.
pub const DEFAULT_DATABASE_NAME: &str = "transactions";

/// Postgres port.
pub const DEFAULT_DATABASE_PORT: u16 = 5432;

/// Per-attempt connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Bucket receiving archived exports.
pub const DEFAULT_BUCKET_NAME: &str = "beheritbucket";

/// Source file of raw sale transactions.
pub const DEFAULT_SOURCE_PATH: &str = "data/car_prices.csv";

/// Local export written before archival.
pub const DEFAULT_EXPORT_PATH: &str = "data/processed_data.csv";

/// Attempts for connect and upload before giving up.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// First backoff delay in milliseconds; doubles on every retry.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on a single backoff delay in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Pipeline configuration, built once at startup
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub database: DatabaseConfig,
    pub archive: ArchiveConfig,
    pub files: FileConfig,
    pub retry: RetryPolicy,
}

/// Postgres connection settings
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database", &self.database)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Object store target
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub bucket: String,
}

/// Local file locations
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub source_path: PathBuf,
    pub export_path: PathBuf,
}

impl EtlConfig {
    /// Load configuration from `.env`, the environment, and defaults
    ///
    /// `DB_USER`, `DB_PASS` and `DB_HOST` are required.
    pub fn load() -> EtlResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> EtlResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| EtlError::Config(format!("{} is not set", key)))
        };

        let config = Self {
            database: DatabaseConfig {
                host: required("DB_HOST")?,
                port: DEFAULT_DATABASE_PORT,
                username: required("DB_USER")?,
                password: required("DB_PASS")?,
                database: DEFAULT_DATABASE_NAME.to_string(),
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            archive: ArchiveConfig {
                bucket: DEFAULT_BUCKET_NAME.to_string(),
            },
            files: FileConfig {
                source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
                export_path: PathBuf::from(DEFAULT_EXPORT_PATH),
            },
            retry: RetryPolicy::default(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> EtlResult<()> {
        if self.archive.bucket.is_empty() {
            return Err(EtlError::Config("Bucket name cannot be empty".to_string()));
        }

        if self.files.source_path == self.files.export_path {
            return Err(EtlError::Config(format!(
                "Export path {} would overwrite the source file",
                self.files.export_path.display()
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(EtlError::Config(
                "Retry policy needs at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}
