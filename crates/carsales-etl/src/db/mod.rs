//! Postgres access for the `cars` table
//!
//! A run owns exactly one [`PgConnection`], opened by [`PgConnector`] and
//! released by [`PgCarStore::close`](crate::pipeline::CarStore::close).

pub mod cars;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::pipeline::StoreConnector;

pub use cars::PgCarStore;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connect attempt did not finish in time
    #[error("Timed out after {timeout:?} connecting to {target}")]
    ConnectTimeout { target: String, timeout: Duration },

    /// A value broke a column constraint other than vin uniqueness
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// The connection was already released
    #[error("Database connection is closed")]
    Closed,
}

impl DbError {
    /// Classify an error raised while writing rows.
    ///
    /// SQLSTATE classes 22 (data exception) and 23 (integrity violation)
    /// mean the batch itself is bad, not the connection.
    pub fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let class = db_err.code().map(|code| code.chars().take(2).collect::<String>());
            if matches!(class.as_deref(), Some("22") | Some("23")) {
                return Self::Constraint(db_err.message().to_string());
            }
        }
        Self::Sqlx(err)
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Opens single connections to the sales database
#[derive(Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
    target: String,
    timeout: Duration,
}

impl PgConnector {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database);

        Self {
            options,
            target: format!("{}:{}/{}", config.host, config.port, config.database),
            timeout: config.connect_timeout(),
        }
    }

    /// Build from a `postgres://` URL
    pub fn from_url(url: &str, timeout: Duration) -> DbResult<Self> {
        let options = PgConnectOptions::from_str(url)?;
        let target = format!(
            "{}:{}/{}",
            options.get_host(),
            options.get_port(),
            options.get_database().unwrap_or_default()
        );

        Ok(Self {
            options,
            target,
            timeout,
        })
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgCarStore;

    async fn connect(&self) -> DbResult<PgCarStore> {
        debug!(target_db = %self.target, "Connecting to PostgreSQL");

        let conn = tokio::time::timeout(self.timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| DbError::ConnectTimeout {
                target: self.target.clone(),
                timeout: self.timeout,
            })??;

        info!(target_db = %self.target, "Connected to PostgreSQL");
        Ok(PgCarStore::new(conn))
    }
}
