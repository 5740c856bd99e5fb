//! Object store archival
//!
//! Exports are uploaded to S3 under a key derived from the run's start time,
//! e.g. `processed_data_20240305_090722.csv`.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    error::DisplayErrorContext,
    primitives::{ByteStream, ByteStreamError},
    Client,
};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::pipeline::ArchiveTarget;

/// Prefix of every archived export key.
pub const ARCHIVE_KEY_PREFIX: &str = "processed_data_";

const ARCHIVE_CONTENT_TYPE: &str = "text/csv";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read {} for upload: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ByteStreamError,
    },

    #[error("Failed to upload s3://{bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Object key for an export produced by a run that started at `started_at`
pub fn archive_key(started_at: NaiveDateTime) -> String {
    format!("{}{}.csv", ARCHIVE_KEY_PREFIX, started_at.format("%Y%m%d_%H%M%S"))
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Client using the standard AWS credential and region chain
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let storage = Self::new(Client::new(&sdk_config), bucket);

        info!(bucket = %storage.bucket, "Storage client initialized");
        storage
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Stream a local file to `s3://<bucket>/<key>`
    #[instrument(skip(self))]
    pub async fn upload_file(&self, path: &Path, key: &str) -> Result<(), StorageError> {
        debug!("Uploading {} to s3://{}/{}", path.display(), self.bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|source| StorageError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(ARCHIVE_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(())
    }
}

#[async_trait]
impl ArchiveTarget for Storage {
    async fn upload(&self, path: &Path, key: &str) -> Result<(), StorageError> {
        self.upload_file(path, key).await
    }
}
