//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Source header is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Unknown source column: {0}")]
    UnknownColumn(String),
}
