//! Carsales Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared record types, error handling, and logging for the carsales ETL
//! workspace.
//!
//! # Overview
//!
//! - **Types**: the 16-column source schema, raw and normalized sale records
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Logging**: console/file `tracing` setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use carsales_common::types::{ColumnMap, SourceField};
//!
//! fn resolve(header: &[&str]) -> carsales_common::Result<ColumnMap> {
//!     let columns = ColumnMap::resolve(header.iter().copied())?;
//!     assert!(columns.index_of(SourceField::Vin).is_some());
//!     Ok(columns)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
