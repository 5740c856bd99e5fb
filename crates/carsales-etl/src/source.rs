//! Source file reader
//!
//! Reads the delimited sales file in full and projects each data row onto the
//! 16-column schema. Header problems are fatal; a single unreadable row is not.

use carsales_common::types::{ColumnMap, RawRecord};
use carsales_common::CommonError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::RowError;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read source header: {0}")]
    Header(#[source] csv::Error),

    #[error(transparent)]
    Columns(#[from] CommonError),

    #[error("Source read aborted: {0}")]
    Read(#[source] csv::Error),
}

/// Read every row of the file at `path`
pub fn read_source(path: &Path) -> Result<Vec<Result<RawRecord, RowError>>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let rows = read_records(file)?;
    info!(path = %path.display(), rows = rows.len(), "Read source file");
    Ok(rows)
}

/// Read every row from any reader that yields the source format
///
/// Rows may be shorter than the header; missing cells are absent. Extra
/// columns are ignored.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Result<RawRecord, RowError>>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnMap::resolve(reader.headers().map_err(SourceError::Header)?.iter())?;
    debug!(?columns, "Resolved source columns");

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(Ok(columns.project(|i| record.get(i)))),
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(SourceError::Read(e));
            },
            Err(e) => rows.push(Err(RowError::Unreadable(e))),
        }
    }

    Ok(rows)
}
