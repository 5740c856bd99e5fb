//! Export of stored rows to a flat file

use carsales_common::types::StoredRecord;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Header row of the export file.
pub const EXPORT_HEADER: [&str; 17] = [
    "ID",
    "Year",
    "Maker",
    "Model",
    "Trim",
    "Body",
    "Transmission",
    "VIN",
    "State",
    "Condition",
    "Odometer",
    "Color",
    "Interior",
    "Seller",
    "MMR",
    "Selling Price",
    "Sale Date",
];

const SALE_DATE_EXPORT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Create (or truncate) `path` and write the header plus one row per record.
///
/// Returns the number of data rows written.
pub fn write_export(path: &Path, records: &[StoredRecord]) -> io::Result<usize> {
    let file = File::create(path)?;
    let written = write_records(file, records)?;
    info!(path = %path.display(), rows = written, "Wrote export file");
    Ok(written)
}

/// Write the export format to any writer, in the order given.
pub fn write_records<W: Write>(writer: W, records: &[StoredRecord]) -> io::Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(EXPORT_HEADER)?;

    for stored in records {
        writer.write_record(export_row(stored))?;
    }

    writer.flush()?;
    Ok(records.len())
}

/// Absent values become empty cells.
fn export_row(r: &StoredRecord) -> [String; 17] {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    let int = |value: Option<i32>| value.map(|v| v.to_string()).unwrap_or_default();

    [
        r.id.to_string(),
        int(r.year),
        text(&r.maker),
        text(&r.model),
        text(&r.trim),
        text(&r.body),
        text(&r.transmission),
        text(&r.vin),
        text(&r.state),
        text(&r.condition),
        int(r.odometer),
        text(&r.color),
        text(&r.interior),
        text(&r.seller),
        int(r.mmr),
        int(r.selling_price),
        r.sale_date
            .map(|date| date.format(SALE_DATE_EXPORT_FORMAT).to_string())
            .unwrap_or_default(),
    ]
}
