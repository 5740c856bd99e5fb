//! Row normalization
//!
//! Turns a [`RawRecord`] into a typed [`NormalizedRecord`] or rejects it.
//!
//! Policy, applied in order:
//!
//! 1. Empty or missing cells: integer columns become `0`, text columns `None`.
//! 2. `saledate` is parsed with [`SaleDateParser`]; a bad date is logged with
//!    the row index and becomes `None`. The row is kept.
//! 3. `make` is stored as `maker`.
//! 4. Columns for which [`SourceField::is_numeric`] holds are parsed as `i32`;
//!    a non-empty value that does not parse rejects the whole row.
//!
//! Rejected rows are dropped. Accepted rows keep their source order.

pub mod date;

use carsales_common::types::{NormalizedRecord, RawRecord, SourceField};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info};

pub use date::{DateParseError, SaleDateParser};

/// Why a source row was skipped
#[derive(Debug, Error)]
pub enum RowError {
    #[error("{field} value '{value}' is not a valid integer")]
    InvalidInteger { field: SourceField, value: String },

    #[error("row could not be read: {0}")]
    Unreadable(#[source] csv::Error),
}

/// A skipped row and the reason
#[derive(Debug)]
pub struct Rejection {
    /// 1-based data row number in the source file
    pub index: usize,
    pub error: RowError,
}

/// Result of normalizing a whole source file
#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub accepted: Vec<NormalizedRecord>,
    pub rejected: Vec<Rejection>,
    /// Accepted rows whose sale date was present but unparseable
    pub date_fallbacks: usize,
}

impl NormalizeReport {
    pub fn rows_read(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}

/// Validates and types source rows.
#[derive(Debug, Clone)]
pub struct Normalizer {
    dates: SaleDateParser,
}

impl Normalizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            dates: SaleDateParser::new()?,
        })
    }

    /// Normalize one row. `index` is only used for diagnostics.
    pub fn normalize(
        &self,
        mut raw: RawRecord,
        index: usize,
    ) -> Result<NormalizedRecord, RowError> {
        let sale_date = match raw.take(SourceField::SaleDate) {
            Some(text) => match self.dates.parse(&text) {
                Ok(date) => Some(date),
                Err(e) => {
                    error!(row = index, error = %e, "Invalid sale date, storing none");
                    None
                },
            },
            None => None,
        };

        let integers = SourceField::ALL
            .into_iter()
            .filter(|field| field.is_numeric())
            .map(|field| integer(&raw, field).map(|value| (field, value)))
            .collect::<Result<HashMap<_, _>, _>>()?;
        let int = |field: SourceField| integers.get(&field).copied().unwrap_or_default();

        Ok(NormalizedRecord {
            year: int(SourceField::Year),
            maker: raw.take(SourceField::Make),
            model: raw.take(SourceField::Model),
            trim: raw.take(SourceField::Trim),
            body: raw.take(SourceField::Body),
            transmission: raw.take(SourceField::Transmission),
            vin: raw.take(SourceField::Vin),
            state: raw.take(SourceField::State),
            condition: raw.take(SourceField::Condition),
            odometer: int(SourceField::Odometer),
            color: raw.take(SourceField::Color),
            interior: raw.take(SourceField::Interior),
            seller: raw.take(SourceField::Seller),
            mmr: int(SourceField::Mmr),
            selling_price: int(SourceField::SellingPrice),
            sale_date,
        })
    }

    /// Normalize every row, keeping accepted rows in order.
    ///
    /// Rows numbered from 1. A row that failed to read is rejected like any
    /// other bad row; neither stops the batch.
    pub fn normalize_all<I>(&self, rows: I) -> NormalizeReport
    where
        I: IntoIterator<Item = Result<RawRecord, RowError>>,
    {
        let mut report = NormalizeReport::default();

        for (index, row) in rows.into_iter().enumerate().map(|(i, row)| (i + 1, row)) {
            let outcome = row.and_then(|raw| {
                let had_date = raw.get(SourceField::SaleDate).is_some();
                self.normalize(raw, index).map(|record| (record, had_date))
            });

            match outcome {
                Ok((record, had_date)) => {
                    if had_date && record.sale_date.is_none() {
                        report.date_fallbacks += 1;
                    }
                    report.accepted.push(record);
                },
                Err(e) => {
                    error!(row = index, error = %e, "Row rejected");
                    report.rejected.push(Rejection { index, error: e });
                },
            }
        }

        info!(
            read = report.rows_read(),
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            date_fallbacks = report.date_fallbacks,
            "Normalized source rows"
        );

        report
    }
}

fn integer(raw: &RawRecord, field: SourceField) -> Result<i32, RowError> {
    match raw.get(field) {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| RowError::InvalidInteger {
            field,
            value: value.to_string(),
        }),
    }
}
