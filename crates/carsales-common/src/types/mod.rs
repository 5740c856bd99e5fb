//! Record types for vehicle sale transactions
//!
//! A sale flows through three shapes:
//!
//! - [`RawRecord`]: the 16 source cells as optional, trimmed strings
//! - [`NormalizedRecord`]: typed and defaulted, ready for the `cars` table
//! - [`StoredRecord`]: a `cars` row as read back, with its store-assigned id

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

// ============================================================================
// Source Schema
// ============================================================================

/// One column of the source file, in source header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceField {
    Year,
    Make,
    Model,
    Trim,
    Body,
    Transmission,
    Vin,
    State,
    Condition,
    Odometer,
    Color,
    Interior,
    Seller,
    Mmr,
    SellingPrice,
    SaleDate,
}

impl SourceField {
    /// Number of columns in the source schema.
    pub const COUNT: usize = 16;

    /// Every column, in source header order.
    pub const ALL: [SourceField; Self::COUNT] = [
        SourceField::Year,
        SourceField::Make,
        SourceField::Model,
        SourceField::Trim,
        SourceField::Body,
        SourceField::Transmission,
        SourceField::Vin,
        SourceField::State,
        SourceField::Condition,
        SourceField::Odometer,
        SourceField::Color,
        SourceField::Interior,
        SourceField::Seller,
        SourceField::Mmr,
        SourceField::SellingPrice,
        SourceField::SaleDate,
    ];

    /// Header name as it appears in the source file.
    pub fn column_name(self) -> &'static str {
        match self {
            SourceField::Year => "year",
            SourceField::Make => "make",
            SourceField::Model => "model",
            SourceField::Trim => "trim",
            SourceField::Body => "body",
            SourceField::Transmission => "transmission",
            SourceField::Vin => "vin",
            SourceField::State => "state",
            SourceField::Condition => "condition",
            SourceField::Odometer => "odometer",
            SourceField::Color => "color",
            SourceField::Interior => "interior",
            SourceField::Seller => "seller",
            SourceField::Mmr => "mmr",
            SourceField::SellingPrice => "sellingprice",
            SourceField::SaleDate => "saledate",
        }
    }

    /// Integer columns default to 0 when empty; every other column becomes absent.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SourceField::Year | SourceField::Odometer | SourceField::Mmr | SourceField::SellingPrice
        )
    }

    fn position(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for SourceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

impl std::str::FromStr for SourceField {
    type Err = CommonError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SourceField::ALL
            .into_iter()
            .find(|field| field.column_name() == s)
            .ok_or_else(|| CommonError::UnknownColumn(s.to_string()))
    }
}

// ============================================================================
// Raw Records
// ============================================================================

/// One source row keyed by [`SourceField`].
///
/// Values are trimmed on the way in and whitespace-only cells are stored as
/// `None`, so "absent" and "empty" are indistinguishable downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    values: [Option<String>; SourceField::COUNT],
}

impl RawRecord {
    /// Create a record with every field absent
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, returning the record for chaining
    pub fn with(mut self, field: SourceField, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    pub fn set(&mut self, field: SourceField, value: Option<String>) {
        self.values[field.position()] = value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else if trimmed.len() == v.len() {
                Some(v)
            } else {
                Some(trimmed.to_string())
            }
        });
    }

    pub fn get(&self, field: SourceField) -> Option<&str> {
        self.values[field.position()].as_deref()
    }

    /// Move a field's value out of the record.
    pub fn take(&mut self, field: SourceField) -> Option<String> {
        self.values[field.position()].take()
    }
}

/// Positions of the schema columns within a particular source header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    indices: [usize; SourceField::COUNT],
}

impl ColumnMap {
    /// Locate every schema column in a header row.
    ///
    /// Extra columns are ignored; any missing schema column is an error so a
    /// mislabelled file fails before a single row is loaded.
    pub fn resolve<'a, I>(header: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found: [Option<usize>; SourceField::COUNT] = [None; SourceField::COUNT];

        for (index, name) in header.into_iter().enumerate() {
            if let Ok(field) = name.trim().parse::<SourceField>() {
                found[field.position()].get_or_insert(index);
            }
        }

        let missing: Vec<String> = SourceField::ALL
            .into_iter()
            .filter(|field| found[field.position()].is_none())
            .map(|field| field.column_name().to_string())
            .collect();

        if !missing.is_empty() {
            return Err(CommonError::MissingColumns(missing));
        }

        let mut indices = [0usize; SourceField::COUNT];
        for field in SourceField::ALL {
            indices[field.position()] = found[field.position()].unwrap_or_default();
        }

        Ok(Self { indices })
    }

    pub fn index_of(&self, field: SourceField) -> Option<usize> {
        self.indices.get(field.position()).copied()
    }

    /// Build a [`RawRecord`] from a row, where `cell(i)` returns the i-th cell
    /// or `None` for a short row.
    pub fn project<'a, F>(&self, cell: F) -> RawRecord
    where
        F: Fn(usize) -> Option<&'a str>,
    {
        let mut record = RawRecord::new();
        for field in SourceField::ALL {
            let value = cell(self.indices[field.position()]).map(str::to_string);
            record.set(field, value);
        }
        record
    }
}

// ============================================================================
// Normalized Records
// ============================================================================

/// A validated sale, shaped like a row of the `cars` table.
///
/// Integer columns are never absent (missing values are 0). Text columns are
/// never empty strings (missing values are `None`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub year: i32,
    pub maker: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub body: Option<String>,
    pub transmission: Option<String>,
    pub vin: Option<String>,
    pub state: Option<String>,
    pub condition: Option<String>,
    pub odometer: i32,
    pub color: Option<String>,
    pub interior: Option<String>,
    pub seller: Option<String>,
    pub mmr: i32,
    pub selling_price: i32,
    /// Local calendar time of the sale; the source timezone is discarded.
    pub sale_date: Option<NaiveDateTime>,
}

// ============================================================================
// Stored Records
// ============================================================================

/// A row of the `cars` table as read back, with its generated primary key.
///
/// Every column is nullable in the store, including the integer ones, so rows
/// written by anything other than this pipeline are represented verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i32,
    pub year: Option<i32>,
    pub maker: Option<String>,
    pub model: Option<String>,
    pub trim: Option<String>,
    pub body: Option<String>,
    pub transmission: Option<String>,
    pub vin: Option<String>,
    pub state: Option<String>,
    pub condition: Option<String>,
    pub odometer: Option<i32>,
    pub color: Option<String>,
    pub interior: Option<String>,
    pub seller: Option<String>,
    pub mmr: Option<i32>,
    pub selling_price: Option<i32>,
    pub sale_date: Option<NaiveDateTime>,
}

impl StoredRecord {
    /// The row a store holds after inserting `record` under `id`
    pub fn from_normalized(id: i32, record: NormalizedRecord) -> Self {
        Self {
            id,
            year: Some(record.year),
            maker: record.maker,
            model: record.model,
            trim: record.trim,
            body: record.body,
            transmission: record.transmission,
            vin: record.vin,
            state: record.state,
            condition: record.condition,
            odometer: Some(record.odometer),
            color: record.color,
            interior: record.interior,
            seller: record.seller,
            mmr: Some(record.mmr),
            selling_price: Some(record.selling_price),
            sale_date: record.sale_date,
        }
    }
}
