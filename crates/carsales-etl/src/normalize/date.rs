//! Sale date parsing
//!
//! Source dates look like `Tue Dec 16 2014 12:30:00 GMT-0800 (PST)`. The
//! offset and zone name are dropped and the remaining local time is kept as a
//! naive timestamp. The leading weekday must be a weekday name but is not
//! checked against the date.

use chrono::{NaiveDateTime, Weekday};
use regex::Regex;
use thiserror::Error;

/// Layout of the part of a sale date that follows the weekday.
pub const SALE_DATE_FORMAT: &str = "%b %d %Y %H:%M:%S";

#[derive(Debug, Error)]
pub enum DateParseError {
    #[error("'{input}' does not start with a weekday name")]
    Weekday { input: String },

    #[error("'{input}' is not a 'Www Mmm DD YYYY HH:MM:SS' date: {source}")]
    Timestamp {
        input: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl DateParseError {
    /// The text that failed to parse
    pub fn input(&self) -> &str {
        match self {
            DateParseError::Weekday { input } | DateParseError::Timestamp { input, .. } => input,
        }
    }
}

/// Parses source sale dates, discarding any timezone suffix.
#[derive(Debug, Clone)]
pub struct SaleDateParser {
    zone_suffix: Regex,
}

impl SaleDateParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            zone_suffix: Regex::new(r"GMT[+-]\d{4}")?,
        })
    }

    /// Parse a sale date.
    ///
    /// Everything from the first `GMT+HHMM`/`GMT-HHMM` token onward is cut
    /// before parsing. The weekday token is required but not cross-checked.
    pub fn parse(&self, input: &str) -> Result<NaiveDateTime, DateParseError> {
        let local = match self.zone_suffix.find(input) {
            Some(offset) => &input[..offset.start()],
            None => input,
        };

        let (weekday, timestamp) = local
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| DateParseError::Weekday {
                input: input.to_string(),
            })?;
        weekday
            .parse::<Weekday>()
            .map_err(|_| DateParseError::Weekday {
                input: input.to_string(),
            })?;

        NaiveDateTime::parse_from_str(timestamp.trim_start(), SALE_DATE_FORMAT).map_err(
            |source| DateParseError::Timestamp {
                input: input.to_string(),
                source,
            },
        )
    }
}
