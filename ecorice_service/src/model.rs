//! Reading, ReadingField, and the error types shared across the service.
//!
//! Core data types for the EcoRice field monitoring service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O, only types and the small conversions between a
//! reading and its CSV column names.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp format used in the log file and in console output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column name of the timestamp in the log header.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One timestamped snapshot of sensor values from a paddy field.
///
/// `income` and `carbon_credit` are only present in logs written with the
/// extended column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub soil_moisture: f64,  // percent, 0-100
    pub water_level: f64,    // cm above soil surface
    pub air_temp: f64,       // degrees Celsius
    pub air_humidity: f64,   // percent, 0-100
    pub co2_emissions: f64,  // ppm
    pub income: Option<f64>,
    pub carbon_credit: Option<f64>,
}

impl Reading {
    /// Returns the value of `field`, or `None` if this reading does not
    /// carry it (only possible for the optional extended fields).
    pub fn value(&self, field: ReadingField) -> Option<f64> {
        match field {
            ReadingField::SoilMoisture => Some(self.soil_moisture),
            ReadingField::WaterLevel => Some(self.water_level),
            ReadingField::AirTemp => Some(self.air_temp),
            ReadingField::AirHumidity => Some(self.air_humidity),
            ReadingField::Co2Emissions => Some(self.co2_emissions),
            ReadingField::Income => self.income,
            ReadingField::CarbonCredit => self.carbon_credit,
        }
    }

    /// Timestamp rendered the way it is stored in the log.
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// The numeric fields of a `Reading`, in log column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingField {
    SoilMoisture,
    WaterLevel,
    AirTemp,
    AirHumidity,
    Co2Emissions,
    Income,
    CarbonCredit,
}

impl ReadingField {
    /// Every field, in the order columns appear in an extended log.
    pub const ALL: [ReadingField; 7] = [
        ReadingField::SoilMoisture,
        ReadingField::WaterLevel,
        ReadingField::AirTemp,
        ReadingField::AirHumidity,
        ReadingField::Co2Emissions,
        ReadingField::Income,
        ReadingField::CarbonCredit,
    ];

    /// CSV header name for this field.
    pub fn column(self) -> &'static str {
        match self {
            ReadingField::SoilMoisture => "soil_moisture",
            ReadingField::WaterLevel => "water_level",
            ReadingField::AirTemp => "air_temp",
            ReadingField::AirHumidity => "air_humidity",
            ReadingField::Co2Emissions => "co2_emissions",
            ReadingField::Income => "income",
            ReadingField::CarbonCredit => "carbon_credit",
        }
    }

    /// Unit suffix used when a value is shown on a dashboard.
    pub fn unit(self) -> &'static str {
        match self {
            ReadingField::SoilMoisture | ReadingField::AirHumidity => "%",
            ReadingField::WaterLevel => "cm",
            ReadingField::AirTemp => "°C",
            ReadingField::Co2Emissions => "ppm",
            ReadingField::Income => "$",
            ReadingField::CarbonCredit => "credits",
        }
    }

    /// `true` for fields every reading must carry.
    pub fn is_required(self) -> bool {
        !matches!(self, ReadingField::Income | ReadingField::CarbonCredit)
    }
}

impl fmt::Display for ReadingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for ReadingField {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ReadingField::ALL
            .into_iter()
            .find(|f| f.column().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| InputError::UnknownField(wanted.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the append-only reading log.
#[derive(Debug, PartialEq)]
pub enum LogStoreError {
    /// The underlying file could not be opened, read, or written.
    Io(String),
    /// The log file does not exist yet.
    NotFound(String),
    /// A line of the log could not be parsed. The whole read is abandoned.
    Parse { line: usize, message: String },
    /// An append would make the log's timestamps decrease.
    OutOfOrder {
        last: NaiveDateTime,
        attempted: NaiveDateTime,
    },
    /// A row has no value for a field the caller asked for.
    MissingField { field: ReadingField, line: usize },
    /// The existing header matches no known layout, so an append would
    /// write rows the file cannot be read back with.
    LayoutMismatch { header: String },
}

impl fmt::Display for LogStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStoreError::Io(msg) => write!(f, "I/O error: {}", msg),
            LogStoreError::NotFound(path) => write!(f, "Log not found: {}", path),
            LogStoreError::Parse { line, message } => {
                write!(f, "Parse error on line {}: {}", line, message)
            }
            LogStoreError::OutOfOrder { last, attempted } => write!(
                f,
                "Out of order append: {} is earlier than last logged {}",
                attempted.format(TIMESTAMP_FORMAT),
                last.format(TIMESTAMP_FORMAT)
            ),
            LogStoreError::MissingField { field, line } => {
                write!(f, "Missing {} on line {}", field, line)
            }
            LogStoreError::LayoutMismatch { header } => {
                write!(f, "Log header '{}' matches no known layout; refusing to append", header)
            }
        }
    }
}

impl std::error::Error for LogStoreError {}

/// Errors raised while aggregating readings.
#[derive(Debug, PartialEq)]
pub enum AggregateError {
    /// A reading lacks a field that was requested for averaging.
    MissingField {
        field: ReadingField,
        timestamp: NaiveDateTime,
    },
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::MissingField { field, timestamp } => write!(
                f,
                "Missing {} in reading at {}",
                field,
                timestamp.format(TIMESTAMP_FORMAT)
            ),
        }
    }
}

impl std::error::Error for AggregateError {}

/// Errors raised when text supplied by a user or a display cannot be
/// interpreted.
#[derive(Debug, PartialEq)]
pub enum InputError {
    /// The text for `field` is not a number.
    InvalidValue { field: String, input: String },
    /// The name does not match any reading column.
    UnknownField(String),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::InvalidValue { field, input } => {
                write!(f, "Invalid value for {}: '{}'", field, input)
            }
            InputError::UnknownField(name) => write!(f, "Unknown field: {}", name),
        }
    }
}

impl std::error::Error for InputError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
