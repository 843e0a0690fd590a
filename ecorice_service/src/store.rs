//! Append-only CSV log of sensor readings.
//!
//! One header row followed by one row per reading. The header is written by
//! the first append to an empty file and never again. Reads are all or
//! nothing: a single malformed row fails the whole read rather than being
//! skipped, so charts never silently drop data.
//!
//! The store assumes a single writer. Readers re-read the whole file on
//! every call and tolerate a concurrent append by simply seeing it or not.

use crate::logging::{self, Subsystem};
use crate::model::{LogStoreError, Reading, ReadingField, TIMESTAMP_COLUMN, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Column layouts
// ---------------------------------------------------------------------------

const BASIC_FIELDS: &[ReadingField] = &[
    ReadingField::SoilMoisture,
    ReadingField::WaterLevel,
    ReadingField::AirTemp,
    ReadingField::AirHumidity,
    ReadingField::Co2Emissions,
];

/// Which columns a log file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLayout {
    /// timestamp plus the five sensor values.
    Basic,
    /// Basic plus income and carbon_credit.
    #[default]
    Extended,
}

impl LogLayout {
    /// Numeric fields written after the timestamp, in column order.
    pub fn fields(self) -> &'static [ReadingField] {
        match self {
            LogLayout::Basic => BASIC_FIELDS,
            LogLayout::Extended => &ReadingField::ALL,
        }
    }

    /// The header row, without line terminator.
    pub fn header(self) -> String {
        self.columns().collect::<Vec<_>>().join(",")
    }

    /// The layout whose header is exactly `header`, ignoring a BOM and
    /// whitespace around names. A reordered or partial header matches none.
    pub fn detect(header: &str) -> Option<LogLayout> {
        let names: Vec<&str> = header
            .trim_start_matches('\u{feff}')
            .split(',')
            .map(str::trim)
            .collect();
        [LogLayout::Basic, LogLayout::Extended]
            .into_iter()
            .find(|layout| layout.columns().eq(names.iter().copied()))
    }

    fn columns(self) -> impl Iterator<Item = &'static str> {
        std::iter::once(TIMESTAMP_COLUMN).chain(self.fields().iter().map(|f| f.column()))
    }
}

/// Formats one reading as a CSV row for `layout`, without line terminator.
///
/// Optional fields the reading does not carry are written as empty cells.
pub fn format_row(reading: &Reading, layout: LogLayout) -> String {
    let mut cells = Vec::with_capacity(layout.fields().len() + 1);
    cells.push(reading.timestamp_text());
    for field in layout.fields() {
        cells.push(reading.value(*field).map(|v| v.to_string()).unwrap_or_default());
    }
    cells.join(",")
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Where each known column sits in a parsed header.
struct ColumnMap {
    width: usize,
    timestamp: usize,
    fields: Vec<(ReadingField, usize)>,
}

impl ColumnMap {
    fn from_header(header: &str) -> Result<Self, LogStoreError> {
        let names: Vec<&str> = header
            .trim_start_matches('\u{feff}')
            .split(',')
            .map(str::trim)
            .collect();
        let position = |name: &str| names.iter().position(|n| *n == name);

        let timestamp = position(TIMESTAMP_COLUMN).ok_or_else(|| LogStoreError::Parse {
            line: 1,
            message: format!("header has no '{}' column", TIMESTAMP_COLUMN),
        })?;

        let mut fields = Vec::new();
        for field in ReadingField::ALL {
            match position(field.column()) {
                Some(idx) => fields.push((field, idx)),
                None if field.is_required() => {
                    return Err(LogStoreError::Parse {
                        line: 1,
                        message: format!("header has no '{}' column", field.column()),
                    });
                }
                None => {}
            }
        }

        Ok(Self {
            width: names.len(),
            timestamp,
            fields,
        })
    }

    fn parse_row(&self, line: usize, row: &str) -> Result<Reading, LogStoreError> {
        let cells: Vec<&str> = row.split(',').map(str::trim).collect();
        if cells.len() != self.width {
            return Err(LogStoreError::Parse {
                line,
                message: format!("expected {} cells, found {}", self.width, cells.len()),
            });
        }

        let timestamp = NaiveDateTime::parse_from_str(cells[self.timestamp], TIMESTAMP_FORMAT)
            .map_err(|e| LogStoreError::Parse {
                line,
                message: format!("bad timestamp '{}': {}", cells[self.timestamp], e),
            })?;

        let mut reading = Reading {
            timestamp,
            soil_moisture: 0.0,
            water_level: 0.0,
            air_temp: 0.0,
            air_humidity: 0.0,
            co2_emissions: 0.0,
            income: None,
            carbon_credit: None,
        };

        for &(field, idx) in &self.fields {
            let value = parse_cell(line, field, cells[idx])?;
            match (field, value) {
                (ReadingField::SoilMoisture, Some(v)) => reading.soil_moisture = v,
                (ReadingField::WaterLevel, Some(v)) => reading.water_level = v,
                (ReadingField::AirTemp, Some(v)) => reading.air_temp = v,
                (ReadingField::AirHumidity, Some(v)) => reading.air_humidity = v,
                (ReadingField::Co2Emissions, Some(v)) => reading.co2_emissions = v,
                (ReadingField::Income, v) => reading.income = v,
                (ReadingField::CarbonCredit, v) => reading.carbon_credit = v,
                (_, None) => {
                    return Err(LogStoreError::Parse {
                        line,
                        message: format!("empty value for required column '{}'", field),
                    });
                }
            }
        }

        Ok(reading)
    }
}

/// Parses a numeric cell. Empty cells are `None`; anything else must be a
/// finite float.
fn parse_cell(line: usize, field: ReadingField, cell: &str) -> Result<Option<f64>, LogStoreError> {
    if cell.is_empty() {
        return Ok(None);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(LogStoreError::Parse {
            line,
            message: format!("bad {} value '{}'", field, cell),
        }),
    }
}

/// Parses log text into readings paired with their 1-based line numbers.
fn parse_numbered(text: &str) -> Result<Vec<(usize, Reading)>, LogStoreError> {
    let mut lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .enumerate()
        .map(|(i, l)| (i + 1, l));

    let Some((_, header)) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns = ColumnMap::from_header(header)?;

    let mut readings = Vec::new();
    for (line, row) in lines {
        if row.trim().is_empty() {
            continue;
        }
        readings.push((line, columns.parse_row(line, row)?));
    }
    Ok(readings)
}

/// Parses the full text of a log file.
///
/// The header decides which columns are read, so either layout is
/// accepted. An empty or header-only text yields no readings.
pub fn parse_log(text: &str) -> Result<Vec<Reading>, LogStoreError> {
    Ok(parse_numbered(text)?.into_iter().map(|(_, r)| r).collect())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// An append-only reading log backed by one CSV file.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    layout: LogLayout,
    last_timestamp: Option<NaiveDateTime>,
    /// Header of an existing file that matches no layout. Reads still work;
    /// appends are refused.
    foreign_header: Option<String>,
}

impl LogStore {
    /// Opens a log at `path`. The file is not created until the first
    /// append; an existing file is read once to learn its last timestamp.
    ///
    /// An existing header wins over `layout`: rows are always appended in
    /// the columns the file already has. Check [`LogStore::layout`] for the
    /// layout actually in use.
    pub fn open(path: impl Into<PathBuf>, layout: LogLayout) -> Result<Self, LogStoreError> {
        let path = path.into();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_error(&path, e)),
        };
        let last_timestamp = parse_numbered(&text)?.last().map(|(_, r)| r.timestamp);

        let mut store = Self {
            path,
            layout,
            last_timestamp,
            foreign_header: None,
        };
        if let Some(header) = text.lines().next() {
            let header = header.trim_end_matches('\r');
            match LogLayout::detect(header) {
                Some(found) if found != layout => {
                    logging::warn(
                        Subsystem::Store,
                        Some(&store.path.display().to_string()),
                        &format!("existing header is the {:?} layout, not {:?}; appending as {:?}", found, layout, found),
                    );
                    store.layout = found;
                }
                Some(_) => {}
                None => store.foreign_header = Some(header.to_string()),
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The layout rows are appended in.
    pub fn layout(&self) -> LogLayout {
        self.layout
    }

    /// Appends one reading, writing the header first if the file is empty.
    ///
    /// Rejects a reading older than the last one appended. I/O failures are
    /// returned to the caller and not retried.
    pub fn append(&mut self, reading: &Reading) -> Result<(), LogStoreError> {
        if let Some(header) = &self.foreign_header {
            return Err(LogStoreError::LayoutMismatch { header: header.clone() });
        }
        if let Some(last) = self.last_timestamp {
            if reading.timestamp < last {
                return Err(LogStoreError::OutOfOrder {
                    last,
                    attempted: reading.timestamp,
                });
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        let is_empty = file.metadata().map_err(|e| io_error(&self.path, e))?.len() == 0;

        let mut out = String::new();
        if is_empty {
            out.push_str(&self.layout.header());
            out.push('\n');
        }
        out.push_str(&format_row(reading, self.layout));
        out.push('\n');

        file.write_all(out.as_bytes()).map_err(|e| io_error(&self.path, e))?;
        self.last_timestamp = Some(reading.timestamp);

        logging::debug(
            Subsystem::Store,
            None,
            &format!("appended reading at {} to {}", reading.timestamp_text(), self.path.display()),
        );
        Ok(())
    }

    /// Returns every reading in file order.
    ///
    /// A missing file is `NotFound`; any malformed row fails the read.
    pub fn read_all(&self) -> Result<Vec<Reading>, LogStoreError> {
        Ok(self.read_numbered()?.into_iter().map(|(_, r)| r).collect())
    }

    /// Returns `(timestamp, value)` pairs for one field, in file order.
    pub fn series(&self, field: ReadingField) -> Result<Vec<(NaiveDateTime, f64)>, LogStoreError> {
        self.read_numbered()?
            .into_iter()
            .map(|(line, r)| {
                r.value(field)
                    .map(|v| (r.timestamp, v))
                    .ok_or(LogStoreError::MissingField { field, line })
            })
            .collect()
    }

    fn read_numbered(&self) -> Result<Vec<(usize, Reading)>, LogStoreError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LogStoreError::NotFound(self.path.display().to_string()),
            _ => io_error(&self.path, e),
        })?;
        parse_numbered(&text)
    }
}

fn io_error(path: &Path, err: std::io::Error) -> LogStoreError {
    LogStoreError::Io(format!("{}: {}", path.display(), err))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
