//! Monthly aggregation of logged readings.
//!
//! Readings are bucketed by calendar month of their timestamp and reduced
//! to per-field arithmetic means. Buckets come back in ascending month
//! order so a chart built from them is always drawn left to right in time.
//!
//! Nothing here is cached; callers re-read the log and aggregate again on
//! every refresh.

use crate::model::{AggregateError, Reading, ReadingField};
use chrono::{Datelike, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A calendar month, ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Mean values of the requested fields over one month of readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub month: MonthKey,
    pub count: usize,
    pub means: BTreeMap<ReadingField, f64>,
}

impl MonthlyBucket {
    pub fn mean(&self, field: ReadingField) -> Option<f64> {
        self.means.get(&field).copied()
    }
}

/// Groups `readings` by month and averages each field in `fields`.
///
/// Every reading must carry every requested field; the first one that does
/// not fails the whole query. Empty input gives an empty result. Repeated
/// fields are averaged once.
pub fn monthly_means(
    readings: &[Reading],
    fields: &[ReadingField],
) -> Result<Vec<MonthlyBucket>, AggregateError> {
    let fields: BTreeSet<ReadingField> = fields.iter().copied().collect();
    let mut sums: BTreeMap<MonthKey, (usize, BTreeMap<ReadingField, f64>)> = BTreeMap::new();

    for reading in readings {
        let (count, totals) = sums.entry(MonthKey::of(&reading.timestamp)).or_default();
        *count += 1;
        for &field in &fields {
            let value = reading.value(field).ok_or(AggregateError::MissingField {
                field,
                timestamp: reading.timestamp,
            })?;
            *totals.entry(field).or_insert(0.0) += value;
        }
    }

    Ok(sums
        .into_iter()
        .map(|(month, (count, totals))| MonthlyBucket {
            month,
            count,
            means: totals
                .into_iter()
                .map(|(field, total)| (field, total / count as f64))
                .collect(),
        })
        .collect())
}

/// Flattens buckets into `(month label, mean)` pairs for one field,
/// the shape a bar or line chart consumes.
pub fn chart_points(buckets: &[MonthlyBucket], field: ReadingField) -> Vec<(String, f64)> {
    buckets
        .iter()
        .filter_map(|b| b.mean(field).map(|m| (b.month.to_string(), m)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
