//! Reading session: the explicit owner of the "current reading".
//!
//! A session holds the reading source, the log, the insight rules, and the
//! carbon formulas, and is passed to every dashboard operation. There is no
//! process-wide state; two sessions over two logs never interfere.

use crate::aggregate::{MonthlyBucket, monthly_means};
use crate::carbon::Payout;
use crate::config::{CarbonConfig, Config};
use crate::insight::InsightEvaluator;
use crate::logging::{self, Subsystem};
use crate::model::{AggregateError, LogStoreError, Reading, ReadingField};
use crate::source::{ReadingSource, Simulator};
use crate::store::LogStore;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum SessionError {
    Store(LogStoreError),
    Aggregate(AggregateError),
    /// Save was requested before any reading was taken.
    NoReading,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Store(e) => write!(f, "{}", e),
            SessionError::Aggregate(e) => write!(f, "{}", e),
            SessionError::NoReading => write!(f, "No reading has been taken yet"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Store(e) => Some(e),
            SessionError::Aggregate(e) => Some(e),
            SessionError::NoReading => None,
        }
    }
}

impl From<LogStoreError> for SessionError {
    fn from(e: LogStoreError) -> Self {
        SessionError::Store(e)
    }
}

impl From<AggregateError> for SessionError {
    fn from(e: AggregateError) -> Self {
        SessionError::Aggregate(e)
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything a dashboard needs for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub current: Option<Reading>,
    pub insights: Vec<String>,
    pub monthly: Vec<MonthlyBucket>,
}

impl DashboardSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session<S: ReadingSource> {
    source: S,
    store: LogStore,
    evaluator: InsightEvaluator,
    carbon: CarbonConfig,
    current: Option<Reading>,
}

impl Session<Simulator> {
    /// Builds a simulator-backed session from configuration.
    ///
    /// The simulator samples in the layout the store settled on, which is
    /// the existing file's when it already has a header.
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let store = LogStore::open(&config.log.path, config.log.layout)?;
        let layout = store.layout();
        let simulator = match config.sensor.seed {
            Some(seed) => Simulator::seeded(config.sensor.ranges.clone(), layout, config.carbon.credit, seed),
            None => Simulator::new(config.sensor.ranges.clone(), layout, config.carbon.credit),
        };
        Ok(Self::new(simulator, store, config.insight.clone(), config.carbon.clone()))
    }
}

impl<S: ReadingSource> Session<S> {
    pub fn new(source: S, store: LogStore, evaluator: InsightEvaluator, carbon: CarbonConfig) -> Self {
        Self {
            source,
            store,
            evaluator,
            carbon,
            current: None,
        }
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn current(&self) -> Option<&Reading> {
        self.current.as_ref()
    }

    /// Takes a new reading from the source and makes it current.
    pub fn refresh(&mut self) -> &Reading {
        let reading = self.source.next_reading();
        logging::debug(
            Subsystem::Sensor,
            None,
            &format!(
                "reading at {}: water {:.2} cm, co2 {:.2} ppm",
                reading.timestamp_text(),
                reading.water_level,
                reading.co2_emissions
            ),
        );
        self.current.insert(reading)
    }

    /// Appends the current reading to the log.
    pub fn save_current(&mut self) -> Result<(), SessionError> {
        let reading = self.current.as_ref().ok_or(SessionError::NoReading)?;
        self.store.append(reading)?;
        Ok(())
    }

    /// Takes a new reading and appends it in one step.
    pub fn record(&mut self) -> Result<Reading, SessionError> {
        let reading = self.refresh().clone();
        self.save_current()?;
        Ok(reading)
    }

    /// Insights for the current reading; empty before the first refresh.
    pub fn insights(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(|r| self.evaluator.evaluate(r))
            .unwrap_or_default()
    }

    /// Re-reads the whole log and averages `fields` per month.
    pub fn monthly_summary(&self, fields: &[ReadingField]) -> Result<Vec<MonthlyBucket>, SessionError> {
        let readings = self.store.read_all()?;
        let buckets = monthly_means(&readings, fields)?;
        logging::debug(
            Subsystem::Aggregator,
            None,
            &format!("{} readings in {} months", readings.len(), buckets.len()),
        );
        Ok(buckets)
    }

    /// `(timestamp, value)` history of one field, straight from the log.
    pub fn series(&self, field: ReadingField) -> Result<Vec<(NaiveDateTime, f64)>, SessionError> {
        Ok(self.store.series(field)?)
    }

    /// Converts a CO2 reduction in kg into income with the payout formula.
    pub fn payout(&self, reduction_kg: f64) -> Payout {
        Payout::new(&self.carbon.payout, reduction_kg, &self.carbon.currency)
    }

    /// Carbon credit of the current reading under the credit formula.
    pub fn current_credit(&self) -> Option<f64> {
        self.current.as_ref().map(|r| self.carbon.credit.estimate(r.co2_emissions))
    }

    /// Builds a render snapshot. A log that does not exist yet yields no
    /// monthly buckets instead of an error; any other failure propagates.
    pub fn snapshot(&self, fields: &[ReadingField]) -> Result<DashboardSnapshot, SessionError> {
        let monthly = match self.monthly_summary(fields) {
            Ok(buckets) => buckets,
            Err(SessionError::Store(LogStoreError::NotFound(_))) => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(DashboardSnapshot {
            current: self.current.clone(),
            insights: self.insights(),
            monthly,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::{ADD_WATER, ALL_OPTIMAL, MONITOR_CO2};
    use crate::source::FixtureSource;
    use crate::store::LogLayout;
    use chrono::NaiveDate;

    fn reading(month: u32, day: u32, water_level: f64, co2_emissions: f64) -> Reading {
        Reading {
            timestamp: NaiveDate::from_ymd_opt(2024, month, day).unwrap().and_hms_opt(8, 0, 0).unwrap(),
            soil_moisture: 55.0,
            water_level,
            air_temp: 28.0,
            air_humidity: 75.0,
            co2_emissions,
            income: Some(100.0 * month as f64),
            carbon_credit: Some((450.0 - co2_emissions) * 0.1),
        }
    }

    fn session_with(
        dir: &tempfile::TempDir,
        readings: Vec<Reading>,
    ) -> Session<FixtureSource> {
        let store = LogStore::open(dir.path().join("ecorice_data.csv"), LogLayout::Extended).unwrap();
        Session::new(
            FixtureSource::new(readings).unwrap(),
            store,
            InsightEvaluator::default(),
            CarbonConfig::default(),
        )
    }

    #[test]
    fn test_save_before_refresh_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&dir, vec![reading(1, 1, 10.0, 350.0)]);
        assert_eq!(session.save_current(), Err(SessionError::NoReading));
        assert!(session.insights().is_empty());
    }

    #[test]
    fn test_refresh_drives_insights() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&dir, vec![reading(1, 1, 5.0, 420.0), reading(1, 2, 10.0, 350.0)]);

        session.refresh();
        assert_eq!(session.insights(), vec![ADD_WATER.to_string(), MONITOR_CO2.to_string()]);

        session.refresh();
        assert_eq!(session.insights(), vec![ALL_OPTIMAL.to_string()]);
    }

    #[test]
    fn test_record_then_monthly_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(
            &dir,
            vec![reading(1, 5, 10.0, 350.0), reading(1, 20, 10.0, 370.0), reading(2, 1, 10.0, 390.0)],
        );
        for _ in 0..3 {
            session.record().expect("append should succeed");
        }
        let buckets = session
            .monthly_summary(&[ReadingField::Co2Emissions])
            .expect("log should aggregate");
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].month.to_string(), "2024-01");
        assert_eq!(buckets[0].mean(ReadingField::Co2Emissions), Some(360.0));
        assert_eq!(buckets[1].mean(ReadingField::Co2Emissions), Some(390.0));
    }

    #[test]
    fn test_snapshot_without_log_has_no_months() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&dir, vec![reading(3, 1, 6.0, 380.0)]);
        session.refresh();
        let snapshot = session.snapshot(&[ReadingField::Income]).expect("missing log is tolerated");
        assert!(snapshot.monthly.is_empty());
        assert_eq!(snapshot.insights, vec![ADD_WATER.to_string()]);
        assert!(snapshot.current.is_some());
    }

    #[test]
    fn test_monthly_summary_without_log_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(&dir, vec![reading(3, 1, 6.0, 380.0)]);
        assert!(matches!(
            session.monthly_summary(&[ReadingField::Income]),
            Err(SessionError::Store(LogStoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_payout_and_current_credit() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&dir, vec![reading(3, 1, 9.0, 300.0)]);
        assert_eq!(session.current_credit(), None);
        session.refresh();
        let credit = session.current_credit().unwrap();
        assert!((credit - 15.0).abs() < 1e-9);

        let payout = session.payout(200.0);
        assert!((payout.income - 100.0).abs() < 1e-9);
        assert_eq!(payout.currency, "THB");
    }

    #[test]
    fn test_snapshot_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with(&dir, vec![reading(4, 1, 10.0, 350.0)]);
        session.record().unwrap();
        let json = session
            .snapshot(&[ReadingField::Income, ReadingField::CarbonCredit])
            .unwrap()
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["monthly"][0]["month"], "2024-04");
        assert_eq!(value["monthly"][0]["means"]["income"], 400.0);
        assert_eq!(value["insights"][0], ALL_OPTIMAL);
        assert_eq!(value["current"]["water_level"], 10.0);
    }
}
