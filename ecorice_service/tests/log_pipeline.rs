//! Log pipeline integration tests
//!
//! Tests verify:
//! 1. Appending K readings then reading back yields K rows in order
//! 2. The header is written exactly once
//! 3. Monthly aggregation over a real log file is ordered and idempotent
//! 4. A single damaged cell fails the whole read
//!
//! Everything runs against scratch files from `tempfile`; no network.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ecorice_service::aggregate::monthly_means;
use ecorice_service::carbon::CarbonEstimator;
use ecorice_service::config::{CarbonConfig, Config};
use ecorice_service::insight::InsightEvaluator;
use ecorice_service::model::{LogStoreError, Reading, ReadingField};
use ecorice_service::session::Session;
use ecorice_service::source::{ReadingSource, SensorRanges, Simulator};
use ecorice_service::store::{LogLayout, LogStore};
use std::fs;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 28).unwrap().and_hms_opt(6, 0, 0).unwrap()
}

/// Seeded readings one day apart, starting late January so they span months.
fn simulated_readings(count: usize, layout: LogLayout) -> Vec<Reading> {
    let mut sim = Simulator::seeded(SensorRanges::default(), layout, CarbonEstimator::headroom(), 2024);
    (0..count)
        .map(|i| sim.sample_at(start() + Duration::days(i as i64)))
        .collect()
}

/// Day-stepping source so `Session::record` produces ordered timestamps.
struct DailySource {
    sim: Simulator,
    next: NaiveDateTime,
}

impl ReadingSource for DailySource {
    fn next_reading(&mut self) -> Reading {
        let reading = self.sim.sample_at(self.next);
        self.next += Duration::days(1);
        reading
    }
}

fn header_count(text: &str) -> usize {
    text.lines().filter(|l| l.starts_with("timestamp,")).count()
}

// ---------------------------------------------------------------------------
// Append / read back
// ---------------------------------------------------------------------------

#[test]
fn test_append_k_readings_reads_back_k_in_order() {
    for k in [1, 2, 17] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecorice_data.csv");
        let mut store = LogStore::open(&path, LogLayout::Extended).unwrap();

        let readings = simulated_readings(k, LogLayout::Extended);
        for reading in &readings {
            store.append(reading).expect("append should succeed");
        }

        let back = store.read_all().expect("log should read back");
        assert_eq!(back, readings, "round trip of {} readings", k);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(header_count(&text), 1, "header must be written once for K={}", k);
        assert_eq!(text.lines().count(), k + 1);
    }
}

#[test]
fn test_reopened_store_appends_under_single_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecorice_data.csv");
    let readings = simulated_readings(6, LogLayout::Extended);

    for chunk in readings.chunks(2) {
        let mut store = LogStore::open(&path, LogLayout::Extended).unwrap();
        for reading in chunk {
            store.append(reading).expect("append after reopen");
        }
    }

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(header_count(&text), 1, "reopening must not repeat the header");
    let store = LogStore::open(&path, LogLayout::Extended).unwrap();
    assert_eq!(store.read_all().unwrap(), readings);
}

#[test]
fn test_basic_layout_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LogStore::open(dir.path().join("gui_data.csv"), LogLayout::Basic).unwrap();
    let readings = simulated_readings(5, LogLayout::Basic);
    for reading in &readings {
        store.append(reading).unwrap();
    }
    assert_eq!(store.read_all().unwrap(), readings);
}

#[test]
fn test_header_only_log_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecorice_data.csv");
    fs::write(&path, format!("{}\n", LogLayout::Extended.header())).unwrap();
    let store = LogStore::open(&path, LogLayout::Extended).unwrap();
    assert_eq!(store.read_all(), Ok(Vec::new()));
}

#[test]
fn test_unwritable_log_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    // The parent directory does not exist, so the file cannot be created.
    let path = dir.path().join("no_such_dir").join("ecorice_data.csv");
    let mut store = LogStore::open(&path, LogLayout::Extended)
        .expect("a missing log is not an error until it is written");
    let reading = simulated_readings(1, LogLayout::Extended).remove(0);
    assert!(matches!(store.append(&reading), Err(LogStoreError::Io(_))));
}

// ---------------------------------------------------------------------------
// Malformed logs
// ---------------------------------------------------------------------------

#[test]
fn test_one_bad_cell_fails_whole_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ecorice_data.csv");
    let mut store = LogStore::open(&path, LogLayout::Extended).unwrap();
    for reading in simulated_readings(4, LogLayout::Extended) {
        store.append(&reading).unwrap();
    }

    // Damage the co2_emissions cell of the third data row (line 4).
    let text = fs::read_to_string(&path).unwrap();
    let damaged: Vec<String> = text
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 3 {
                let mut cells: Vec<&str> = line.split(',').collect();
                cells[5] = "n/a";
                cells.join(",")
            } else {
                line.to_string()
            }
        })
        .collect();
    fs::write(&path, damaged.join("\n") + "\n").unwrap();

    match store.read_all() {
        Err(LogStoreError::Parse { line, .. }) => assert_eq!(line, 4),
        other => panic!("expected the whole read to fail, got {:?}", other),
    }
    // The same policy applies to every reader of the log.
    assert!(store.series(ReadingField::WaterLevel).is_err());
    assert!(LogStore::open(&path, LogLayout::Extended).is_err());
}

// ---------------------------------------------------------------------------
// Aggregation over a real log
// ---------------------------------------------------------------------------

#[test]
fn test_monthly_means_over_log_are_ordered_and_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = LogStore::open(dir.path().join("ecorice_data.csv"), LogLayout::Extended).unwrap();
    // Jan 28 + 40 days reaches early March: three distinct months.
    let readings = simulated_readings(40, LogLayout::Extended);
    for reading in &readings {
        store.append(reading).unwrap();
    }

    let fields = [ReadingField::Income, ReadingField::CarbonCredit];
    let logged = store.read_all().unwrap();
    let first = monthly_means(&logged, &fields).unwrap();
    let second = monthly_means(&store.read_all().unwrap(), &fields).unwrap();
    assert_eq!(first, second, "unchanged log must aggregate identically");

    let months: Vec<String> = first.iter().map(|b| b.month.to_string()).collect();
    assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
    assert_eq!(first.iter().map(|b| b.count).sum::<usize>(), 40);

    // January holds the 28th..31st: four readings.
    let january: Vec<&Reading> = readings.iter().take(4).collect();
    let expected = january.iter().map(|r| r.income.unwrap()).sum::<f64>() / 4.0;
    let got = first[0].mean(ReadingField::Income).unwrap();
    assert!((got - expected).abs() < 1e-9, "expected {}, got {}", expected, got);
}

// ---------------------------------------------------------------------------
// Session end to end
// ---------------------------------------------------------------------------

#[test]
fn test_session_records_and_summarizes() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogStore::open(dir.path().join("ecorice_data.csv"), LogLayout::Extended).unwrap();
    let source = DailySource {
        sim: Simulator::seeded(SensorRanges::default(), LogLayout::Extended, CarbonEstimator::headroom(), 5),
        next: start(),
    };
    let mut session = Session::new(source, store, InsightEvaluator::default(), CarbonConfig::default());

    for _ in 0..10 {
        let reading = session.record().expect("record should append");
        assert!(!session.insights().is_empty());
        assert_eq!(session.current(), Some(&reading));
    }

    let snapshot = session
        .snapshot(&[ReadingField::Income, ReadingField::CarbonCredit])
        .unwrap();
    assert_eq!(snapshot.monthly.len(), 2);
    assert_eq!(snapshot.monthly[0].count + snapshot.monthly[1].count, 10);
    assert_eq!(session.series(ReadingField::Co2Emissions).unwrap().len(), 10);
}

#[test]
fn test_session_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("field.csv");
    let config_path = dir.path().join("ecorice.toml");
    fs::write(
        &config_path,
        format!(
            "[log]\npath = {:?}\nlayout = \"basic\"\n\n[sensor]\nseed = 8\n\n[dashboard]\nfields = [\"water_level\"]\n",
            log_path.display().to_string()
        ),
    )
    .unwrap();

    let config = Config::load(&config_path).expect("config should load");
    let mut session = Session::from_config(&config).expect("session should build");
    session.record().expect("first record");

    let back = session.store().read_all().unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].income, None, "basic layout has no income column");
    let text = fs::read_to_string(&log_path).unwrap();
    assert!(text.starts_with("timestamp,soil_moisture,water_level,air_temp,air_humidity,co2_emissions\n"));
}

#[test]
fn test_session_over_existing_basic_log_keeps_it_readable() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("ecorice_data.csv");
    let mut basic = LogStore::open(&log_path, LogLayout::Basic).unwrap();
    basic.append(&simulated_readings(1, LogLayout::Basic)[0]).unwrap();

    // Default config asks for the extended layout.
    let mut config = Config::default();
    config.log.path = log_path.clone();
    let mut session = Session::from_config(&config).expect("session should build");
    assert_eq!(session.store().layout(), LogLayout::Basic);
    session.record().expect("append in the file's layout");

    let back = session.store().read_all().expect("log must stay readable");
    assert_eq!(back.len(), 2);
    assert_eq!(back[1].income, None);
    let text = fs::read_to_string(&log_path).unwrap();
    assert_eq!(header_count(&text), 1);
    assert!(text.lines().all(|l| l.split(',').count() == 6));
}
