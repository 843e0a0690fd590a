//! Reading sources.
//!
//! A `ReadingSource` hands out one reading per call. The field simulator
//! samples every value independently and uniformly from configured ranges;
//! there is no correlation between successive readings. `FixtureSource`
//! replays prepared readings so tests never depend on the random stream.
//!
//! # Clock injection
//! `Simulator::sample_at` takes the timestamp explicitly; `next_reading`
//! is the convenience wrapper that stamps the current local time.

use crate::carbon::{CarbonEstimator, round_cents};
use crate::model::Reading;
use crate::store::LogLayout;
use chrono::{Local, NaiveDateTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Anything that can produce a sensor reading on demand.
pub trait ReadingSource {
    fn next_reading(&mut self) -> Reading;
}

// ---------------------------------------------------------------------------
// Sampling ranges
// ---------------------------------------------------------------------------

/// Inclusive uniform sampling range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRange {
    pub min: f64,
    pub max: f64,
}

impl SampleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        // Degenerate or invalid ranges pin to `min` instead of panicking.
        if self.min.partial_cmp(&self.max) != Some(Ordering::Less) {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

/// Sampling ranges for every simulated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorRanges {
    pub soil_moisture: SampleRange,
    pub water_level: SampleRange,
    pub air_temp: SampleRange,
    pub air_humidity: SampleRange,
    pub co2_emissions: SampleRange,
    pub income: SampleRange,
}

impl Default for SensorRanges {
    fn default() -> Self {
        Self {
            soil_moisture: SampleRange::new(20.0, 80.0),
            water_level: SampleRange::new(0.0, 15.0),
            air_temp: SampleRange::new(25.0, 35.0),
            air_humidity: SampleRange::new(40.0, 90.0),
            co2_emissions: SampleRange::new(300.0, 450.0),
            income: SampleRange::new(100.0, 1000.0),
        }
    }
}

impl SensorRanges {
    /// Named ranges, for validation messages.
    pub fn named(&self) -> [(&'static str, SampleRange); 6] {
        [
            ("soil_moisture", self.soil_moisture),
            ("water_level", self.water_level),
            ("air_temp", self.air_temp),
            ("air_humidity", self.air_humidity),
            ("co2_emissions", self.co2_emissions),
            ("income", self.income),
        ]
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Random field simulator.
pub struct Simulator {
    ranges: SensorRanges,
    layout: LogLayout,
    credit: CarbonEstimator,
    rng: StdRng,
}

impl Simulator {
    /// Simulator seeded from OS entropy.
    pub fn new(ranges: SensorRanges, layout: LogLayout, credit: CarbonEstimator) -> Self {
        Self::with_rng(ranges, layout, credit, StdRng::from_entropy())
    }

    /// Simulator with a reproducible random stream.
    pub fn seeded(ranges: SensorRanges, layout: LogLayout, credit: CarbonEstimator, seed: u64) -> Self {
        Self::with_rng(ranges, layout, credit, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ranges: SensorRanges, layout: LogLayout, credit: CarbonEstimator, rng: StdRng) -> Self {
        Self {
            ranges,
            layout,
            credit,
            rng,
        }
    }

    /// Samples one reading stamped with `now`.
    ///
    /// Extended layouts also get a simulated income and a carbon credit
    /// derived from the sampled CO2, both rounded to cents.
    pub fn sample_at(&mut self, now: NaiveDateTime) -> Reading {
        let co2_emissions = self.ranges.co2_emissions.sample(&mut self.rng);
        let mut reading = Reading {
            timestamp: now,
            soil_moisture: self.ranges.soil_moisture.sample(&mut self.rng),
            water_level: self.ranges.water_level.sample(&mut self.rng),
            air_temp: self.ranges.air_temp.sample(&mut self.rng),
            air_humidity: self.ranges.air_humidity.sample(&mut self.rng),
            co2_emissions,
            income: None,
            carbon_credit: None,
        };
        if self.layout == LogLayout::Extended {
            reading.income = Some(round_cents(self.ranges.income.sample(&mut self.rng)));
            reading.carbon_credit = Some(round_cents(self.credit.estimate(co2_emissions)));
        }
        reading
    }
}

impl ReadingSource for Simulator {
    fn next_reading(&mut self) -> Reading {
        let now = Local::now().naive_local();
        // The log keeps second precision.
        let now = now.with_nanosecond(0).unwrap_or(now);
        self.sample_at(now)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Replays a fixed list of readings in order, wrapping around at the end.
pub struct FixtureSource {
    readings: Vec<Reading>,
    next: usize,
}

impl FixtureSource {
    /// Returns `None` for an empty list.
    pub fn new(readings: Vec<Reading>) -> Option<Self> {
        if readings.is_empty() {
            None
        } else {
            Some(Self { readings, next: 0 })
        }
    }
}

impl ReadingSource for FixtureSource {
    fn next_reading(&mut self) -> Reading {
        let reading = self.readings[self.next].clone();
        self.next = (self.next + 1) % self.readings.len();
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_ranges_are_valid() {
        for (name, range) in SensorRanges::default().named() {
            assert!(range.is_valid(), "default range for {} should be valid", name);
        }
    }

    #[test]
    fn test_inverted_range_is_invalid() {
        assert!(!SampleRange::new(15.0, 5.0).is_valid());
        assert!(!SampleRange::new(f64::NAN, 5.0).is_valid());
        assert!(SampleRange::new(5.0, 5.0).is_valid());
    }

    #[test]
    fn test_sampled_values_stay_within_ranges() {
        let ranges = SensorRanges::default();
        let mut sim = Simulator::seeded(ranges.clone(), LogLayout::Extended, CarbonEstimator::headroom(), 7);
        for _ in 0..500 {
            let r = sim.sample_at(noon());
            assert!(ranges.soil_moisture.contains(r.soil_moisture));
            assert!(ranges.water_level.contains(r.water_level));
            assert!(ranges.air_temp.contains(r.air_temp));
            assert!(ranges.air_humidity.contains(r.air_humidity));
            assert!(ranges.co2_emissions.contains(r.co2_emissions));
            let income = r.income.expect("extended reading carries income");
            assert!(income >= 100.0 && income <= 1000.0, "income {} out of range", income);
        }
    }

    #[test]
    fn test_extended_carbon_credit_derives_from_co2() {
        let mut sim = Simulator::seeded(SensorRanges::default(), LogLayout::Extended, CarbonEstimator::headroom(), 11);
        let r = sim.sample_at(noon());
        let expected = round_cents((450.0 - r.co2_emissions) * 0.1);
        assert_eq!(r.carbon_credit, Some(expected));
    }

    #[test]
    fn test_basic_layout_omits_income_and_credit() {
        let mut sim = Simulator::seeded(SensorRanges::default(), LogLayout::Basic, CarbonEstimator::headroom(), 3);
        let r = sim.sample_at(noon());
        assert_eq!(r.income, None);
        assert_eq!(r.carbon_credit, None);
    }

    #[test]
    fn test_same_seed_gives_same_readings() {
        let mut a = Simulator::seeded(SensorRanges::default(), LogLayout::Extended, CarbonEstimator::headroom(), 42);
        let mut b = Simulator::seeded(SensorRanges::default(), LogLayout::Extended, CarbonEstimator::headroom(), 42);
        for _ in 0..10 {
            assert_eq!(a.sample_at(noon()), b.sample_at(noon()));
        }
    }

    #[test]
    fn test_next_reading_has_whole_seconds() {
        let mut sim = Simulator::new(SensorRanges::default(), LogLayout::Basic, CarbonEstimator::headroom());
        assert_eq!(sim.next_reading().timestamp.nanosecond(), 0);
    }

    #[test]
    fn test_fixture_source_cycles_in_order() {
        let mut sim = Simulator::seeded(SensorRanges::default(), LogLayout::Basic, CarbonEstimator::headroom(), 1);
        let first = sim.sample_at(noon());
        let second = sim.sample_at(noon());
        let mut fixture = FixtureSource::new(vec![first.clone(), second.clone()]).unwrap();
        assert_eq!(fixture.next_reading(), first);
        assert_eq!(fixture.next_reading(), second);
        assert_eq!(fixture.next_reading(), first);
    }

    #[test]
    fn test_fixture_source_rejects_empty_list() {
        assert!(FixtureSource::new(Vec::new()).is_none());
    }
}
