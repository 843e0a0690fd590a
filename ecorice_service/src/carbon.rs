//! Carbon credit estimation.
//!
//! Two linear formulas are in use for what is conceptually the same
//! quantity. The dashboard log derives a credit from the headroom between a
//! reading's CO2 concentration and a fixed ceiling; the payout calculator
//! converts an assumed CO2 reduction (kg) into income. They are kept as two
//! named variants and selected through configuration.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CO2 concentration (ppm) above which no credit is earned.
pub const DEFAULT_CO2_CEILING_PPM: f64 = 450.0;

/// Credits earned per ppm below the ceiling.
pub const DEFAULT_HEADROOM_COEFFICIENT: f64 = 0.1;

/// Income per kg of CO2 reduced.
pub const DEFAULT_REDUCTION_RATE: f64 = 0.5;

/// A linear carbon credit formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "formula", rename_all = "snake_case")]
pub enum CarbonEstimator {
    /// `(ceiling - value) * coefficient`, where `value` is a CO2 reading in ppm.
    Headroom { ceiling: f64, coefficient: f64 },
    /// `value * rate`, where `value` is a CO2 reduction in kg.
    Reduction { rate: f64 },
}

impl CarbonEstimator {
    pub fn headroom() -> Self {
        CarbonEstimator::Headroom {
            ceiling: DEFAULT_CO2_CEILING_PPM,
            coefficient: DEFAULT_HEADROOM_COEFFICIENT,
        }
    }

    pub fn reduction() -> Self {
        CarbonEstimator::Reduction {
            rate: DEFAULT_REDUCTION_RATE,
        }
    }

    /// Applies the formula. Total over finite input; a reading above the
    /// ceiling yields a negative credit.
    pub fn estimate(&self, value: f64) -> f64 {
        match *self {
            CarbonEstimator::Headroom { ceiling, coefficient } => (ceiling - value) * coefficient,
            CarbonEstimator::Reduction { rate } => value * rate,
        }
    }
}

impl Default for CarbonEstimator {
    fn default() -> Self {
        CarbonEstimator::headroom()
    }
}

/// Rounds to two decimal places, the precision credits and income are
/// stored at.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Bounds (kg) of the mock CO2 reduction used when none is supplied.
pub const MOCK_REDUCTION_MIN_KG: f64 = 100.0;
pub const MOCK_REDUCTION_MAX_KG: f64 = 300.0;

/// Draws a mock CO2 reduction in kg, rounded to cents.
pub fn sample_reduction<R: Rng>(rng: &mut R) -> f64 {
    round_cents(rng.gen_range(MOCK_REDUCTION_MIN_KG..=MOCK_REDUCTION_MAX_KG))
}

/// Result of converting a CO2 reduction into income.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payout {
    pub reduction_kg: f64,
    pub income: f64,
    pub currency: String,
}

impl Payout {
    pub fn new(estimator: &CarbonEstimator, reduction_kg: f64, currency: &str) -> Self {
        Self {
            reduction_kg,
            income: estimator.estimate(reduction_kg),
            currency: currency.to_string(),
        }
    }
}

impl fmt::Display for Payout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CO2 Reduction: {:.2} kg\nPotential Income: {:.2} {}",
            self.reduction_kg, self.income, self.currency
        )
    }
}
