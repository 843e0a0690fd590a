//! Threshold insights over a single reading.
//!
//! Rules are evaluated in declaration order and compared with strict
//! inequality. In the default `AllMatches` mode every rule is independent;
//! `FirstMatch` stops at the first triggered rule, which is how the older
//! single-line recommendation panel behaved.

use crate::logging::{self, Subsystem};
use crate::model::{InputError, Reading, ReadingField};
use serde::{Deserialize, Serialize};

pub const ADD_WATER: &str = "Add water to the field.";
pub const MONITOR_CO2: &str = "Monitor CO2 levels.";
pub const ALL_OPTIMAL: &str = "All parameters are within optimal range.";

/// Water level (cm) below which the field needs topping up.
pub const LOW_WATER_CM: f64 = 7.0;

/// CO2 concentration (ppm) above which emissions need attention.
pub const HIGH_CO2_PPM: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Below,
    Above,
}

impl Comparison {
    fn triggers(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Below => value < threshold,
            Comparison::Above => value > threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    #[default]
    AllMatches,
    FirstMatch,
}

/// A single threshold rule producing one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRule {
    pub field: ReadingField,
    pub comparison: Comparison,
    pub threshold: f64,
    pub message: String,
}

impl InsightRule {
    pub fn new(field: ReadingField, comparison: Comparison, threshold: f64, message: &str) -> Self {
        Self {
            field,
            comparison,
            threshold,
            message: message.to_string(),
        }
    }
}

/// Ordered rule set plus the message shown when nothing triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightEvaluator {
    pub mode: RuleMode,
    pub rules: Vec<InsightRule>,
    pub fallback: String,
}

impl Default for InsightEvaluator {
    fn default() -> Self {
        Self {
            mode: RuleMode::AllMatches,
            rules: vec![
                InsightRule::new(ReadingField::WaterLevel, Comparison::Below, LOW_WATER_CM, ADD_WATER),
                InsightRule::new(ReadingField::Co2Emissions, Comparison::Above, HIGH_CO2_PPM, MONITOR_CO2),
            ],
            fallback: ALL_OPTIMAL.to_string(),
        }
    }
}

impl InsightEvaluator {
    /// Returns triggered messages in rule order, or the fallback alone.
    ///
    /// A rule on a field the reading does not carry never triggers.
    pub fn evaluate(&self, reading: &Reading) -> Vec<String> {
        self.evaluate_with(|field| reading.value(field))
    }

    /// Evaluates displayed measurement text such as `"6.20 cm"` or `"420"`.
    ///
    /// Fails on the first value that is not a finite number.
    pub fn evaluate_raw(&self, water_level: &str, co2_emissions: &str) -> Result<Vec<String>, InputError> {
        let water = parse_measurement(ReadingField::WaterLevel, water_level)?;
        let co2 = parse_measurement(ReadingField::Co2Emissions, co2_emissions)?;
        Ok(self.evaluate_with(|field| match field {
            ReadingField::WaterLevel => Some(water),
            ReadingField::Co2Emissions => Some(co2),
            _ => None,
        }))
    }

    fn evaluate_with<F>(&self, lookup: F) -> Vec<String>
    where
        F: Fn(ReadingField) -> Option<f64>,
    {
        let mut messages = Vec::new();
        for rule in &self.rules {
            let Some(value) = lookup(rule.field) else {
                continue;
            };
            if rule.comparison.triggers(value, rule.threshold) {
                logging::debug(
                    Subsystem::Insight,
                    None,
                    &format!("{} {} is {:?} {}", rule.field, value, rule.comparison, rule.threshold),
                );
                messages.push(rule.message.clone());
                if self.mode == RuleMode::FirstMatch {
                    break;
                }
            }
        }
        if messages.is_empty() {
            messages.push(self.fallback.clone());
        }
        messages
    }
}

/// Parses the leading number of a displayed measurement, ignoring a
/// trailing unit.
pub fn parse_measurement(field: ReadingField, text: &str) -> Result<f64, InputError> {
    let invalid = || InputError::InvalidValue {
        field: field.column().to_string(),
        input: text.to_string(),
    };
    let number = text.split_whitespace().next().ok_or_else(invalid)?;
    let value: f64 = number.parse().map_err(|_| invalid())?;
    if value.is_finite() { Ok(value) } else { Err(invalid()) }
}
