//! Service configuration loaded from `ecorice.toml`.
//!
//! Every key has a default, so a missing file or an empty table simply
//! yields the stock dashboard behavior. A `.env` file (via `dotenv`) may set
//! `ECORICE_CONFIG` to point at another config file and `ECORICE_LOG_PATH`
//! to override the reading log location.

use crate::carbon::CarbonEstimator;
use crate::insight::InsightEvaluator;
use crate::logging::LogLevel;
use crate::model::ReadingField;
use crate::source::SensorRanges;
use crate::store::LogLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "ecorice.toml";
pub const DEFAULT_LOG_PATH: &str = "ecorice_data.csv";
pub const CONFIG_PATH_VAR: &str = "ECORICE_CONFIG";
pub const LOG_PATH_VAR: &str = "ECORICE_LOG_PATH";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: PathBuf,
    pub layout: LogLayout,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
            layout: LogLayout::Extended,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Fixed seed for a reproducible simulation; entropy when absent.
    pub seed: Option<u64>,
    #[serde(flatten)]
    pub ranges: SensorRanges,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonConfig {
    /// Formula that turns a reading's CO2 into the logged carbon credit.
    pub credit: CarbonEstimator,
    /// Formula that turns a CO2 reduction (kg) into income.
    pub payout: CarbonEstimator,
    pub currency: String,
}

impl Default for CarbonConfig {
    fn default() -> Self {
        Self {
            credit: CarbonEstimator::headroom(),
            payout: CarbonEstimator::reduction(),
            currency: "THB".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Seconds between refreshes in watch mode.
    pub refresh_secs: u64,
    /// Fields averaged per month when none are named on the command line.
    pub fields: Vec<ReadingField>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 10,
            fields: vec![ReadingField::Income, ReadingField::CarbonCredit],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: false,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub sensor: SensorConfig,
    pub insight: InsightEvaluator,
    pub carbon: CarbonConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    Io(String),
    /// The file is not valid TOML for this schema.
    Parse(String),
    /// The values parsed but do not make sense together.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Config I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Config parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(format!("{}: {}", path.display(), e))),
        }
    }

    /// Loads configuration honoring `.env` and the `ECORICE_*` variables.
    ///
    /// `explicit` (e.g. from a command line flag) wins over the environment.
    pub fn from_env(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::resolve(
            explicit,
            std::env::var(CONFIG_PATH_VAR).ok(),
            std::env::var(LOG_PATH_VAR).ok(),
        )
    }

    /// Picks the config file and log path from the given overrides.
    pub fn resolve(
        explicit: Option<&Path>,
        config_var: Option<String>,
        log_path_var: Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| config_var.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::load(&path)?;
        if let Some(log_path) = log_path_var.filter(|p| !p.trim().is_empty()) {
            config.log.path = PathBuf::from(log_path);
        }
        Ok(config)
    }

    /// Rejects settings that would panic or always fail later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, range) in self.sensor.ranges.named() {
            if !range.is_valid() {
                return Err(ConfigError::Invalid(format!(
                    "sensor range for {} must satisfy min <= max, got {}..{}",
                    name, range.min, range.max
                )));
            }
        }

        if self.dashboard.refresh_secs == 0 {
            return Err(ConfigError::Invalid("dashboard.refresh_secs must be positive".to_string()));
        }

        if self.log.layout == LogLayout::Basic {
            if let Some(field) = self.dashboard.fields.iter().find(|f| !f.is_required()) {
                return Err(ConfigError::Invalid(format!(
                    "dashboard field {} is not recorded in a basic log",
                    field
                )));
            }
        }

        if let Some(rule) = self.insight.rules.iter().find(|r| !r.threshold.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "insight rule '{}' has a non-finite threshold",
                rule.message
            )));
        }

        Ok(())
    }
}
