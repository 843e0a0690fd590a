//! Structured logging for the field monitoring service
//!
//! Provides context-rich logging with subsystem tags, optional log file
//! identifiers, timestamps, and severity levels. Supports both console
//! output and file-based logging for long-running refresh loops.

use crate::model::LogStoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subsystems
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Sensor,
    Store,
    Aggregator,
    Insight,
    Carbon,
    System,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Sensor => write!(f, "SENSOR"),
            Subsystem::Store => write!(f, "STORE"),
            Subsystem::Aggregator => write!(f, "AGG"),
            Subsystem::Insight => write!(f, "INSIGHT"),
            Subsystem::Carbon => write!(f, "CARBON"),
            Subsystem::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - e.g. no readings have been saved yet
    Expected,
    /// Unexpected failure - the log is damaged or the disk is unwritable
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn log(&self, level: LogLevel, subsystem: Subsystem, target: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let entry = format_entry(&timestamp, level, subsystem, target, message);
        let target_part = target.map(|t| format!(" [{}]", t)).unwrap_or_default();

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", entry),
                LogLevel::Warning => eprintln!("   {}", entry),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", subsystem, target_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", subsystem, target_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {}  // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// One log line as written to the log file.
fn format_entry(
    timestamp: &str,
    level: LogLevel,
    subsystem: Subsystem,
    target: Option<&str>,
    message: &str,
) -> String {
    let target_part = target.map(|t| format!(" [{}]", t)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, subsystem, target_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, subsystem: Subsystem, target: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, subsystem, target, message);
        }
    }
}

/// Log a general informational message
pub fn info(subsystem: Subsystem, target: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, subsystem, target, message);
}

/// Log a warning message
pub fn warn(subsystem: Subsystem, target: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, subsystem, target, message);
}

/// Log an error message
pub fn error(subsystem: Subsystem, target: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, subsystem, target, message);
}

/// Log a debug message
pub fn debug(subsystem: Subsystem, target: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, subsystem, target, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a reading log failure
pub fn classify_store_failure(err: &LogStoreError) -> FailureType {
    match err {
        // Nothing has been saved yet; the dashboard just shows "no data"
        LogStoreError::NotFound(_) => FailureType::Expected,
        LogStoreError::Io(_)
        | LogStoreError::Parse { .. }
        | LogStoreError::OutOfOrder { .. }
        | LogStoreError::LayoutMismatch { .. } => FailureType::Unexpected,
        LogStoreError::MissingField { .. } => FailureType::Unknown,
    }
}

/// Log a reading log failure with automatic classification
pub fn log_store_failure(log_path: &str, operation: &str, err: &LogStoreError) {
    let failure_type = classify_store_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Expected => debug(Subsystem::Store, Some(log_path), &message),
        FailureType::Unexpected => error(Subsystem::Store, Some(log_path), &message),
        FailureType::Unknown => warn(Subsystem::Store, Some(log_path), &message),
    }
}

// ---------------------------------------------------------------------------
// Simulation Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a simulation run
pub fn log_simulation_summary(total: usize, saved: usize, failed: usize) {
    let message = format!(
        "Simulation complete: {}/{} saved, {} failed",
        saved,
        total,
        failed
    );

    if failed == 0 {
        info(Subsystem::Sensor, None, &message);
    } else if saved == 0 {
        error(Subsystem::Sensor, None, &message);
    } else {
        warn(Subsystem::Sensor, None, &message);
    }
}
