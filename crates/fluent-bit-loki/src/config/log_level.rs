//! Log level configuration for the plugin.
//!
//! This module defines the `LogLevel` enum and parses it from the `LogLevel`
//! plugin key (case-insensitive).
//!
//! # Log Levels
//!
//! Ordered from least to most verbose:
//! - **ERROR**: Failures that drop records or prevent startup
//! - **WARN**: Recoverable oddities, e.g. an unrecognized timestamp encoding
//! - **INFO**: Startup banner and the resolved parameters (default)
//! - **DEBUG**: Per-record processing details
//! - **TRACE**: Extremely verbose troubleshooting output

use std::str::FromStr;

use tracing_subscriber::filter::LevelFilter;

/// Plugin log level controlling verbosity of diagnostics.
///
/// # Parsing
///
/// ```
/// use fluent_bit_loki::config::log_level::LogLevel;
/// use std::str::FromStr;
///
/// assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
/// assert_eq!(LogLevel::from_str("WARN").unwrap(), LogLevel::Warn);
/// assert!(LogLevel::from_str("verbose").is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Provides string representation of log levels in lowercase format, matching
/// what operators write in the fluent-bit configuration.
impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl LogLevel {
    /// Converts this `LogLevel` to a `tracing` level filter.
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Parses log levels from strings with case-insensitive matching.
///
/// # Errors
///
/// Returns an error string describing the invalid input and listing valid options.
impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "invalid log level '{s}', valid levels are: error, warn, info, debug, trace",
            )),
        }
    }
}
