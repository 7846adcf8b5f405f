//! Structured logging setup
//!
//! Installs a `tracing` subscriber writing to stderr, so stdout stays free for
//! command output. `RUST_LOG` takes precedence over the configured level.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use tracing_subscriber::{fmt as layer_fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level {:?}", other)),
        }
    }
}

/// Output layout of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Directive string such as `beacon_locator::processing=debug`; overrides `level`
    pub filter: Option<String>,
}

impl LogConfig {
    /// Errors only, compact
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            ..Default::default()
        }
    }

    /// Why the configured `filter` cannot be parsed, if it cannot
    pub fn filter_error(&self) -> Option<String> {
        let directives = self.filter.as_deref()?;
        EnvFilter::try_new(directives).err().map(|e| e.to_string())
    }

    /// The filter to install, plus the parse error when `filter` had to be
    /// replaced by `level`
    fn env_filter(&self) -> (EnvFilter, Option<String>) {
        let fallback = || EnvFilter::new(self.level.to_string());
        match &self.filter {
            Some(directives) => match EnvFilter::try_new(directives) {
                Ok(filter) => (filter, None),
                Err(e) => (fallback(), Some(e.to_string())),
            },
            None => (EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()), None),
        }
    }
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed, in which case the
/// existing one is left in place. An unparseable `filter` falls back to
/// `level` and is reported through the new subscriber.
pub fn init_logging(config: &LogConfig) -> bool {
    let (filter, filter_error) = config.env_filter();
    let result = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(layer_fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(layer_fmt::layer().pretty().with_writer(std::io::stderr)),
        ),
        LogFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(layer_fmt::layer().compact().with_writer(std::io::stderr)),
        ),
    };
    if let (Ok(()), Some(error)) = (&result, filter_error) {
        warn!(filter = ?config.filter, %error, level = %config.level, "invalid log filter, using level");
    }
    result.is_ok()
}
