//! Logging setup.
//!
//! Readers log through `tracing` macros and never install a subscriber
//! themselves. Embedding programs (and tests) call [`init_logging`] once; a
//! second call is a harmless no-op.
//!
//! Levels used across the crate:
//! - `error!`: a split-fatal failure, logged with container path and location
//!   right before it propagates
//! - `warn!`: tolerated corruption (dropped attribute, missing optional
//!   archive sidecar, short delimited row)
//! - `debug!`: split planning decisions
//! - `trace!`: split open and close
//!
//! ```no_run
//! use ironload::logging::{LogConfig, init_logging};
//!
//! let config = LogConfig::from_env().unwrap_or_default();
//! init_logging(&config).unwrap();
//! ```

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LEVEL_ENV: &str = "IRONLOAD_LOG";
pub const FORMAT_ENV: &str = "IRONLOAD_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(anyhow!("invalid log level: {s}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow!("invalid log format: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Extra filter directives, e.g. `ironload::io::xml=trace`.
    pub filter_directives: Option<String>,
}

impl LogConfig {
    /// Read [`LEVEL_ENV`] and [`FORMAT_ENV`]; unset variables keep defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(level) = std::env::var(LEVEL_ENV) {
            config.level = level.parse().with_context(|| format!("{LEVEL_ENV}={level}"))?;
        }
        if let Ok(format) = std::env::var(FORMAT_ENV) {
            config.format = format
                .parse()
                .with_context(|| format!("{FORMAT_ENV}={format}"))?;
        }
        Ok(config)
    }

    fn filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(self.level.to_tracing_level().into())
            .from_env_lossy();
        if let Some(directives) = &self.filter_directives {
            for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
                filter = filter.add_directive(
                    directive
                        .trim()
                        .parse()
                        .with_context(|| format!("parse filter directive {directive:?}"))?,
                );
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber. Returns `Ok(false)` when one was already set.
pub fn init_logging(config: &LogConfig) -> Result<bool> {
    let filter = config.filter()?;
    let layer = tfmt::layer().with_writer(std::io::stderr).with_target(true);
    let installed = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .try_init(),
    };
    Ok(installed.is_ok())
}
