//! Logging setup for Weft binaries.
//!
//! Library crates report through the `log` facade. [`init_logging`] installs
//! a `tracing-subscriber` fmt subscriber and bridges `log` records into it.
use std::str::FromStr;

use log::{LevelFilter, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LoggingError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// A level (`info`) or a full filter directive (`weft_core=debug,info`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    pub with_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            with_targets: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::InvalidFilter {
            directive: self.level.clone(),
            message: e.to_string(),
        })
    }

    /// Most verbose level `log` records are forwarded at.
    fn log_level(&self) -> LevelFilter {
        LevelFilter::from_str(&self.level).unwrap_or(LevelFilter::Trace)
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Logging has already been initialized")]
    AlreadyInitialized,

    #[error("Invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },

    #[error("Unknown log format '{0}', expected 'text' or 'json'")]
    UnknownFormat(String),
}

/// Install the global subscriber. Only the first call in a process succeeds.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = config.filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(config.with_targets)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_target(config.with_targets)),
        ),
    };
    installed.map_err(|_| LoggingError::AlreadyInitialized)?;
    LogTracer::builder()
        .with_max_level(config.log_level())
        .init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    info!("Logging initialized (level '{}', {:?} output)", config.level, config.format);
    Ok(())
}
