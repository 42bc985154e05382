//! # Weft Kernel Errors
//!
//! Defines [`Error`], the crate-wide error aggregating every subsystem's
//! typed failures, and the [`Result`] alias used throughout `weft-core`.
use std::result::Result as StdResult;

use thiserror::Error as ThisError;

use crate::app_config::error::ConfigurationError;
use crate::com::error::ConnectionError;
use crate::registry::error::RegistryError;
use crate::service::error::{LifecycleError, RuntimeFailure};
use crate::thread::error::WorkerError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Runtime failure: {0}")]
    Runtime(#[from] RuntimeFailure),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Value conversion error: {0}")]
    Value(#[from] serde_json::Error),

    /// Error occurring while a kernel component starts or stops.
    #[error("Kernel lifecycle error during {phase}: {message}")]
    KernelLifecycleError {
        phase: KernelLifecyclePhase,
        component_name: Option<String>,
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Phase of the context's own lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum KernelLifecyclePhase {
    #[error("Initialize")]
    Initialize,
    #[error("Start")]
    Start,
    #[error("Shutdown")]
    Shutdown,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl Error {
    /// True for failures of the graph-building kind, which callers surface
    /// rather than log.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
