//! # Weft Configuration Errors
//!
//! Every variant aborts the graph build it occurred in; the manager rolls
//! back whatever it had created before reporting it.
use std::path::PathBuf;

use thiserror::Error;

use crate::kernel::error::Error;
use crate::service::keys::Access;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Malformed configuration '{config}': {message}")]
    Malformed { config: String, message: String },

    #[error("Failed to parse {format} document: {message}")]
    Parse { format: String, message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported configuration format for '{path}'")]
    UnsupportedFormat { path: PathBuf },

    #[error("No configuration registered with id '{id}'")]
    UnknownConfig { id: String },

    #[error("A configuration with id '{id}' is already registered")]
    DuplicateConfig { id: String },

    #[error("Identifier '{uid}' is declared more than once")]
    DuplicateUid { uid: String },

    #[error("'{uid}' references '{reference}' which is not declared before it")]
    UnresolvedReference { uid: String, reference: String },

    #[error("Parameter '%{name}%' used in {location} has no value")]
    UnresolvedParameter { name: String, location: String },

    #[error("Component '{uid}' requires key '{key}' but none was bound")]
    MissingRequiredKey { uid: String, key: String },

    #[error("Key '{key}' of component '{uid}' is declared {declared} but bound as {bound}")]
    AccessMismatch {
        uid: String,
        key: String,
        declared: Access,
        bound: Access,
    },

    #[error("Component '{uid}' does not accept object '{object}' of type '{object_type}'")]
    IncompatibleObject {
        uid: String,
        object: String,
        object_type: String,
    },

    #[error("Malformed endpoint '{endpoint}': expected 'owner.name'")]
    MalformedEndpoint { endpoint: String },

    #[error("Component '{uid}' failed to configure: {source}")]
    ServiceConfiguration {
        uid: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Cannot {operation} configuration '{config}' while it is {state}")]
    InvalidManagerState {
        config: String,
        operation: &'static str,
        state: String,
    },
}
