//! # Weft Signal/Slot Errors
//!
//! Failures raised while wiring signals to slots or while dispatching a
//! blocking emission across workers.
use thiserror::Error;

use crate::thread::error::WorkerError;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Cannot connect signal '{signal}' to slot '{slot}': signal emits {expected} but slot expects {found}")]
    SignatureMismatch {
        signal: String,
        slot: String,
        expected: String,
        found: String,
    },

    #[error("Signal '{signal}' is already connected to slot '{slot}'")]
    AlreadyConnected { signal: String, slot: String },

    #[error("'{owner}' has no signal named '{signal}'")]
    UnknownSignal { owner: String, signal: String },

    #[error("'{owner}' has no slot named '{slot}'")]
    UnknownSlot { owner: String, slot: String },

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] WorkerError),
}
