//! # Weft Component Lifecycle Errors
//!
//! [`LifecycleError`] covers transitions requested from the wrong state;
//! [`RuntimeFailure`] covers errors and panics escaping a lifecycle hook or
//! a slot body. Both are logged where they occur and never cross a signal
//! emission boundary.
use thiserror::Error;

use crate::kernel::error::Error;
use crate::service::handle::ServiceState;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Cannot {operation} component '{uid}' while it is {state}")]
    InvalidTransition {
        uid: String,
        operation: &'static str,
        state: ServiceState,
    },

    #[error("Component '{uid}' must be started to {operation} (currently {state})")]
    InvalidState {
        uid: String,
        operation: &'static str,
        state: ServiceState,
    },

    #[error("Component '{uid}' is already running a transition; '{operation}' refused")]
    TransitionInProgress { uid: String, operation: &'static str },

    #[error("Component '{uid}' has no key '{key}'")]
    UnknownKey { uid: String, key: String },
}

#[derive(Debug, Error)]
pub enum RuntimeFailure {
    #[error("Hook '{hook}' of component '{uid}' failed: {source}")]
    HookFailed {
        uid: String,
        hook: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Hook '{hook}' of component '{uid}' panicked: {message}")]
    HookPanicked {
        uid: String,
        hook: &'static str,
        message: String,
    },

    #[error("Slot '{slot}' failed: {message}")]
    SlotFailed { slot: String, message: String },
}
