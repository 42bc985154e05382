//! # Weft Worker Errors
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Deadlock detected: worker '{from}' would block on '{to}' which is already waiting on it ({cycle})")]
    DeadlockDetected { from: String, to: String, cycle: String },

    #[error("Worker '{worker}' has been stopped")]
    WorkerStopped { worker: String },

    #[error("Task submitted to worker '{worker}' was dropped before completing")]
    TaskDropped { worker: String },

    #[error("Slot '{slot}' has no worker and cannot be invoked asynchronously")]
    NoWorker { slot: String },

    #[error("No tokio runtime is available to host a worker")]
    NoRuntime,
}
