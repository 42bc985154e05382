//! # Weft Workers
//!
//! Serial execution contexts that slots and component transitions run on.
//!
//! - [`Worker`](worker::Worker): one FIFO queue drained by one tokio task,
//!   with inline execution for reentrant blocking calls.
//! - [`WorkerPool`](pool::WorkerPool): named workers sharing a
//!   [`WaitGraph`](worker::WaitGraph) that refuses blocking calls which would
//!   close a wait cycle.
pub mod error;
pub mod pool;
pub mod worker;

pub use error::WorkerError;
pub use pool::WorkerPool;
pub use worker::{WaitGraph, Worker, WorkerId};

#[cfg(test)]
mod tests;
