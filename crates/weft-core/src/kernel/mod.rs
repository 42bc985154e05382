//! # Weft Kernel
//!
//! The explicit [`Context`](context::Context) that replaces process-wide
//! registries: it owns the factory table, the live-instance registry, the
//! worker pool and the parameter dictionary. Its pieces follow the
//! [`KernelComponent`](component::KernelComponent) lifecycle.
//!
//! Also home to the crate-wide [`Error`](error::Error) and shared constants.
pub mod component;
pub mod constants;
pub mod context;
pub mod error;

pub use component::KernelComponent;
pub use context::{Context, ContextConfig};
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
