//! # weft-core
//!
//! A reactive component framework: components exchange typed messages
//! through signals and slots, run on named workers, bind to shared data
//! objects, and are assembled into graphs from declarative configuration
//! documents.
//!
//! Everything a running graph shares lives in one [`Context`]; there is no
//! process-global state.
pub mod app_config;
pub mod com;
pub mod data;
pub mod kernel;
pub mod registry;
pub mod service;
pub mod thread;
pub mod utils;

pub use app_config::{AppConfigManager, ConfigDocument, ConfigurationError, ManagerState};
pub use com::{Connection, HasSignals, HasSlots, Signal, SignalArgs, Slot, SlotResult};
pub use data::Object;
pub use kernel::{Context, ContextConfig, Error, KernelComponent, Result};
pub use service::{
    Access, AutoConnections, KeyDecl, Service, ServiceContext, ServiceHandle, ServiceSlots, ServiceState,
};
pub use thread::{Worker, WorkerError};

#[cfg(test)]
mod tests;
