//! # Weft Configuration Graphs
//!
//! Declarative descriptions of a graph of objects, components and
//! connections, and the machinery that builds them.
//!
//! - [`loader`]: reads JSON, YAML or TOML documents into a
//!   [`ConfigDocument`](node::ConfigDocument).
//! - [`params`]: `%NAME%` placeholder substitution.
//! - [`manager`]: [`AppConfigManager`](manager::AppConfigManager) creates,
//!   starts, stops and destroys one configuration, rolling back on failure.
//!   Components reading objects published later are brought up, swapped and
//!   retired by the graph's deferred-object tracker as those objects come
//!   and go.
//! - [`launcher`]: the `weft::ConfigLauncher` component, which runs a
//!   configuration nested inside another one.
mod deferred;
pub mod error;
pub mod launcher;
pub mod loader;
pub mod manager;
pub mod node;
pub mod params;

pub use error::ConfigurationError;
pub use launcher::{ConfigLauncher, LauncherParams};
pub use loader::{ConfigFormat, load_document, load_document_async, parse_document};
pub use manager::{AppConfigManager, ManagerState};
pub use node::{AppConfig, BindingDecl, ConfigDocument, ConnectionDecl, GroupDecl, KeyReference, ObjectDecl, ParameterDecl, ServiceDecl};
pub use params::substitute;

#[cfg(test)]
mod tests;
