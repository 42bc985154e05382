//! # Weft Components
//!
//! A component ("service") is an instance of a registered implementation
//! of the [`Service`](traits::Service) trait, wrapped by the framework in a
//! [`ServiceHandle`](handle::ServiceHandle) that drives its lifecycle:
//!
//! ```text
//! UNCONFIGURED --configure--> CONFIGURED --start--> STARTED --stop--> STOPPED
//!                                                   |  ^
//!                                          update/swap  |
//! ```
//!
//! Keys ([`KeyDecl`](keys::KeyDecl)) bind the component to objects; its
//! auto-connection table ([`AutoConnections`](keys::AutoConnections)) wires
//! those objects' signals to its slots while it is started.
pub mod context;
pub mod error;
pub mod handle;
pub mod keys;
pub mod slots;
pub mod traits;

pub use context::ServiceContext;
pub use error::{LifecycleError, RuntimeFailure};
pub use handle::{Operation, ServiceHandle, ServiceState, ServiceStatus};
pub use keys::{Access, AutoConnections, Bindings, KeyDecl, ObjectBinding, group_key, split_group_key};
pub use slots::ServiceSlots;
pub use traits::{AsAny, Service};

#[cfg(test)]
pub(crate) mod tests;
