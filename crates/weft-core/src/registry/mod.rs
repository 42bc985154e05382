//! # Weft Registry & Factory
//!
//! - [`FactoryRegistry`](factory::FactoryRegistry): implementation id →
//!   constructor, with the object types each implementation accepts.
//! - [`ObjectTypeRegistry`](factory::ObjectTypeRegistry): known object types.
//! - [`ServiceRegistry`](registry::ServiceRegistry): live components and
//!   published objects, with reverse lookup of the components bound to an object.
//! - [`HandleArena`](arena::HandleArena): generation-checked handles used to
//!   invalidate a component's slots the moment it is released.
pub mod arena;
pub mod error;
pub mod factory;
pub mod registry;

pub use arena::{Handle, HandleArena};
pub use error::RegistryError;
pub use factory::{FactoryRegistry, ObjectTypeRegistry, ServiceConstructor};
pub use registry::ServiceRegistry;

#[cfg(test)]
mod tests;
