//! # Weft Object Model
//!
//! [`Object`](object::Object)s are the data components bind to by key. They
//! are shared as `Arc<Object>`: the graph that declared an object, or the
//! component that produced it as an output, holds the owning reference.
pub mod object;

pub use object::{FIELD_CHANGED_SIG, MODIFIED_SIG, Object};
