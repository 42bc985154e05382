//! Ready-made components registered under the `weft::` namespace.
mod counter;
mod forwarder;
mod log_listener;
mod value_setter;

pub use counter::Counter;
pub use forwarder::Forwarder;
pub use log_listener::LogListener;
pub use value_setter::ValueSetter;

use log::debug;
use weft_core::{Context, Result};

pub const LOG_LISTENER: &str = "weft::LogListener";
pub const VALUE_SETTER: &str = "weft::ValueSetter";
pub const COUNTER: &str = "weft::Counter";
pub const FORWARDER: &str = "weft::Forwarder";

/// Register every component of this crate with `context`.
pub fn register_all(context: &Context) -> Result<()> {
    context.register_service::<LogListener>(LOG_LISTENER)?;
    context.register_service::<ValueSetter>(VALUE_SETTER)?;
    context.register_service::<Counter>(COUNTER)?;
    context.register_service::<Forwarder>(FORWARDER)?;
    debug!("Registered the core components");
    Ok(())
}
