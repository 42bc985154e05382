//! # Weft Signal/Slot Core
//!
//! Typed publish/subscribe between components.
//!
//! - [`Signal`](signal::Signal): a named emission point for argument tuples
//!   of one type, delivering asynchronously ([`async_emit`](signal::Signal::async_emit))
//!   or blocking until every slot ran ([`emit`](signal::Signal::emit)).
//! - [`Slot`](slot::Slot): a type-erased callable tagged with a
//!   [`Signature`](signature::Signature), optionally pinned to a worker.
//! - [`Connection`](connection::Connection): a weak binding of the two,
//!   which can be blocked or removed.
//!
//! [`HasSignals`](signal::HasSignals) and [`HasSlots`](slot::HasSlots) expose
//! the endpoints of one owner by name so configuration documents can wire them;
//! [`ChannelRegistry`](channel::ChannelRegistry) joins endpoints declared by
//! different graphs under a shared channel name.
pub mod channel;
pub mod connection;
pub mod error;
pub mod signal;
pub mod signature;
pub mod slot;

pub use channel::{ChannelKey, ChannelRegistry, MemberId};
pub use connection::{Connection, ConnectionBlocker, ConnectionId};
pub use error::ConnectionError;
pub use signal::{AnySignal, HasSignals, Signal};
pub use signature::{SignalArgs, Signature};
pub use slot::{HasSlots, Slot, SlotError, SlotOwner, SlotResult};

#[cfg(test)]
mod tests;
