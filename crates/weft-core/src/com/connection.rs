use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::debug;

use crate::com::signal::SignalCore;
use crate::com::slot::Slot;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle on one signal-to-slot binding.
///
/// Holds only weak references to both endpoints; dropping the handle does
/// not disconnect.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    signal: Weak<SignalCore>,
    slot: Weak<Slot>,
    blocked: Arc<AtomicBool>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, signal: Weak<SignalCore>, slot: Weak<Slot>, blocked: Arc<AtomicBool>) -> Self {
        Self {
            id,
            signal,
            slot,
            blocked,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.signal.upgrade().is_some_and(|core| core.contains(self.id))
    }

    /// Remove the binding. Idempotent; returns whether anything was removed.
    pub fn disconnect(&self) -> bool {
        let removed = self
            .signal
            .upgrade()
            .is_some_and(|core| core.remove(self.id));
        if let Some(slot) = self.slot.upgrade() {
            slot.forget(self.id);
        }
        if removed {
            debug!("Disconnected {}", self);
        }
        removed
    }

    pub fn block(&self) {
        self.blocked.store(true, Ordering::Release);
    }

    pub fn unblock(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }

    /// Block until the returned guard is dropped.
    pub fn blocker(&self) -> ConnectionBlocker {
        let was_blocked = self.is_blocked();
        self.block();
        ConnectionBlocker {
            connection: self.clone(),
            was_blocked,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signal = self
            .signal
            .upgrade()
            .map(|core| core.name().to_string())
            .unwrap_or_else(|| "<dropped>".to_string());
        let slot = self
            .slot
            .upgrade()
            .map(|slot| slot.qualified_name())
            .unwrap_or_else(|| "<dropped>".to_string());
        write!(f, "connection {:?} ({} -> {})", self.id, signal, slot)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// Restores the previous blocked state of a connection on drop.
pub struct ConnectionBlocker {
    connection: Connection,
    was_blocked: bool,
}

impl Drop for ConnectionBlocker {
    fn drop(&mut self) {
        if !self.was_blocked {
            self.connection.unblock();
        }
    }
}
