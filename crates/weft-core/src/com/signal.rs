use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::com::connection::{Connection, ConnectionId};
use crate::com::error::ConnectionError;
use crate::com::signature::{SignalArgs, Signature};
use crate::com::slot::{ErasedArgs, Slot};
use crate::thread::error::WorkerError;

struct Entry {
    id: ConnectionId,
    slot: Weak<Slot>,
    blocked: Arc<AtomicBool>,
}

/// Untyped state shared by a [`Signal`] and its [`Connection`]s.
pub(crate) struct SignalCore {
    name: String,
    signature: Signature,
    entries: Mutex<Vec<Entry>>,
}

impl SignalCore {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().iter().any(|e| e.id == id)
    }

    pub(crate) fn remove(&self, id: ConnectionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    fn connect(self: &Arc<Self>, slot: &Arc<Slot>) -> Result<Connection, ConnectionError> {
        if self.signature != *slot.signature() {
            return Err(ConnectionError::SignatureMismatch {
                signal: self.name.clone(),
                slot: slot.qualified_name(),
                expected: self.signature.to_string(),
                found: slot.signature().to_string(),
            });
        }
        let id = ConnectionId::next();
        let blocked = Arc::new(AtomicBool::new(false));
        {
            let mut entries = self.entries.lock();
            let duplicate = entries
                .iter()
                .any(|e| e.slot.upgrade().is_some_and(|s| Arc::ptr_eq(&s, slot)));
            if duplicate {
                return Err(ConnectionError::AlreadyConnected {
                    signal: self.name.clone(),
                    slot: slot.qualified_name(),
                });
            }
            entries.push(Entry {
                id,
                slot: Arc::downgrade(slot),
                blocked: Arc::clone(&blocked),
            });
        }
        slot.remember(id, Arc::downgrade(self));
        debug!("Connected signal '{}' to slot '{}'", self.name, slot.qualified_name());
        Ok(Connection::new(id, Arc::downgrade(self), Arc::downgrade(slot), blocked))
    }

    fn disconnect_slot(&self, slot: &Arc<Slot>) -> bool {
        let removed: Vec<ConnectionId> = {
            let mut entries = self.entries.lock();
            let mut removed = Vec::new();
            entries.retain(|e| {
                let target = e.slot.upgrade().is_some_and(|s| Arc::ptr_eq(&s, slot));
                if target {
                    removed.push(e.id);
                }
                !target
            });
            removed
        };
        for id in &removed {
            slot.forget(*id);
        }
        !removed.is_empty()
    }

    fn disconnect_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.entries.lock());
        let count = entries.len();
        for entry in entries {
            if let Some(slot) = entry.slot.upgrade() {
                slot.forget(entry.id);
            }
        }
        count
    }

    /// Drop entries whose slot or slot owner is gone, then return the
    /// unblocked targets in registration order.
    fn live_targets(&self) -> Vec<Arc<Slot>> {
        let mut stale = Vec::new();
        let mut targets = Vec::new();
        {
            let mut entries = self.entries.lock();
            entries.retain(|e| match e.slot.upgrade() {
                Some(slot) if slot.is_alive() => {
                    if !e.blocked.load(Ordering::Acquire) {
                        targets.push(slot);
                    }
                    true
                }
                Some(slot) => {
                    stale.push((e.id, slot));
                    false
                }
                None => false,
            });
        }
        for (id, slot) in stale {
            slot.forget(id);
            debug!("Pruned connection of signal '{}' to released slot '{}'", self.name, slot.qualified_name());
        }
        targets
    }

    fn num_connections(&self) -> usize {
        let stale: Vec<(ConnectionId, Arc<Slot>)> = {
            let mut entries = self.entries.lock();
            let mut stale = Vec::new();
            entries.retain(|e| match e.slot.upgrade() {
                Some(slot) if slot.is_alive() => true,
                Some(slot) => {
                    stale.push((e.id, slot));
                    false
                }
                None => false,
            });
            stale
        };
        for (id, slot) in stale {
            slot.forget(id);
        }
        self.entries.lock().len()
    }
}

/// A named emission point carrying argument tuples of type `A`.
///
/// Cloning a signal yields another handle to the same connection set.
pub struct Signal<A: SignalArgs> {
    core: Arc<SignalCore>,
    _marker: PhantomData<fn(A)>,
}

impl<A: SignalArgs> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        }
    }
}

impl<A: SignalArgs> Signal<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: Arc::new(SignalCore {
                name: name.into(),
                signature: A::signature(),
                entries: Mutex::new(Vec::new()),
            }),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn signature(&self) -> &Signature {
        &self.core.signature
    }

    /// Fails with [`ConnectionError::SignatureMismatch`] or
    /// [`ConnectionError::AlreadyConnected`] without touching the connection set.
    pub fn connect(&self, slot: &Arc<Slot>) -> Result<Connection, ConnectionError> {
        self.core.connect(slot)
    }

    pub fn disconnect(&self, slot: &Arc<Slot>) -> bool {
        self.core.disconnect_slot(slot)
    }

    pub fn disconnect_all(&self) -> usize {
        self.core.disconnect_all()
    }

    pub fn num_connections(&self) -> usize {
        self.core.num_connections()
    }

    /// Queue one invocation per live connection and return immediately.
    ///
    /// Returns the number of invocations accepted by their workers.
    pub fn async_emit(&self, args: A) -> usize {
        let targets = self.core.live_targets();
        if targets.is_empty() {
            return 0;
        }
        let args: ErasedArgs = Arc::new(args);
        let mut queued = 0;
        for slot in targets {
            match slot.post_erased(Arc::clone(&args)) {
                Ok(()) => queued += 1,
                Err(e) => warn!("Signal '{}' could not reach slot '{}': {}", self.core.name, slot.qualified_name(), e),
            }
        }
        trace!("Signal '{}' queued {} invocation(s)", self.core.name, queued);
        queued
    }

    /// Invoke every live connection in registration order, waiting for each.
    ///
    /// Slot failures are logged and skipped. Dispatch failures such as a
    /// detected deadlock do not stop the remaining connections; the first
    /// one is returned.
    pub async fn emit(&self, args: A) -> Result<(), WorkerError> {
        let targets = self.core.live_targets();
        let args: ErasedArgs = Arc::new(args);
        let mut first_error = None;
        for slot in targets {
            if let Err(e) = slot.run_erased(Arc::clone(&args)).await {
                warn!("Signal '{}' failed to dispatch to slot '{}': {}", self.core.name, slot.qualified_name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn erased(&self) -> Arc<dyn AnySignal> {
        Arc::new(self.clone())
    }
}

impl<A: SignalArgs> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.core.name)
            .field("signature", &self.core.signature)
            .field("connections", &self.core.entries.lock().len())
            .finish()
    }
}

/// Signature-agnostic view of a signal, used to wire endpoints by name.
pub trait AnySignal: Send + Sync {
    fn name(&self) -> &str;
    fn signature(&self) -> &Signature;
    fn connect_slot(&self, slot: &Arc<Slot>) -> Result<Connection, ConnectionError>;
    fn disconnect_slot(&self, slot: &Arc<Slot>) -> bool;
    fn disconnect_all(&self) -> usize;
    fn num_connections(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
}

impl<A: SignalArgs> AnySignal for Signal<A> {
    fn name(&self) -> &str {
        Signal::name(self)
    }

    fn signature(&self) -> &Signature {
        Signal::signature(self)
    }

    fn connect_slot(&self, slot: &Arc<Slot>) -> Result<Connection, ConnectionError> {
        self.connect(slot)
    }

    fn disconnect_slot(&self, slot: &Arc<Slot>) -> bool {
        self.disconnect(slot)
    }

    fn disconnect_all(&self) -> usize {
        Signal::disconnect_all(self)
    }

    fn num_connections(&self) -> usize {
        Signal::num_connections(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Named signals of one object or component.
#[derive(Default)]
pub struct HasSignals {
    signals: BTreeMap<String, Arc<dyn AnySignal>>,
}

impl HasSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<A: SignalArgs>(&mut self, signal: &Signal<A>) -> &mut Self {
        if self.signals.insert(signal.name().to_string(), signal.erased()).is_some() {
            warn!("Signal '{}' registered twice; keeping the latest", signal.name());
        }
        self
    }

    /// Create a signal, register it and return a typed handle to it.
    pub fn create<A: SignalArgs>(&mut self, name: &str) -> Signal<A> {
        let signal = Signal::new(name);
        self.add(&signal);
        signal
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AnySignal>> {
        self.signals.get(name).cloned()
    }

    /// Typed handle to a registered signal; `None` when absent or when `A`
    /// differs from its signature.
    pub fn typed<A: SignalArgs>(&self, name: &str) -> Option<Signal<A>> {
        self.signals
            .get(name)
            .and_then(|s| s.as_any().downcast_ref::<Signal<A>>())
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.signals.keys().cloned().collect()
    }

    pub fn disconnect_all(&self) -> usize {
        self.signals.values().map(|s| s.disconnect_all()).sum()
    }

    pub fn num_connections(&self) -> usize {
        self.signals.values().map(|s| s.num_connections()).sum()
    }
}

impl fmt::Debug for HasSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.signals.keys()).finish()
    }
}
