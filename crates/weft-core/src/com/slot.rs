use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};

use crate::com::connection::ConnectionId;
use crate::com::error::ConnectionError;
use crate::com::signal::SignalCore;
use crate::com::signature::{SignalArgs, Signature};
use crate::registry::arena::{Handle, HandleArena};
use crate::service::error::RuntimeFailure;
use crate::thread::error::WorkerError;
use crate::thread::worker::Worker;
use crate::utils::panic_message;

/// Error type a slot body may return. It is logged at the dispatch
/// boundary and never reaches the emitter.
pub type SlotError = Box<dyn std::error::Error + Send + Sync>;
pub type SlotResult = Result<(), SlotError>;

pub(crate) type ErasedArgs = Arc<dyn Any + Send + Sync>;
type SlotFn = dyn Fn(ErasedArgs) -> BoxFuture<'static, SlotResult> + Send + Sync;

/// Liveness token of the component owning a slot.
#[derive(Clone)]
pub struct SlotOwner {
    uid: String,
    handle: Handle,
    arena: Arc<HandleArena>,
}

impl SlotOwner {
    pub fn new(uid: impl Into<String>, handle: Handle, arena: Arc<HandleArena>) -> Self {
        Self {
            uid: uid.into(),
            handle,
            arena,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_alive(&self) -> bool {
        self.arena.is_live(self.handle)
    }
}

impl fmt::Debug for SlotOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotOwner")
            .field("uid", &self.uid)
            .field("handle", &self.handle)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A named, typed, type-erased callable.
///
/// The argument tuple type is captured as a [`Signature`] at construction;
/// signals compare signatures before connecting. A slot optionally carries
/// a [`Worker`] it must execute on and a [`SlotOwner`] whose liveness gates
/// every invocation.
pub struct Slot {
    name: String,
    signature: Signature,
    call: Box<SlotFn>,
    worker: RwLock<Option<Worker>>,
    owner: RwLock<Option<SlotOwner>>,
    connections: Mutex<Vec<(ConnectionId, Weak<SignalCore>)>>,
}

impl Slot {
    pub fn new<A, F, Fut>(name: impl Into<String>, f: F) -> Arc<Self>
    where
        A: SignalArgs,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SlotResult> + Send + 'static,
    {
        let name = name.into();
        let slot_name = name.clone();
        let call = move |args: ErasedArgs| -> BoxFuture<'static, SlotResult> {
            match (*args).downcast_ref::<A>() {
                Some(a) => f(a.clone()).boxed(),
                None => {
                    let message = format!("slot '{}' received arguments of the wrong type", slot_name);
                    futures::future::ready::<SlotResult>(Err(message.into())).boxed()
                }
            }
        };
        Arc::new(Self {
            name,
            signature: A::signature(),
            call: Box::new(call),
            worker: RwLock::new(None),
            owner: RwLock::new(None),
            connections: Mutex::new(Vec::new()),
        })
    }

    /// Slot whose body is synchronous.
    pub fn from_fn<A, F>(name: impl Into<String>, f: F) -> Arc<Self>
    where
        A: SignalArgs,
        F: Fn(A) -> SlotResult + Send + Sync + 'static,
    {
        Self::new(name, move |args: A| futures::future::ready(f(args)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner.name` when owned, plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match self.owner.read().as_ref() {
            Some(owner) => format!("{}.{}", owner.uid(), self.name),
            None => self.name.clone(),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn worker(&self) -> Option<Worker> {
        self.worker.read().clone()
    }

    pub fn set_worker(&self, worker: Option<Worker>) {
        *self.worker.write() = worker;
    }

    pub fn owner(&self) -> Option<SlotOwner> {
        self.owner.read().clone()
    }

    pub fn set_owner(&self, owner: Option<SlotOwner>) {
        *self.owner.write() = owner;
    }

    /// False once the owning component has been released.
    pub fn is_alive(&self) -> bool {
        self.owner.read().as_ref().is_none_or(SlotOwner::is_alive)
    }

    /// Number of signals currently connected to this slot.
    pub fn num_connections(&self) -> usize {
        let mut connections = self.connections.lock();
        connections.retain(|(id, core)| core.upgrade().is_some_and(|c| c.contains(*id)));
        connections.len()
    }

    /// Remove every connection targeting this slot; returns how many were removed.
    pub fn disconnect_all(&self) -> usize {
        let entries = std::mem::take(&mut *self.connections.lock());
        let mut removed = 0;
        for (id, core) in entries {
            if let Some(core) = core.upgrade() {
                if core.remove(id) {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            debug!("Disconnected {} connection(s) from slot '{}'", removed, self.qualified_name());
        }
        removed
    }

    /// Invoke directly and wait, on the slot's worker when it has one.
    pub async fn call<A: SignalArgs>(self: &Arc<Self>, args: A) -> Result<(), ConnectionError> {
        self.check_direct::<A>()?;
        self.run_erased(Arc::new(args)).await?;
        Ok(())
    }

    /// Queue a direct invocation on the slot's worker.
    pub fn async_call<A: SignalArgs>(self: &Arc<Self>, args: A) -> Result<(), ConnectionError> {
        self.check_direct::<A>()?;
        self.post_erased(Arc::new(args))?;
        Ok(())
    }

    fn check_direct<A: SignalArgs>(&self) -> Result<(), ConnectionError> {
        let expected = A::signature();
        if expected != self.signature {
            return Err(ConnectionError::SignatureMismatch {
                signal: "<direct call>".to_string(),
                slot: self.qualified_name(),
                expected: expected.to_string(),
                found: self.signature.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn remember(&self, id: ConnectionId, core: Weak<SignalCore>) {
        self.connections.lock().push((id, core));
    }

    pub(crate) fn forget(&self, id: ConnectionId) {
        self.connections.lock().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn post_erased(self: &Arc<Self>, args: ErasedArgs) -> Result<(), WorkerError> {
        let worker = self.worker().ok_or_else(|| WorkerError::NoWorker {
            slot: self.qualified_name(),
        })?;
        let slot = Arc::clone(self);
        worker.post(async move { slot.deliver(args).await })
    }

    pub(crate) async fn run_erased(self: &Arc<Self>, args: ErasedArgs) -> Result<(), WorkerError> {
        match self.worker() {
            None => {
                self.deliver(args).await;
                Ok(())
            }
            Some(worker) => {
                let slot = Arc::clone(self);
                worker.run(async move { slot.deliver(args).await }).await
            }
        }
    }

    async fn deliver(&self, args: ErasedArgs) {
        if let Err(e) = self.execute(args).await {
            let failure = RuntimeFailure::SlotFailed {
                slot: self.qualified_name(),
                message: e.to_string(),
            };
            error!("{}", failure);
        }
    }

    async fn execute(&self, args: ErasedArgs) -> SlotResult {
        if !self.is_alive() {
            debug!("Skipping slot '{}': owner has been released", self.qualified_name());
            return Ok(());
        }
        // Synchronous bodies run while the future is built, so both phases are guarded.
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.call)(args))) {
            Ok(future) => future,
            Err(panic) => return Err(format!("panicked: {}", panic_message(panic.as_ref())).into()),
        };
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref())).into()),
        }
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.qualified_name())
            .field("signature", &self.signature)
            .field("worker", &self.worker().map(|w| w.name().to_string()))
            .finish()
    }
}

/// Named slots of one component.
#[derive(Default)]
pub struct HasSlots {
    slots: BTreeMap<String, Arc<Slot>>,
}

impl HasSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, slot: Arc<Slot>) -> &mut Self {
        if self.slots.insert(slot.name().to_string(), Arc::clone(&slot)).is_some() {
            warn!("Slot '{}' registered twice; keeping the latest", slot.name());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<Slot>> {
        self.slots.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Slot>> {
        self.slots.values()
    }

    pub fn set_worker(&self, worker: Option<Worker>) {
        for slot in self.slots.values() {
            slot.set_worker(worker.clone());
        }
    }

    pub fn set_owner(&self, owner: Option<SlotOwner>) {
        for slot in self.slots.values() {
            slot.set_owner(owner.clone());
        }
    }

    pub fn disconnect_all(&self) -> usize {
        self.slots.values().map(|slot| slot.disconnect_all()).sum()
    }

    pub fn num_connections(&self) -> usize {
        self.slots.values().map(|slot| slot.num_connections()).sum()
    }
}

impl fmt::Debug for HasSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots.keys()).finish()
    }
}
