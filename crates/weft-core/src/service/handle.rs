use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::app_config::error::ConfigurationError;
use crate::com::connection::Connection;
use crate::com::error::ConnectionError;
use crate::com::signal::{HasSignals, Signal};
use crate::com::slot::{HasSlots, Slot, SlotError, SlotOwner, SlotResult};
use crate::data::object::Object;
use crate::kernel::context::Context;
use crate::kernel::error::{Error, Result};
use crate::registry::arena::{Handle, HandleArena};
use crate::service::context::{Notifier, ServiceContext};
use crate::service::error::{LifecycleError, RuntimeFailure};
use crate::service::keys::{Access, AutoConnections, Bindings, KeyDecl, ObjectBinding};
use crate::service::slots::ServiceSlots;
use crate::service::traits::Service;
use crate::thread::worker::Worker;
use crate::utils::panic_message;

pub const STARTED_SIG: &str = "started";
pub const UPDATED_SIG: &str = "updated";
pub const SWAPPED_SIG: &str = "swapped";
pub const STOPPED_SIG: &str = "stopped";
pub const INFO_NOTIFIED_SIG: &str = "info_notified";
pub const SUCCESS_NOTIFIED_SIG: &str = "success_notified";
pub const FAILURE_NOTIFIED_SIG: &str = "failure_notified";

pub const START_SLOT: &str = "start";
pub const STOP_SLOT: &str = "stop";
pub const UPDATE_SLOT: &str = "update";
pub const SWAP_KEY_SLOT: &str = "swap_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Unconfigured,
    Configured,
    Started,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Unconfigured => "UNCONFIGURED",
            ServiceState::Configured => "CONFIGURED",
            ServiceState::Started => "STARTED",
            ServiceState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Hook currently running, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Configuring,
    Starting,
    Updating,
    Swapping,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub transition: Option<Operation>,
}

#[derive(Clone)]
struct LifecycleSignals {
    started: Signal<()>,
    updated: Signal<()>,
    swapped: Signal<()>,
    stopped: Signal<()>,
}

struct ServiceCell {
    service: Box<dyn Service>,
    ctx: ServiceContext,
}

type DeferredCall = Box<dyn FnOnce(&mut dyn Service, &mut ServiceContext) -> SlotResult + Send>;

/// A live component: the implementation instance plus everything the
/// framework tracks about it.
///
/// Every transition is executed on the component's worker and guarded by
/// an exclusive cell, so no two transitions of one component overlap.
pub struct ServiceHandle {
    uid: String,
    implementation: String,
    handle: Handle,
    arena: Arc<HandleArena>,
    worker: RwLock<Worker>,
    status: RwLock<ServiceStatus>,
    keys: Vec<KeyDecl>,
    auto_connections: AutoConnections,
    auto_connect: AtomicBool,
    bindings: Arc<RwLock<Bindings>>,
    outputs: Arc<Mutex<BTreeMap<String, Arc<Object>>>>,
    signals: Arc<HasSignals>,
    slots: HasSlots,
    lifecycle: LifecycleSignals,
    key_connections: Mutex<BTreeMap<String, Vec<Connection>>>,
    cell: tokio::sync::Mutex<ServiceCell>,
    deferred: Mutex<VecDeque<(String, DeferredCall)>>,
    context: Weak<Context>,
}

impl ServiceHandle {
    pub(crate) fn new(
        uid: String,
        implementation: String,
        service: Box<dyn Service>,
        worker: Worker,
        handle: Handle,
        arena: Arc<HandleArena>,
        context: Weak<Context>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<ServiceHandle>| {
            let mut signals = HasSignals::new();
            let lifecycle = LifecycleSignals {
                started: signals.create(STARTED_SIG),
                updated: signals.create(UPDATED_SIG),
                swapped: signals.create(SWAPPED_SIG),
                stopped: signals.create(STOPPED_SIG),
            };
            let notifier = Notifier {
                info: signals.create(INFO_NOTIFIED_SIG),
                success: signals.create(SUCCESS_NOTIFIED_SIG),
                failure: signals.create(FAILURE_NOTIFIED_SIG),
            };
            service.register_signals(&mut signals);
            let signals = Arc::new(signals);

            let mut slots = HasSlots::new();
            add_builtin_slots(&mut slots, weak);
            service.register_slots(&mut ServiceSlots::new(&mut slots, weak.clone()));
            slots.set_owner(Some(SlotOwner::new(uid.clone(), handle, Arc::clone(&arena))));
            slots.set_worker(Some(worker.clone()));

            let bindings = Arc::new(RwLock::new(Bindings::default()));
            let outputs = Arc::new(Mutex::new(BTreeMap::new()));
            let ctx = ServiceContext::new(
                uid.clone(),
                Arc::clone(&bindings),
                Arc::clone(&outputs),
                Arc::clone(&signals),
                notifier,
                context.clone(),
            );
            let keys = service.keys();
            let auto_connections = service.auto_connections();

            Self {
                uid,
                implementation,
                handle,
                arena,
                worker: RwLock::new(worker),
                status: RwLock::new(ServiceStatus {
                    state: ServiceState::Unconfigured,
                    transition: None,
                }),
                keys,
                auto_connections,
                auto_connect: AtomicBool::new(false),
                bindings,
                outputs,
                signals,
                slots,
                lifecycle,
                key_connections: Mutex::new(BTreeMap::new()),
                cell: tokio::sync::Mutex::new(ServiceCell { service, ctx }),
                deferred: Mutex::new(VecDeque::new()),
                context,
            }
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_alive(&self) -> bool {
        self.arena.is_live(self.handle)
    }

    pub fn worker(&self) -> Worker {
        self.worker.read().clone()
    }

    /// Move the component and its slots to another worker.
    pub fn set_worker(&self, worker: Worker) {
        self.slots.set_worker(Some(worker.clone()));
        *self.worker.write() = worker;
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.read()
    }

    pub fn state(&self) -> ServiceState {
        self.status.read().state
    }

    pub fn keys(&self) -> &[KeyDecl] {
        &self.keys
    }

    pub fn signals(&self) -> &HasSignals {
        &self.signals
    }

    pub fn slots(&self) -> &HasSlots {
        &self.slots
    }

    pub fn signal<A: crate::com::signature::SignalArgs>(&self, name: &str) -> Option<Signal<A>> {
        self.signals.typed(name)
    }

    pub fn slot(&self, name: &str) -> Option<Arc<Slot>> {
        self.slots.get(name)
    }

    /// Component-wide auto-connect flag, used by bindings that do not set their own.
    pub fn set_auto_connect(&self, auto_connect: bool) {
        self.auto_connect.store(auto_connect, Ordering::Release);
    }

    pub fn bound_object(&self, key: &str) -> Option<Arc<Object>> {
        self.bindings.read().object(key)
    }

    pub fn binding_keys(&self) -> Vec<String> {
        self.bindings.read().keys()
    }

    pub fn output(&self, key: &str) -> Option<Arc<Object>> {
        self.outputs.lock().get(key).cloned()
    }

    pub fn is_bound_to(&self, object_uid: &str) -> bool {
        self.bindings.read().is_bound_to(object_uid)
    }

    /// Auto-connections currently established for `key`.
    pub fn key_connection_count(&self, key: &str) -> usize {
        self.key_connections
            .lock()
            .get(key)
            .map_or(0, |conns| conns.iter().filter(|c| c.is_connected()).count())
    }

    /// Bind `key` before the component is started.
    pub fn bind(&self, key: &str, binding: ObjectBinding) -> Result<()> {
        let state = self.state();
        if !matches!(state, ServiceState::Unconfigured | ServiceState::Configured) {
            return Err(self.refuse(LifecycleError::InvalidTransition {
                uid: self.uid.clone(),
                operation: "bind",
                state,
            }));
        }
        debug!("Binding key '{}' of '{}' to '{}' ({})", key, self.uid, binding.uid, binding.access);
        self.bindings.write().insert(key, binding);
        Ok(())
    }

    /// Drop the binding of `key` before the component is started.
    pub fn unbind(&self, key: &str) -> Result<bool> {
        let state = self.state();
        if !matches!(state, ServiceState::Unconfigured | ServiceState::Configured) {
            return Err(self.refuse(LifecycleError::InvalidTransition {
                uid: self.uid.clone(),
                operation: "unbind",
                state,
            }));
        }
        Ok(self.bindings.write().remove(key).is_some())
    }

    /// Object currently published under the uid `key` is bound to.
    pub fn lookup_binding(&self, key: &str) -> Option<Arc<Object>> {
        let uid = self.bindings.read().get(key).map(|b| b.uid.clone())?;
        self.context.upgrade()?.get_object(&uid)
    }

    pub async fn configure(self: &Arc<Self>, params: Value) -> Result<()> {
        let this = Arc::clone(self);
        self.worker().run(async move { this.configure_here(params).await }).await?
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let this = Arc::clone(self);
        self.worker().run(async move { this.start_here().await }).await?
    }

    pub async fn update(self: &Arc<Self>) -> Result<()> {
        let this = Arc::clone(self);
        self.worker().run(async move { this.update_here().await }).await?
    }

    /// Replace the object bound to `key` while started, reconnecting only
    /// that key's auto-connections.
    pub async fn swap_key(self: &Arc<Self>, key: &str, object: Option<Arc<Object>>) -> Result<()> {
        let this = Arc::clone(self);
        let key = key.to_string();
        self.worker().run(async move { this.swap_here(&key, object).await }).await?
    }

    pub async fn stop(self: &Arc<Self>) -> Result<()> {
        let this = Arc::clone(self);
        self.worker().run(async move { this.stop_here().await }).await?
    }

    /// Force the component into STOPPED, running `stopping` if it was started.
    pub async fn retire(self: &Arc<Self>) {
        match self.state() {
            ServiceState::Started => {
                if let Err(e) = self.stop().await {
                    warn!("Component '{}' did not stop cleanly: {}", self.uid, e);
                }
            }
            ServiceState::Stopped => {}
            ServiceState::Unconfigured | ServiceState::Configured => {
                self.set_status(ServiceState::Stopped, None);
            }
        }
    }

    /// Sever every connection, withdraw outputs and invalidate the handle.
    /// Returns the number of connections removed.
    pub(crate) fn release(&self) -> usize {
        let mut removed = self.disconnect_keys(None);
        removed += self.slots.disconnect_all();
        removed += self.signals.disconnect_all();
        let outputs = std::mem::take(&mut *self.outputs.lock());
        if let Some(context) = self.context.upgrade() {
            for object in outputs.values() {
                context.release_object(object.uid());
            }
        }
        self.bindings.write().clear_objects();
        self.arena.release(self.handle);
        debug!("Released component '{}' ({} connection(s) removed)", self.uid, removed);
        removed
    }

    /// Run `f` with exclusive access to the concrete implementation.
    pub(crate) fn with_service<S, R, F>(&self, f: F) -> std::result::Result<R, SlotError>
    where
        S: Service,
        F: FnOnce(&mut S, &mut ServiceContext) -> R,
    {
        let mut cell = self
            .cell
            .try_lock()
            .map_err(|_| format!("component '{}' is busy in a transition", self.uid))?;
        let ServiceCell { service, ctx } = &mut *cell;
        let service = (**service)
            .as_any_mut()
            .downcast_mut::<S>()
            .ok_or_else(|| format!("component '{}' is not a {}", self.uid, std::any::type_name::<S>()))?;
        Ok(f(service, ctx))
    }

    /// Run the body of method slot `slot` with exclusive access to the
    /// concrete implementation.
    ///
    /// A call reaching the component from inside one of its own hooks (same
    /// worker, instance held by the running transition) is queued and runs on
    /// that instance as soon as the hook returns, before the transition
    /// completes.
    pub(crate) fn invoke_method<S, F>(&self, slot: &str, f: F) -> SlotResult
    where
        S: Service,
        F: FnOnce(&mut S, &mut ServiceContext) -> SlotResult + Send + 'static,
    {
        match self.cell.try_lock() {
            Ok(mut cell) => {
                let ServiceCell { service, ctx } = &mut *cell;
                call_method::<S, F>(&self.uid, &mut **service, ctx, f)
            }
            Err(_) if self.worker().is_current() => {
                debug!("Slot '{}.{}' queued until the running hook returns", self.uid, slot);
                let uid = self.uid.clone();
                let call: DeferredCall = Box::new(move |service: &mut dyn Service, ctx: &mut ServiceContext| {
                    call_method::<S, F>(&uid, service, ctx, f)
                });
                self.deferred.lock().push_back((slot.to_string(), call));
                Ok(())
            }
            Err(_) => Err(format!("component '{}' is busy in a transition", self.uid).into()),
        }
    }

    /// Run slot bodies queued while a hook held the instance.
    fn run_deferred(&self, service: &mut dyn Service, ctx: &mut ServiceContext) {
        loop {
            let next = self.deferred.lock().pop_front();
            let Some((slot, call)) = next else {
                break;
            };
            let message = match std::panic::catch_unwind(AssertUnwindSafe(|| call(&mut *service, &mut *ctx))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };
            let failure = RuntimeFailure::SlotFailed {
                slot: format!("{}.{}", self.uid, slot),
                message,
            };
            error!("{}", failure);
        }
    }

    async fn configure_here(&self, params: Value) -> Result<()> {
        let mut cell = self.lock_cell("configure")?;
        let state = self.state();
        if !matches!(state, ServiceState::Unconfigured | ServiceState::Configured) {
            return Err(self.refuse(LifecycleError::InvalidTransition {
                uid: self.uid.clone(),
                operation: "configure",
                state,
            }));
        }
        self.validate_bindings()?;
        self.set_status(state, Some(Operation::Configuring));
        let ServiceCell { service, ctx } = &mut *cell;
        ctx.set_params(params);
        let outcome = guard_hook(&self.uid, "configuring", service.configuring(ctx)).await;
        self.run_deferred(&mut **service, ctx);
        match outcome {
            Ok(()) => {
                self.set_status(ServiceState::Configured, None);
                debug!("Configured component '{}'", self.uid);
                Ok(())
            }
            Err(failure) => {
                self.set_status(state, None);
                error!("{}", failure);
                Err(ConfigurationError::ServiceConfiguration {
                    uid: self.uid.clone(),
                    source: Box::new(failure.into()),
                }
                .into())
            }
        }
    }

    async fn start_here(&self) -> Result<()> {
        let mut cell = self.lock_cell("start")?;
        let state = self.state();
        if state != ServiceState::Configured {
            return Err(self.refuse(LifecycleError::InvalidTransition {
                uid: self.uid.clone(),
                operation: "start",
                state,
            }));
        }
        self.set_status(state, Some(Operation::Starting));
        let ServiceCell { service, ctx } = &mut *cell;
        let started = guard_hook(&self.uid, "starting", service.starting(ctx)).await;
        self.run_deferred(&mut **service, ctx);
        if let Err(failure) = started {
            self.set_status(ServiceState::Configured, None);
            error!("{}", failure);
            return Err(failure.into());
        }
        if let Err(e) = self.connect_keys(None) {
            error!("Auto-connection of component '{}' failed, rolling back start: {}", self.uid, e);
            self.disconnect_keys(None);
            let rolled_back = guard_hook(&self.uid, "stopping", service.stopping(ctx)).await;
            self.run_deferred(&mut **service, ctx);
            if let Err(failure) = rolled_back {
                error!("{}", failure);
            }
            self.set_status(ServiceState::Configured, None);
            return Err(e);
        }
        self.set_status(ServiceState::Started, None);
        info!("Started component '{}' ({})", self.uid, self.implementation);
        self.lifecycle.started.async_emit(());
        Ok(())
    }

    async fn update_here(&self) -> Result<()> {
        let mut cell = self.lock_cell("update")?;
        let state = self.state();
        if state != ServiceState::Started {
            return Err(self.refuse(LifecycleError::InvalidState {
                uid: self.uid.clone(),
                operation: "update",
                state,
            }));
        }
        self.set_status(state, Some(Operation::Updating));
        let ServiceCell { service, ctx } = &mut *cell;
        let outcome = guard_hook(&self.uid, "updating", service.updating(ctx)).await;
        self.run_deferred(&mut **service, ctx);
        self.set_status(ServiceState::Started, None);
        match outcome {
            Ok(()) => {
                debug!("Updated component '{}'", self.uid);
                self.lifecycle.updated.async_emit(());
                Ok(())
            }
            Err(failure) => {
                error!("{}", failure);
                Err(failure.into())
            }
        }
    }

    async fn swap_here(&self, key: &str, object: Option<Arc<Object>>) -> Result<()> {
        let mut cell = self.lock_cell("swap")?;
        let state = self.state();
        if state != ServiceState::Started {
            return Err(self.refuse(LifecycleError::InvalidState {
                uid: self.uid.clone(),
                operation: "swap",
                state,
            }));
        }
        let declared = self.keys.iter().find(|decl| decl.matches(key)).map(|decl| decl.access);
        let bound = self.bindings.read().get(key).map(|b| b.access);
        let Some(access) = bound.or(declared) else {
            return Err(self.refuse(LifecycleError::UnknownKey {
                uid: self.uid.clone(),
                key: key.to_string(),
            }));
        };
        self.set_status(state, Some(Operation::Swapping));
        let dropped = self.disconnect_keys(Some(key));
        {
            let mut bindings = self.bindings.write();
            match bindings.get_mut(key) {
                Some(binding) => {
                    if let Some(new) = &object {
                        binding.uid = new.uid().to_string();
                    }
                    binding.object = object;
                }
                None => {
                    if let Some(new) = object {
                        bindings.insert(key, ObjectBinding::new(access, new));
                    }
                }
            }
        }
        let ServiceCell { service, ctx } = &mut *cell;
        let outcome = guard_hook(&self.uid, "swapping", service.swapping(ctx, key)).await;
        self.run_deferred(&mut **service, ctx);
        let reconnected = self.connect_keys(Some(key));
        self.set_status(ServiceState::Started, None);
        if let Err(failure) = outcome {
            error!("{}", failure);
            return Err(failure.into());
        }
        if let Err(e) = reconnected {
            error!("Component '{}' could not reconnect key '{}' after swap: {}", self.uid, key, e);
            return Err(e);
        }
        debug!(
            "Swapped key '{}' of component '{}' ({} connection(s) moved)",
            key, self.uid, dropped
        );
        self.lifecycle.swapped.async_emit(());
        Ok(())
    }

    async fn stop_here(&self) -> Result<()> {
        let mut cell = self.lock_cell("stop")?;
        let state = self.state();
        if state != ServiceState::Started {
            return Err(self.refuse(LifecycleError::InvalidTransition {
                uid: self.uid.clone(),
                operation: "stop",
                state,
            }));
        }
        self.set_status(state, Some(Operation::Stopping));
        self.disconnect_keys(None);
        let ServiceCell { service, ctx } = &mut *cell;
        let outcome = guard_hook(&self.uid, "stopping", service.stopping(ctx)).await;
        self.run_deferred(&mut **service, ctx);
        self.set_status(ServiceState::Stopped, None);
        info!("Stopped component '{}'", self.uid);
        self.lifecycle.stopped.async_emit(());
        outcome.map_err(|failure| {
            error!("{}", failure);
            failure.into()
        })
    }

    fn lock_cell(&self, operation: &'static str) -> Result<tokio::sync::MutexGuard<'_, ServiceCell>> {
        self.cell.try_lock().map_err(|_| {
            self.refuse(LifecycleError::TransitionInProgress {
                uid: self.uid.clone(),
                operation,
            })
        })
    }

    fn refuse(&self, error: LifecycleError) -> Error {
        error!("{}", error);
        error.into()
    }

    fn set_status(&self, state: ServiceState, transition: Option<Operation>) {
        *self.status.write() = ServiceStatus { state, transition };
    }

    fn validate_bindings(&self) -> Result<()> {
        let compatible = self
            .context
            .upgrade()
            .map(|context| context.compatible_object_types(&self.implementation))
            .unwrap_or_default();
        let bindings = self.bindings.read();
        for decl in &self.keys {
            let bound: Vec<&ObjectBinding> = if decl.group {
                bindings.group(&decl.name).into_iter().map(|(_, b)| b).collect()
            } else {
                bindings.get(&decl.name).into_iter().collect()
            };
            let required = !decl.optional && decl.access != Access::Output;
            if bound.is_empty() && required {
                return Err(ConfigurationError::MissingRequiredKey {
                    uid: self.uid.clone(),
                    key: decl.name.clone(),
                }
                .into());
            }
            for binding in bound {
                if binding.access != decl.access {
                    return Err(ConfigurationError::AccessMismatch {
                        uid: self.uid.clone(),
                        key: decl.name.clone(),
                        declared: decl.access,
                        bound: binding.access,
                    }
                    .into());
                }
                if binding.object.is_none() && required && !binding.optional {
                    return Err(ConfigurationError::MissingRequiredKey {
                        uid: self.uid.clone(),
                        key: decl.name.clone(),
                    }
                    .into());
                }
            }
        }
        for (key, binding) in bindings.iter() {
            if !self.keys.is_empty() && !self.keys.iter().any(|decl| decl.matches(key)) {
                warn!("Component '{}' has no declared key '{}'; binding kept as is", self.uid, key);
            }
            if let Some(object) = &binding.object {
                if !compatible.is_empty() && !compatible.iter().any(|t| t == object.type_name()) {
                    return Err(ConfigurationError::IncompatibleObject {
                        uid: self.uid.clone(),
                        object: object.uid().to_string(),
                        object_type: object.type_name().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Establish auto-connections for every key, or only `only`.
    fn connect_keys(&self, only: Option<&str>) -> Result<()> {
        let global = self.auto_connect.load(Ordering::Acquire);
        let targets: Vec<(String, Arc<Object>)> = self
            .bindings
            .read()
            .iter()
            .filter(|(key, _)| only.is_none_or(|k| k == key.as_str()))
            .filter(|(_, b)| b.access != Access::Output && b.auto_connect.unwrap_or(global))
            .filter_map(|(key, b)| b.object.clone().map(|o| (key.clone(), o)))
            .collect();
        for (key, object) in targets {
            let pairs = self.auto_connections.for_key(&key);
            if pairs.is_empty() {
                debug!("Component '{}' declares no auto-connection for key '{}'", self.uid, key);
                continue;
            }
            for (signal_name, slot_name) in pairs {
                let signal = object.signals().get(signal_name).ok_or_else(|| ConnectionError::UnknownSignal {
                    owner: object.uid().to_string(),
                    signal: signal_name.clone(),
                })?;
                let slot = self.slots.get(slot_name).ok_or_else(|| ConnectionError::UnknownSlot {
                    owner: self.uid.clone(),
                    slot: slot_name.clone(),
                })?;
                let connection = signal.connect_slot(&slot)?;
                self.key_connections
                    .lock()
                    .entry(key.clone())
                    .or_default()
                    .push(connection);
            }
        }
        Ok(())
    }

    /// Remove auto-connections of every key, or only `only`.
    fn disconnect_keys(&self, only: Option<&str>) -> usize {
        let connections: Vec<Connection> = {
            let mut map = self.key_connections.lock();
            match only {
                Some(key) => map.remove(key).unwrap_or_default(),
                None => std::mem::take(&mut *map).into_values().flatten().collect(),
            }
        };
        connections.iter().filter(|c| c.disconnect()).count()
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("uid", &self.uid)
            .field("implementation", &self.implementation)
            .field("handle", &self.handle)
            .field("status", &self.status())
            .field("worker", &self.worker().name().to_string())
            .finish()
    }
}

async fn guard_hook<F>(uid: &str, hook: &'static str, hook_future: F) -> std::result::Result<(), RuntimeFailure>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(hook_future).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(RuntimeFailure::HookFailed {
            uid: uid.to_string(),
            hook,
            source: Box::new(source),
        }),
        Err(panic) => Err(RuntimeFailure::HookPanicked {
            uid: uid.to_string(),
            hook,
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn call_method<S, F>(uid: &str, service: &mut dyn Service, ctx: &mut ServiceContext, f: F) -> SlotResult
where
    S: Service,
    F: FnOnce(&mut S, &mut ServiceContext) -> SlotResult,
{
    let service = service
        .as_any_mut()
        .downcast_mut::<S>()
        .ok_or_else(|| format!("component '{}' is not a {}", uid, std::any::type_name::<S>()))?;
    f(service, ctx)
}

fn add_builtin_slots(slots: &mut HasSlots, owner: &Weak<ServiceHandle>) {
    let weak = owner.clone();
    slots.add(Slot::new(START_SLOT, move |(): ()| {
        let weak = weak.clone();
        async move {
            match weak.upgrade() {
                Some(handle) => handle.start().await.map_err(SlotError::from),
                None => Ok(()),
            }
        }
    }));

    let weak = owner.clone();
    slots.add(Slot::new(STOP_SLOT, move |(): ()| {
        let weak = weak.clone();
        async move {
            match weak.upgrade() {
                Some(handle) => handle.stop().await.map_err(SlotError::from),
                None => Ok(()),
            }
        }
    }));

    let weak = owner.clone();
    slots.add(Slot::new(UPDATE_SLOT, move |(): ()| {
        let weak = weak.clone();
        async move {
            let Some(handle) = weak.upgrade() else {
                return Ok(());
            };
            if handle.state() != ServiceState::Started {
                warn!(
                    "Update request for component '{}' discarded: it is {}",
                    handle.uid(),
                    handle.state()
                );
                return Ok(());
            }
            handle.update().await.map_err(SlotError::from)
        }
    }));

    let weak = owner.clone();
    slots.add(Slot::new(SWAP_KEY_SLOT, move |(key,): (String,)| {
        let weak = weak.clone();
        async move {
            match weak.upgrade() {
                Some(handle) => {
                    let object = handle.lookup_binding(&key);
                    handle.swap_key(&key, object).await.map_err(SlotError::from)
                }
                None => Ok(()),
            }
        }
    }));
}
