//! Components of a graph that wait on objects published while it runs.
//!
//! A uid listed under `deferred`, or produced as some component's output, is
//! not created by the graph. Components reading it are created, configured
//! and started once all their mandatory deferred objects are published, are
//! swapped onto a replacement, and are stopped and destroyed when one of
//! those objects is withdrawn. Connection endpoints owned by such objects or
//! components join their channel when the owner appears and leave it when the
//! owner goes.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::app_config::error::ConfigurationError;
use crate::app_config::manager::{bind_references, split_endpoint};
use crate::app_config::node::{AppConfig, ServiceDecl};
use crate::com::channel::{ChannelKey, MemberId};
use crate::com::connection::Connection;
use crate::com::error::ConnectionError;
use crate::com::signal::AnySignal;
use crate::com::slot::Slot;
use crate::data::object::Object;
use crate::kernel::context::Context;
use crate::kernel::error::{Error, Result};
use crate::service::handle::{ServiceHandle, ServiceState};
use crate::service::keys::{Access, ObjectBinding};

const LISTENER_SLOT: &str = "deferred_object";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointKind {
    Signal,
    Slot,
}

#[derive(Debug, Clone)]
struct PendingEndpoint {
    channel: ChannelKey,
    owner: String,
    name: String,
    kind: EndpointKind,
    optional: bool,
}

struct Dependent {
    decl: ServiceDecl,
    /// Deferred uids it reads.
    uses: BTreeSet<String>,
    /// Deferred uids it cannot run without.
    requires: BTreeSet<String>,
}

#[derive(Default)]
struct DeferredState {
    active: bool,
    local_objects: BTreeMap<String, Arc<Object>>,
    available: BTreeMap<String, Arc<Object>>,
    live: BTreeMap<usize, Arc<ServiceHandle>>,
    listener: Option<Arc<Slot>>,
    listening: Vec<Connection>,
}

pub(crate) struct DeferredObjects {
    context: Weak<Context>,
    config_id: String,
    prefix: Option<String>,
    declared: BTreeSet<String>,
    member: MemberId,
    uids: BTreeSet<String>,
    dependents: Vec<Dependent>,
    pending: Vec<PendingEndpoint>,
    start: Option<Vec<String>>,
    update: Vec<String>,
    state: Mutex<DeferredState>,
}

impl DeferredObjects {
    pub(crate) fn new(
        context: &Arc<Context>,
        config: &AppConfig,
        prefix: Option<String>,
        declared: BTreeSet<String>,
        member: MemberId,
    ) -> Arc<Self> {
        let deferred = config.deferred_uids();
        let dependents: Vec<Dependent> = config
            .services
            .iter()
            .filter(|decl| decl.waits_on(&deferred))
            .map(|decl| {
                let readers: Vec<_> = decl
                    .references()
                    .into_iter()
                    .filter(|r| r.access != Access::Output && deferred.contains(r.uid))
                    .map(|r| (r.uid.to_string(), r.optional))
                    .collect();
                Dependent {
                    decl: decl.clone(),
                    uses: readers.iter().map(|(uid, _)| uid.clone()).collect(),
                    requires: readers
                        .iter()
                        .filter(|(_, optional)| !optional)
                        .map(|(uid, _)| uid.clone())
                        .collect(),
                }
            })
            .collect();
        let waiting: BTreeSet<&str> = dependents.iter().filter_map(|d| d.decl.uid.as_deref()).collect();
        let mut pending = Vec::new();
        for (index, decl) in config.connections.iter().enumerate() {
            let channel = ChannelKey::for_declaration(decl.channel.as_deref(), member, index);
            let endpoints = decl
                .signals
                .iter()
                .map(|e| (e, EndpointKind::Signal))
                .chain(decl.slots.iter().map(|e| (e, EndpointKind::Slot)));
            for (endpoint, kind) in endpoints {
                let Ok((owner, name)) = split_endpoint(endpoint) else {
                    continue;
                };
                if deferred.contains(owner) || waiting.contains(owner) {
                    pending.push(PendingEndpoint {
                        channel: channel.clone(),
                        owner: owner.to_string(),
                        name: name.to_string(),
                        kind,
                        optional: decl.optional,
                    });
                }
            }
        }
        Arc::new(Self {
            context: Arc::downgrade(context),
            config_id: config.id.clone(),
            prefix,
            declared,
            member,
            uids: deferred.iter().map(|uid| uid.to_string()).collect(),
            dependents,
            pending,
            start: config.start.clone(),
            update: config.update.clone(),
            state: Mutex::new(DeferredState::default()),
        })
    }

    /// Whether the graph leaves the creation of `decl` to this tracker.
    pub(crate) fn defers(&self, decl: &ServiceDecl) -> bool {
        let uids: BTreeSet<&str> = self.uids.iter().map(String::as_str).collect();
        decl.waits_on(&uids)
    }

    /// Whether `owner` (a local uid) only exists while the graph runs.
    pub(crate) fn owns(&self, owner: &str) -> bool {
        self.uids.contains(owner) || self.dependents.iter().any(|d| d.decl.uid.as_deref() == Some(owner))
    }

    /// Live component created for the local uid `uid`.
    pub(crate) fn service(&self, uid: &str) -> Option<Arc<ServiceHandle>> {
        let index = self.dependents.iter().position(|d| d.decl.uid.as_deref() == Some(uid))?;
        self.state.lock().live.get(&index).cloned()
    }

    pub(crate) fn services(&self) -> Vec<Arc<ServiceHandle>> {
        self.state.lock().live.values().cloned().collect()
    }

    /// Start following publications: create whatever is already satisfied,
    /// then react to every object published or withdrawn afterwards.
    pub(crate) async fn activate(self: &Arc<Self>, local_objects: BTreeMap<String, Arc<Object>>) -> Result<()> {
        let context = self.context()?;
        {
            let mut state = self.state.lock();
            state.local_objects = local_objects;
            state.active = true;
        }
        if self.uids.is_empty() {
            return Ok(());
        }
        let worker = context.workers().default_worker()?;
        let weak = Arc::downgrade(self);
        let listener = Slot::new(LISTENER_SLOT, move |(uid,): (String,)| {
            let weak = weak.clone();
            async move {
                if let Some(tracker) = weak.upgrade() {
                    tracker.object_event(&uid).await;
                }
                Ok(())
            }
        });
        listener.set_worker(Some(worker.clone()));
        let listening = vec![
            context.object_registered().connect(&listener)?,
            context.object_released().connect(&listener)?,
        ];
        {
            let mut state = self.state.lock();
            state.listener = Some(listener);
            state.listening = listening;
        }
        let this = Arc::clone(self);
        worker
            .run(async move {
                for uid in this.uids.clone() {
                    this.reconcile(&uid).await;
                }
            })
            .await?;
        Ok(())
    }

    /// Stop following publications and stop every component created here.
    pub(crate) async fn deactivate(self: &Arc<Self>) {
        let (listening, live) = {
            let mut state = self.state.lock();
            state.active = false;
            state.listener = None;
            let live: Vec<Arc<ServiceHandle>> = state.live.values().cloned().collect();
            (std::mem::take(&mut state.listening), live)
        };
        for connection in listening {
            connection.disconnect();
        }
        let this = Arc::clone(self);
        self.on_worker(async move {
            for handle in live.into_iter().rev() {
                this.leave_owner(handle.uid());
                if handle.state() == ServiceState::Started {
                    if let Err(e) = handle.stop().await {
                        error!("Component '{}' failed to stop: {}", handle.uid(), e);
                    }
                }
            }
        })
        .await;
    }

    /// Destroy every component created here.
    pub(crate) async fn teardown(self: &Arc<Self>) {
        self.deactivate().await;
        let live = {
            let mut state = self.state.lock();
            state.available.clear();
            state.local_objects.clear();
            std::mem::take(&mut state.live)
        };
        let Ok(context) = self.context() else {
            return;
        };
        for handle in live.into_values().rev() {
            if let Err(e) = context.destroy_service(handle.uid()).await {
                warn!("Failed to destroy component '{}': {}", handle.uid(), e);
            }
        }
    }

    async fn on_worker<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let worker = self.context().ok().and_then(|c| c.workers().default_worker().ok());
        match worker {
            Some(worker) => {
                if let Err(e) = worker.run(task).await {
                    warn!("Configuration '{}' could not reach its worker: {}", self.config_id, e);
                }
            }
            None => task.await,
        }
    }

    fn context(&self) -> Result<Arc<Context>> {
        self.context
            .upgrade()
            .ok_or_else(|| Error::Other(format!("context of configuration '{}' has been dropped", self.config_id)))
    }

    fn published_uid(&self, uid: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, uid),
            None => uid.to_string(),
        }
    }

    fn resolve_uid(&self, uid: &str) -> String {
        if self.declared.contains(uid) {
            self.published_uid(uid)
        } else {
            uid.to_string()
        }
    }

    async fn object_event(&self, published: &str) {
        if !self.state.lock().active {
            return;
        }
        let local = self.uids.iter().find(|uid| self.published_uid(uid) == published).cloned();
        if let Some(uid) = local {
            self.reconcile(&uid).await;
        }
    }

    /// Bring everything depending on `uid` in line with the object the
    /// context currently publishes under it, then create whatever became
    /// ready.
    async fn reconcile(&self, uid: &str) {
        let Ok(context) = self.context() else {
            return;
        };
        let published = self.published_uid(uid);
        let current = context.get_object(&published);
        let change = {
            let mut state = self.state.lock();
            if !state.active {
                return;
            }
            let previous = state.available.get(uid).cloned();
            let unchanged = match (&previous, &current) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if !unchanged {
                match &current {
                    Some(object) => state.available.insert(uid.to_string(), Arc::clone(object)),
                    None => state.available.remove(uid),
                };
            }
            (!unchanged).then_some(previous)
        };
        if let Some(previous) = change {
            self.apply(&context, uid, previous, current).await;
        }
        self.create_ready(&context).await;
    }

    async fn apply(&self, context: &Context, uid: &str, previous: Option<Arc<Object>>, current: Option<Arc<Object>>) {
        let published = self.published_uid(uid);
        match (&previous, &current) {
            (None, _) => info!("Deferred object '{}' of configuration '{}' is available", published, self.config_id),
            (Some(_), None) => info!("Deferred object '{}' of configuration '{}' was withdrawn", published, self.config_id),
            (Some(_), Some(_)) => info!("Deferred object '{}' of configuration '{}' was replaced", published, self.config_id),
        }

        if previous.is_some() {
            self.leave_owner(&published);
        }
        if let Some(object) = &current {
            self.join_pending(uid, |name| object.signals().get(name), |_| None);
        }

        let affected: Vec<(usize, Arc<ServiceHandle>)> = {
            let state = self.state.lock();
            state
                .live
                .iter()
                .filter(|(index, _)| self.dependents[**index].uses.contains(uid))
                .map(|(index, handle)| (*index, Arc::clone(handle)))
                .collect()
        };
        for (index, handle) in affected {
            self.follow(context, index, &handle, uid, current.clone()).await;
        }
    }

    /// Move the keys of a live component reading `uid` onto `object`, or
    /// retire the component when a mandatory object is gone.
    async fn follow(
        &self,
        context: &Context,
        index: usize,
        handle: &Arc<ServiceHandle>,
        uid: &str,
        object: Option<Arc<Object>>,
    ) {
        let dependent = &self.dependents[index];
        if object.is_none() && dependent.requires.contains(uid) {
            self.retire(context, index, handle, uid).await;
            return;
        }
        for reference in dependent.decl.references() {
            if reference.uid != uid || reference.access == Access::Output {
                continue;
            }
            let outcome = if handle.state() == ServiceState::Started {
                handle.swap_key(&reference.key, object.clone()).await
            } else {
                match &object {
                    Some(object) => {
                        let mut binding = ObjectBinding::new(reference.access, Arc::clone(object));
                        binding.auto_connect = reference.auto_connect;
                        binding.optional = reference.optional;
                        handle.bind(&reference.key, binding)
                    }
                    None => handle.unbind(&reference.key).map(|_| ()),
                }
            };
            if let Err(e) = outcome {
                error!(
                    "Component '{}' could not follow deferred object '{}' on key '{}': {}",
                    handle.uid(),
                    uid,
                    reference.key,
                    e
                );
            }
        }
    }

    async fn retire(&self, context: &Context, index: usize, handle: &Arc<ServiceHandle>, uid: &str) {
        self.state.lock().live.remove(&index);
        self.leave_owner(handle.uid());
        if let Err(e) = context.destroy_service(handle.uid()).await {
            warn!("Failed to destroy component '{}': {}", handle.uid(), e);
        }
        info!(
            "Component '{}' of configuration '{}' stopped: object '{}' is no longer available",
            handle.uid(),
            self.config_id,
            uid
        );
    }

    async fn create_ready(&self, context: &Context) {
        let ready: Vec<usize> = {
            let state = self.state.lock();
            (0..self.dependents.len())
                .filter(|index| !state.live.contains_key(index))
                .filter(|index| {
                    self.dependents[*index]
                        .requires
                        .iter()
                        .all(|uid| state.available.contains_key(uid))
                })
                .collect()
        };
        for index in ready {
            match self.create(context, index).await {
                Ok(handle) => {
                    info!(
                        "Component '{}' of configuration '{}' created: its objects are available",
                        handle.uid(),
                        self.config_id
                    );
                    self.state.lock().live.insert(index, handle);
                }
                Err(e) => error!(
                    "Configuration '{}' could not create a component waiting on deferred objects: {}",
                    self.config_id, e
                ),
            }
        }
    }

    async fn create(&self, context: &Context, index: usize) -> Result<Arc<ServiceHandle>> {
        let decl = &self.dependents[index].decl;
        let uid = decl.uid.as_deref().map(|u| self.published_uid(u));
        let handle = context.create_service(&decl.implementation, uid.as_deref(), decl.worker.as_deref())?;
        if let Err(e) = self.bring_up(context, decl, &handle).await {
            self.leave_owner(handle.uid());
            if let Err(destroy) = context.destroy_service(handle.uid()).await {
                warn!("Failed to destroy component '{}': {}", handle.uid(), destroy);
            }
            return Err(e);
        }
        Ok(handle)
    }

    async fn bring_up(&self, context: &Context, decl: &ServiceDecl, handle: &Arc<ServiceHandle>) -> Result<()> {
        handle.set_auto_connect(decl.auto_connect);
        bind_references(
            handle,
            decl,
            |reference| self.lookup(context, reference, handle.uid()),
            |uid| self.resolve_uid(uid),
        )?;
        handle.configure(decl.config.clone()).await?;
        let listed = |list: &[String]| decl.uid.as_ref().is_some_and(|uid| list.contains(uid));
        if self.start.as_deref().is_none_or(listed) {
            handle.start().await?;
        }
        if let Some(local) = decl.uid.as_deref() {
            self.join_pending(local, |name| handle.signals().get(name), |name| handle.slot(name));
        }
        if listed(self.update.as_slice()) && handle.state() == ServiceState::Started {
            handle.update().await?;
        }
        Ok(())
    }

    fn lookup(&self, context: &Context, reference: &str, requester: &str) -> Result<Arc<Object>> {
        {
            let state = self.state.lock();
            if let Some(object) = state.local_objects.get(reference).or_else(|| state.available.get(reference)) {
                return Ok(Arc::clone(object));
            }
        }
        let unresolved = || ConfigurationError::UnresolvedReference {
            uid: requester.to_string(),
            reference: reference.to_string(),
        };
        if self.declared.contains(reference) {
            return Err(unresolved().into());
        }
        context.get_object(reference).ok_or_else(|| unresolved().into())
    }

    /// Join the channels of every endpoint owned by the local uid `owner`.
    fn join_pending<S, T>(&self, owner: &str, signals: S, slots: T)
    where
        S: Fn(&str) -> Option<Arc<dyn AnySignal>>,
        T: Fn(&str) -> Option<Arc<Slot>>,
    {
        let Ok(context) = self.context() else {
            return;
        };
        let published = self.published_uid(owner);
        for endpoint in self.pending.iter().filter(|p| p.owner == owner) {
            let joined = match endpoint.kind {
                EndpointKind::Signal => signals(&endpoint.name)
                    .ok_or_else(|| ConnectionError::UnknownSignal {
                        owner: published.clone(),
                        signal: endpoint.name.clone(),
                    })
                    .and_then(|signal| {
                        context
                            .channels()
                            .join_signal(&endpoint.channel, self.member, &published, signal)
                    }),
                EndpointKind::Slot => slots(&endpoint.name)
                    .ok_or_else(|| ConnectionError::UnknownSlot {
                        owner: published.clone(),
                        slot: endpoint.name.clone(),
                    })
                    .and_then(|slot| {
                        context
                            .channels()
                            .join_slot(&endpoint.channel, self.member, &published, slot)
                    }),
            };
            match joined {
                Ok(links) => debug!(
                    "'{}.{}' joined channel '{}' ({} link(s))",
                    published, endpoint.name, endpoint.channel, links
                ),
                Err(e) if endpoint.optional => warn!(
                    "Optional endpoint '{}.{}' on channel '{}' skipped: {}",
                    published, endpoint.name, endpoint.channel, e
                ),
                Err(e) => error!(
                    "Endpoint '{}.{}' could not join channel '{}': {}",
                    published, endpoint.name, endpoint.channel, e
                ),
            }
        }
    }

    fn leave_owner(&self, published: &str) {
        if let Ok(context) = self.context() {
            context.channels().leave_owner(self.member, published);
        }
    }
}

impl fmt::Debug for DeferredObjects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeferredObjects")
            .field("config", &self.config_id)
            .field("uids", &self.uids)
            .field("available", &state.available.keys().collect::<Vec<_>>())
            .field("live", &state.live.values().map(|h| h.uid().to_string()).collect::<Vec<_>>())
            .finish()
    }
}
