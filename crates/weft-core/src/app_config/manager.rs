use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::app_config::deferred::DeferredObjects;
use crate::app_config::error::ConfigurationError;
use crate::app_config::node::{AppConfig, ObjectDecl, ParameterDecl, ServiceDecl};
use crate::app_config::params::substitute;
use crate::com::channel::{ChannelKey, MemberId};
use crate::com::error::ConnectionError;
use crate::com::signal::AnySignal;
use crate::com::slot::Slot;
use crate::data::object::Object;
use crate::kernel::constants::ENDPOINT_SEPARATOR;
use crate::kernel::context::Context;
use crate::kernel::error::{Error, Result};
use crate::service::handle::{ServiceHandle, ServiceState};
use crate::service::keys::{Access, ObjectBinding};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Destroyed,
    Created,
    Started,
    Stopped,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagerState::Destroyed => "destroyed",
            ManagerState::Created => "created",
            ManagerState::Started => "started",
            ManagerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Builds one configuration into live objects, components and connections,
/// and tears it down again.
///
/// `create` instantiates objects then components (binding and configuring
/// them), `start` starts components then joins the declared connections to
/// their channels, `stop` undoes `start` in reverse, `destroy` undoes
/// `create` in reverse. A failed `create`, or a mandatory connection failing
/// in `start`, rolls everything back and leaves the manager destroyed.
///
/// Connections carrying a `channel` name join the context-wide channel of
/// that name, so signals and slots declared by different graphs meet there.
/// Components reading deferred objects are left to a tracker that brings
/// them up while the graph is started and the objects are published.
pub struct AppConfigManager {
    context: Arc<Context>,
    config_id: String,
    parameters: BTreeMap<String, String>,
    prefix: Option<String>,
    nested: bool,
    state: ManagerState,
    config: Option<AppConfig>,
    declared: BTreeSet<String>,
    local_objects: BTreeMap<String, Arc<Object>>,
    objects: Vec<Arc<Object>>,
    local_services: BTreeMap<String, Arc<ServiceHandle>>,
    services: Vec<Arc<ServiceHandle>>,
    started: Vec<Arc<ServiceHandle>>,
    member: MemberId,
    deferred: Option<Arc<DeferredObjects>>,
}

impl AppConfigManager {
    pub fn new(context: Arc<Context>, config_id: impl Into<String>) -> Self {
        let member = context.channels().register_member();
        Self {
            context,
            config_id: config_id.into(),
            parameters: BTreeMap::new(),
            prefix: None,
            nested: false,
            state: ManagerState::Destroyed,
            config: None,
            declared: BTreeSet::new(),
            local_objects: BTreeMap::new(),
            objects: Vec::new(),
            local_services: BTreeMap::new(),
            services: Vec::new(),
            started: Vec::new(),
            member,
            deferred: None,
        }
    }

    /// Values for the configuration's `%NAME%` placeholders.
    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Publish every uid this configuration declares as `<prefix>_<uid>`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Built from inside another graph: the context's parameters are not
    /// visible, only the declared defaults and the supplied values.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn config_id(&self) -> &str {
        &self.config_id
    }

    pub fn config(&self) -> Option<&AppConfig> {
        self.config.as_ref()
    }

    pub fn services(&self) -> &[Arc<ServiceHandle>] {
        &self.services
    }

    pub fn objects(&self) -> &[Arc<Object>] {
        &self.objects
    }

    /// Component declared as `uid` in this configuration, including one
    /// currently brought up for its deferred objects.
    pub fn service(&self, uid: &str) -> Option<Arc<ServiceHandle>> {
        self.local_services
            .get(uid)
            .cloned()
            .or_else(|| self.deferred.as_ref().and_then(|d| d.service(uid)))
    }

    /// Components currently alive because their deferred objects are.
    pub fn deferred_services(&self) -> Vec<Arc<ServiceHandle>> {
        self.deferred.as_ref().map(|d| d.services()).unwrap_or_default()
    }

    /// Object declared as `uid` in this configuration.
    pub fn object(&self, uid: &str) -> Option<Arc<Object>> {
        self.local_objects.get(uid).cloned()
    }

    /// Live connections this graph takes part in, on either end.
    pub fn connection_count(&self) -> usize {
        self.context.channels().link_count(self.member)
    }

    pub fn member(&self) -> MemberId {
        self.member
    }

    /// The uid under which a declared uid is published.
    pub fn resolve_uid(&self, uid: &str) -> String {
        if self.declared.contains(uid) {
            self.published_uid(uid)
        } else {
            uid.to_string()
        }
    }

    pub async fn create(&mut self) -> Result<()> {
        self.expect_state(&[ManagerState::Destroyed], "create")?;
        let config = self.resolve_config()?;
        if let Err(e) = self.build(&config).await {
            error!("Failed to create configuration '{}': {}", self.config_id, e);
            self.teardown().await;
            return Err(e);
        }
        info!(
            "Created configuration '{}' ({} object(s), {} component(s))",
            self.config_id,
            self.objects.len(),
            self.services.len()
        );
        self.config = Some(config);
        self.state = ManagerState::Created;
        Ok(())
    }

    pub async fn start(&mut self) -> Result<()> {
        self.expect_state(&[ManagerState::Created], "start")?;
        let config = self.current_config()?;
        let order: Vec<Arc<ServiceHandle>> = match &config.start {
            Some(list) => list
                .iter()
                .filter_map(|uid| self.local_services.get(uid).cloned())
                .collect(),
            None => self.services.clone(),
        };
        for handle in order {
            match handle.start().await {
                Ok(()) => self.started.push(handle),
                Err(e) => error!(
                    "Component '{}' of configuration '{}' failed to start: {}",
                    handle.uid(),
                    self.config_id,
                    e
                ),
            }
        }
        if let Err(e) = self.connect_all(&config) {
            error!("Failed to wire configuration '{}', rolling back: {}", self.config_id, e);
            self.rollback().await;
            return Err(e);
        }
        if let Some(deferred) = self.deferred.clone() {
            if let Err(e) = deferred.activate(self.local_objects.clone()).await {
                error!("Failed to follow deferred objects of '{}', rolling back: {}", self.config_id, e);
                self.rollback().await;
                return Err(e);
            }
        }
        self.state = ManagerState::Started;
        info!("Started configuration '{}'", self.config_id);
        Ok(())
    }

    /// Update the components listed in the configuration's `update` section.
    pub async fn update(&mut self) -> Result<()> {
        self.expect_state(&[ManagerState::Started], "update")?;
        let config = self.current_config()?;
        for uid in &config.update {
            let Some(handle) = self.service(uid) else {
                continue;
            };
            if let Err(e) = handle.update().await {
                error!("Component '{}' failed to update: {}", handle.uid(), e);
            }
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.expect_state(&[ManagerState::Started], "stop")?;
        if let Some(deferred) = &self.deferred {
            deferred.deactivate().await;
        }
        self.leave_channels();
        self.stop_started().await;
        self.state = ManagerState::Stopped;
        info!("Stopped configuration '{}'", self.config_id);
        Ok(())
    }

    pub async fn destroy(&mut self) -> Result<()> {
        self.expect_state(&[ManagerState::Created, ManagerState::Stopped], "destroy")?;
        self.teardown().await;
        self.config = None;
        self.state = ManagerState::Destroyed;
        info!("Destroyed configuration '{}'", self.config_id);
        Ok(())
    }

    /// `create`, `start`, then `update`.
    pub async fn launch(&mut self) -> Result<()> {
        self.create().await?;
        self.start().await?;
        self.update().await
    }

    /// Stop when started, then destroy.
    pub async fn stop_and_destroy(&mut self) -> Result<()> {
        if self.state == ManagerState::Started {
            self.stop().await?;
        }
        if self.state != ManagerState::Destroyed {
            self.destroy().await?;
        }
        Ok(())
    }

    fn expect_state(&self, allowed: &[ManagerState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(ConfigurationError::InvalidManagerState {
            config: self.config_id.clone(),
            operation,
            state: self.state.to_string(),
        }
        .into())
    }

    fn current_config(&self) -> Result<AppConfig> {
        self.config
            .clone()
            .ok_or_else(|| Error::Other(format!("configuration '{}' has not been created", self.config_id)))
    }

    fn malformed(&self, message: impl fmt::Display) -> Error {
        ConfigurationError::Malformed {
            config: self.config_id.clone(),
            message: message.to_string(),
        }
        .into()
    }

    fn published_uid(&self, uid: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, uid),
            None => uid.to_string(),
        }
    }

    fn resolve_config(&self) -> Result<AppConfig> {
        let mut template = self.context.app_config_template(&self.config_id)?;
        let declared: Vec<ParameterDecl> = match template.as_object_mut().and_then(|m| m.remove("parameters")) {
            Some(raw) => serde_json::from_value(raw).map_err(|e| self.malformed(e))?,
            None => Vec::new(),
        };
        let mut values = if self.nested {
            BTreeMap::new()
        } else {
            self.context.parameters()
        };
        for decl in &declared {
            if let Some(default) = &decl.default {
                values.insert(decl.name.clone(), default.clone());
            }
        }
        values.extend(self.parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        let substituted = substitute(&template, &values, &self.config_id)?;
        let mut config: AppConfig = serde_json::from_value(substituted).map_err(|e| self.malformed(e))?;
        config.parameters = declared;
        if config.id.is_empty() {
            config.id = self.config_id.clone();
        }
        Ok(config)
    }

    async fn build(&mut self, config: &AppConfig) -> Result<()> {
        self.check_declarations(config)?;
        let deferred = DeferredObjects::new(
            &self.context,
            config,
            self.prefix.clone(),
            self.declared.clone(),
            self.member,
        );
        self.deferred = Some(Arc::clone(&deferred));
        for decl in &config.objects {
            self.create_object(decl)?;
        }
        let mut created = Vec::with_capacity(config.services.len());
        for decl in &config.services {
            if deferred.defers(decl) {
                debug!(
                    "Component '{}' of configuration '{}' waits for deferred objects",
                    decl.uid.as_deref().unwrap_or(&decl.implementation),
                    self.config_id
                );
                continue;
            }
            created.push((self.create_service(decl)?, decl));
        }
        for (handle, decl) in created {
            handle.configure(decl.config.clone()).await?;
        }
        Ok(())
    }

    fn check_declarations(&mut self, config: &AppConfig) -> Result<()> {
        let mut seen = BTreeSet::new();
        let deferred = config.deferred_uids();
        for uid in config.declared_uids() {
            if !seen.insert(uid.to_string()) {
                return Err(ConfigurationError::DuplicateUid { uid: uid.to_string() }.into());
            }
            let published = self.published_uid(uid);
            if !deferred.contains(uid) && self.context.has_uid(&published) {
                return Err(ConfigurationError::DuplicateUid { uid: published }.into());
            }
        }
        let services: BTreeSet<&str> = config.services.iter().filter_map(|s| s.uid.as_deref()).collect();
        let listed = config.start.iter().flatten().chain(config.update.iter());
        for uid in listed {
            if !services.contains(uid.as_str()) {
                return Err(ConfigurationError::UnresolvedReference {
                    uid: self.config_id.clone(),
                    reference: uid.clone(),
                }
                .into());
            }
        }
        self.declared = seen;
        Ok(())
    }

    fn create_object(&mut self, decl: &ObjectDecl) -> Result<()> {
        let uid = self.published_uid(&decl.uid);
        let object = self
            .context
            .create_object(&decl.type_name, Some(&uid), decl.value.clone())?;
        self.objects.push(Arc::clone(&object));
        for (field, reference) in &decl.fields {
            let target = self.lookup_object(reference, &decl.uid)?;
            object.set_field(field.clone(), target);
        }
        self.local_objects.insert(decl.uid.clone(), object);
        Ok(())
    }

    fn create_service(&mut self, decl: &ServiceDecl) -> Result<Arc<ServiceHandle>> {
        let uid = decl.uid.as_deref().map(|u| self.published_uid(u));
        let handle = self
            .context
            .create_service(&decl.implementation, uid.as_deref(), decl.worker.as_deref())?;
        self.services.push(Arc::clone(&handle));
        if let Some(declared) = &decl.uid {
            self.local_services.insert(declared.clone(), Arc::clone(&handle));
        }
        handle.set_auto_connect(decl.auto_connect);
        bind_references(
            &handle,
            decl,
            |reference| self.lookup_object(reference, handle.uid()),
            |uid| self.resolve_uid(uid),
        )?;
        Ok(handle)
    }

    /// Local objects must already exist; anything else is looked up among
    /// published objects.
    fn lookup_object(&self, reference: &str, requester: &str) -> Result<Arc<Object>> {
        if let Some(object) = self.local_objects.get(reference) {
            return Ok(Arc::clone(object));
        }
        let unresolved = || ConfigurationError::UnresolvedReference {
            uid: requester.to_string(),
            reference: reference.to_string(),
        };
        if self.declared.contains(reference) {
            return Err(unresolved().into());
        }
        self.context
            .get_object(reference)
            .ok_or_else(|| unresolved().into())
    }

    fn find_service(&self, uid: &str) -> Option<Arc<ServiceHandle>> {
        self.local_services
            .get(uid)
            .cloned()
            .or_else(|| self.context.get_service(&self.resolve_uid(uid)))
    }

    fn find_object(&self, uid: &str) -> Option<Arc<Object>> {
        self.local_objects
            .get(uid)
            .cloned()
            .or_else(|| self.context.get_object(&self.resolve_uid(uid)))
    }

    /// Join every endpoint whose owner exists now to its channel. Endpoints
    /// of deferred objects, and of components waiting on them, join later.
    fn connect_all(&self, config: &AppConfig) -> Result<()> {
        for (index, decl) in config.connections.iter().enumerate() {
            let channel = ChannelKey::for_declaration(decl.channel.as_deref(), self.member, index);
            let joined = decl
                .signals
                .iter()
                .map(|endpoint| (endpoint, self.join_signal(&channel, endpoint)))
                .chain(
                    decl.slots
                        .iter()
                        .map(|endpoint| (endpoint, self.join_slot(&channel, endpoint))),
                );
            for (endpoint, outcome) in joined {
                match outcome {
                    Ok(()) => {}
                    Err(e) if decl.optional => {
                        warn!("Optional connection '{}' skipped endpoint '{}': {}", channel, endpoint, e);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    fn join_signal(&self, channel: &ChannelKey, endpoint: &str) -> Result<()> {
        let (owner, _) = split_endpoint(endpoint)?;
        if self.waits_for(owner) {
            return Ok(());
        }
        let signal = self.signal_endpoint(endpoint)?;
        self.context
            .channels()
            .join_signal(channel, self.member, &self.resolve_uid(owner), signal)?;
        Ok(())
    }

    fn join_slot(&self, channel: &ChannelKey, endpoint: &str) -> Result<()> {
        let (owner, _) = split_endpoint(endpoint)?;
        if self.waits_for(owner) {
            return Ok(());
        }
        let slot = self.slot_endpoint(endpoint)?;
        self.context
            .channels()
            .join_slot(channel, self.member, &self.resolve_uid(owner), slot)?;
        Ok(())
    }

    fn waits_for(&self, owner: &str) -> bool {
        self.deferred.as_ref().is_some_and(|d| d.owns(owner))
    }

    fn signal_endpoint(&self, endpoint: &str) -> Result<Arc<dyn AnySignal>> {
        let (owner, name) = split_endpoint(endpoint)?;
        let signal = if let Some(service) = self.find_service(owner) {
            service.signals().get(name)
        } else if let Some(object) = self.find_object(owner) {
            object.signals().get(name)
        } else {
            return Err(self.unresolved_owner(owner));
        };
        signal.ok_or_else(|| {
            ConnectionError::UnknownSignal {
                owner: owner.to_string(),
                signal: name.to_string(),
            }
            .into()
        })
    }

    fn slot_endpoint(&self, endpoint: &str) -> Result<Arc<Slot>> {
        let (owner, name) = split_endpoint(endpoint)?;
        let service = self
            .find_service(owner)
            .ok_or_else(|| self.unresolved_owner(owner))?;
        service.slot(name).ok_or_else(|| {
            ConnectionError::UnknownSlot {
                owner: owner.to_string(),
                slot: name.to_string(),
            }
            .into()
        })
    }

    fn unresolved_owner(&self, owner: &str) -> Error {
        ConfigurationError::UnresolvedReference {
            uid: self.config_id.clone(),
            reference: owner.to_string(),
        }
        .into()
    }

    fn leave_channels(&self) {
        let removed = self.context.channels().leave(self.member);
        if removed > 0 {
            debug!("Configuration '{}' removed {} explicit connection(s)", self.config_id, removed);
        }
    }

    async fn stop_started(&mut self) {
        let started = std::mem::take(&mut self.started);
        for handle in started.into_iter().rev() {
            if handle.state() != ServiceState::Started {
                continue;
            }
            if let Err(e) = handle.stop().await {
                error!("Component '{}' failed to stop: {}", handle.uid(), e);
            }
        }
    }

    async fn rollback(&mut self) {
        if let Some(deferred) = &self.deferred {
            deferred.deactivate().await;
        }
        self.leave_channels();
        self.stop_started().await;
        self.teardown().await;
        self.config = None;
        self.state = ManagerState::Destroyed;
    }

    /// Destroy components newest first, then release objects newest first,
    /// stopping any outside component still started on an object before
    /// that object goes.
    async fn teardown(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            deferred.teardown().await;
        }
        self.leave_channels();
        self.started.clear();
        let services = std::mem::take(&mut self.services);
        for handle in services.into_iter().rev() {
            if let Err(e) = self.context.destroy_service(handle.uid()).await {
                warn!("Failed to destroy component '{}': {}", handle.uid(), e);
            }
        }
        self.local_services.clear();
        let objects = std::mem::take(&mut self.objects);
        for object in objects.into_iter().rev() {
            for dependent in self.context.services_bound_to(object.uid()) {
                if dependent.state() == ServiceState::Started {
                    warn!(
                        "Stopping component '{}' before releasing object '{}'",
                        dependent.uid(),
                        object.uid()
                    );
                    if let Err(e) = dependent.stop().await {
                        warn!("Component '{}' failed to stop: {}", dependent.uid(), e);
                    }
                }
            }
            self.context.release_object(object.uid());
        }
        self.local_objects.clear();
        self.declared.clear();
    }
}

/// Bind every key `decl` declares on `handle`. `lookup` resolves the objects
/// read by input and inout keys; output keys name the uid `publish` gives.
/// Optional keys whose object cannot be found stay unbound.
pub(crate) fn bind_references<L, P>(handle: &ServiceHandle, decl: &ServiceDecl, lookup: L, publish: P) -> Result<()>
where
    L: Fn(&str) -> Result<Arc<Object>>,
    P: Fn(&str) -> String,
{
    for reference in decl.references() {
        let mut binding = match reference.access {
            Access::Output => ObjectBinding::output(publish(reference.uid)),
            Access::Input | Access::Inout => match lookup(reference.uid) {
                Ok(object) => ObjectBinding::new(reference.access, object),
                Err(e) if reference.optional => {
                    debug!("Optional key '{}' of '{}' left unbound: {}", reference.key, handle.uid(), e);
                    continue;
                }
                Err(e) => return Err(e),
            },
        };
        binding.auto_connect = reference.auto_connect;
        binding.optional = reference.optional;
        handle.bind(&reference.key, binding)?;
    }
    Ok(())
}

pub(crate) fn split_endpoint(endpoint: &str) -> Result<(&str, &str)> {
    match endpoint.rsplit_once(ENDPOINT_SEPARATOR) {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => Err(ConfigurationError::MalformedEndpoint {
            endpoint: endpoint.to_string(),
        }
        .into()),
    }
}

impl fmt::Debug for AppConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfigManager")
            .field("config", &self.config_id)
            .field("state", &self.state)
            .field("prefix", &self.prefix)
            .field("objects", &self.objects.len())
            .field("services", &self.services.len())
            .field("member", &self.member)
            .field("deferred", &self.deferred)
            .finish()
    }
}

impl Drop for AppConfigManager {
    fn drop(&mut self) {
        if self.state != ManagerState::Destroyed {
            warn!(
                "Configuration '{}' dropped while {}; its components stay registered in the context",
                self.config_id, self.state
            );
        }
    }
}
