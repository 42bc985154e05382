use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app_config::error::ConfigurationError;
use crate::app_config::launcher::ConfigLauncher;
use crate::app_config::manager::AppConfigManager;
use crate::app_config::node::ConfigDocument;
use crate::com::channel::ChannelRegistry;
use crate::com::signal::Signal;
use crate::data::object::Object;
use crate::kernel::component::KernelComponent;
use crate::kernel::constants::{CONFIG_LAUNCHER, DEFAULT_WORKER, OBJECT_REGISTERED_SIG, OBJECT_RELEASED_SIG};
use crate::kernel::error::{Error, KernelLifecyclePhase, Result};
use crate::registry::arena::HandleArena;
use crate::registry::error::RegistryError;
use crate::registry::factory::{FactoryRegistry, ObjectTypeRegistry, ServiceConstructor};
use crate::registry::registry::ServiceRegistry;
use crate::service::handle::ServiceHandle;
use crate::service::traits::Service;
use crate::thread::pool::WorkerPool;

/// Settings a [`Context`] is built from; the `context` section of a
/// configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub default_worker: String,
    /// Workers spawned up front, besides the default one.
    pub workers: Vec<String>,
    /// Parameters visible to top-level configurations.
    pub parameters: BTreeMap<String, String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_worker: DEFAULT_WORKER.to_string(),
            workers: Vec::new(),
            parameters: BTreeMap::new(),
        }
    }
}

/// Everything a running graph shares: factories, live instances, workers,
/// parameters and configuration templates.
///
/// Built once per process (or per test) inside a tokio runtime and passed
/// around as `Arc<Context>`.
pub struct Context {
    name: &'static str,
    self_ref: Weak<Context>,
    parameters: RwLock<BTreeMap<String, String>>,
    factories: RwLock<FactoryRegistry>,
    object_types: RwLock<ObjectTypeRegistry>,
    registry: Mutex<ServiceRegistry>,
    workers: WorkerPool,
    arena: Arc<HandleArena>,
    app_configs: RwLock<BTreeMap<String, Value>>,
    channels: ChannelRegistry,
    object_registered: Signal<(String,)>,
    object_released: Signal<(String,)>,
    next_uid: AtomicU64,
}

impl Context {
    pub fn new() -> Result<Arc<Self>> {
        Self::with_config(ContextConfig::default())
    }

    pub fn with_config(config: ContextConfig) -> Result<Arc<Self>> {
        let workers = WorkerPool::new(config.default_worker.clone())?;
        for name in &config.workers {
            workers.get_or_spawn(name)?;
        }
        let mut factories = FactoryRegistry::new();
        factories.register::<ConfigLauncher>(CONFIG_LAUNCHER)?;
        info!(
            "Context created (default worker '{}', {} extra worker(s))",
            config.default_worker,
            config.workers.len()
        );
        Ok(Arc::new_cyclic(|weak| Self {
            name: "Context",
            self_ref: weak.clone(),
            parameters: RwLock::new(config.parameters),
            factories: RwLock::new(factories),
            object_types: RwLock::new(ObjectTypeRegistry::default()),
            registry: Mutex::new(ServiceRegistry::new()),
            workers,
            arena: Arc::new(HandleArena::new()),
            app_configs: RwLock::new(BTreeMap::new()),
            channels: ChannelRegistry::new(),
            object_registered: Signal::new(OBJECT_REGISTERED_SIG),
            object_released: Signal::new(OBJECT_RELEASED_SIG),
            next_uid: AtomicU64::new(1),
        }))
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn arena(&self) -> &Arc<HandleArena> {
        &self.arena
    }

    /// Channels joining connections declared by different graphs.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Emits the uid of every object published in this context.
    pub fn object_registered(&self) -> &Signal<(String,)> {
        &self.object_registered
    }

    /// Emits the uid of every object withdrawn from this context.
    pub fn object_released(&self) -> &Signal<(String,)> {
        &self.object_released
    }

    // --- Parameters ---

    pub fn set_parameter(&self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.write().insert(name.into(), value.into());
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.read().get(name).cloned()
    }

    pub fn parameters(&self) -> BTreeMap<String, String> {
        self.parameters.read().clone()
    }

    // --- Factories & object types ---

    pub fn register_factory(
        &self,
        implementation: &str,
        constructor: ServiceConstructor,
        compatible_object_types: Vec<String>,
    ) -> Result<()> {
        self.factories
            .write()
            .register_factory(implementation, constructor, compatible_object_types)?;
        Ok(())
    }

    pub fn register_service<S: Service + Default>(&self, implementation: &str) -> Result<()> {
        self.factories.write().register::<S>(implementation)?;
        Ok(())
    }

    pub fn register_service_for<S: Service + Default>(&self, implementation: &str, object_types: &[&str]) -> Result<()> {
        self.factories
            .write()
            .register_with_types::<S>(implementation, object_types)?;
        Ok(())
    }

    pub fn implementations(&self) -> Vec<String> {
        self.factories.read().implementations()
    }

    pub(crate) fn compatible_object_types(&self, implementation: &str) -> Vec<String> {
        self.factories
            .read()
            .compatible_object_types(implementation)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    pub fn register_object_type(&self, type_name: &str, default_value: Value) -> Result<()> {
        self.object_types.write().register(type_name, default_value)?;
        Ok(())
    }

    pub fn object_types(&self) -> Vec<String> {
        self.object_types.read().names()
    }

    // --- Live instances ---

    pub fn has_uid(&self, uid: &str) -> bool {
        self.registry.lock().has_uid(uid)
    }

    /// A uid of the form `<base>-<n>` not used by any live instance.
    pub fn generate_uid(&self, base: &str) -> String {
        let stem = base.rsplit("::").next().unwrap_or(base).to_lowercase();
        loop {
            let n = self.next_uid.fetch_add(1, Ordering::Relaxed);
            let uid = format!("{}-{}", stem, n);
            if !self.has_uid(&uid) {
                return uid;
            }
        }
    }

    /// Instantiate `implementation` as a tracked, UNCONFIGURED component.
    pub fn create_service(&self, implementation: &str, uid: Option<&str>, worker: Option<&str>) -> Result<Arc<ServiceHandle>> {
        let service = self.factories.read().create(implementation)?;
        let uid = match uid {
            Some(uid) => uid.to_string(),
            None => self.generate_uid(implementation),
        };
        let worker = match worker {
            Some(name) => self.workers.get_or_spawn(name)?,
            None => self.workers.default_worker()?,
        };
        let handle = self.arena.allocate();
        let service = ServiceHandle::new(
            uid,
            implementation.to_string(),
            service,
            worker,
            handle,
            Arc::clone(&self.arena),
            self.self_ref.clone(),
        );
        if let Err(e) = self.registry.lock().track(Arc::clone(&service)) {
            self.arena.release(handle);
            return Err(e.into());
        }
        debug!("Created component '{}' ({})", service.uid(), implementation);
        Ok(service)
    }

    /// Force the component to STOPPED, untrack it and sever its connections.
    pub async fn destroy_service(&self, uid: &str) -> Result<()> {
        let service = self
            .get_service(uid)
            .ok_or_else(|| RegistryError::UnknownUid { uid: uid.to_string() })?;
        service.retire().await;
        self.registry.lock().untrack(uid);
        service.release();
        debug!("Destroyed component '{}'", uid);
        Ok(())
    }

    pub fn get_service(&self, uid: &str) -> Option<Arc<ServiceHandle>> {
        self.registry.lock().get(uid)
    }

    /// Live components in creation order.
    pub fn services(&self) -> Vec<Arc<ServiceHandle>> {
        self.registry.lock().services()
    }

    pub fn services_bound_to(&self, object_uid: &str) -> Vec<Arc<ServiceHandle>> {
        self.registry.lock().services_bound_to(object_uid)
    }

    /// Create and publish an object. `value` defaults to the type's initial value.
    pub fn create_object(&self, type_name: &str, uid: Option<&str>, value: Option<Value>) -> Result<Arc<Object>> {
        let initial = self.object_types.read().default_value(type_name)?;
        let uid = match uid {
            Some(uid) => uid.to_string(),
            None => self.generate_uid(type_name),
        };
        let object = Object::new(type_name, uid, value.unwrap_or(initial));
        self.register_object(&object)?;
        Ok(object)
    }

    /// Publish an object created elsewhere.
    pub fn register_object(&self, object: &Arc<Object>) -> Result<()> {
        self.registry.lock().register_object(object)?;
        debug!("Registered object '{}' ({})", object.uid(), object.type_name());
        self.object_registered.async_emit((object.uid().to_string(),));
        Ok(())
    }

    /// Withdraw an object from lookup; it is destroyed once its last owner drops it.
    pub fn release_object(&self, uid: &str) -> bool {
        let released = self.registry.lock().unregister_object(uid);
        if released {
            debug!("Released object '{}'", uid);
            self.object_released.async_emit((uid.to_string(),));
        }
        released
    }

    pub fn get_object(&self, uid: &str) -> Option<Arc<Object>> {
        self.registry.lock().get_object(uid)
    }

    // --- Configuration templates ---

    pub fn register_app_config(&self, id: &str, template: Value) -> Result<()> {
        let mut configs = self.app_configs.write();
        if configs.contains_key(id) {
            return Err(ConfigurationError::DuplicateConfig { id: id.to_string() }.into());
        }
        configs.insert(id.to_string(), template);
        debug!("Registered configuration '{}'", id);
        Ok(())
    }

    /// Register every configuration of a loaded document; returns their ids.
    pub fn register_document(&self, document: &ConfigDocument) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for template in &document.configs {
            let id = template
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| ConfigurationError::Malformed {
                    config: "<document>".to_string(),
                    message: "every configuration needs a string 'id'".to_string(),
                })?;
            self.register_app_config(id, template.clone())?;
            ids.push(id.to_string());
        }
        Ok(ids)
    }

    pub fn app_config_template(&self, id: &str) -> Result<Value> {
        self.app_configs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownConfig { id: id.to_string() }.into())
    }

    pub fn app_config_ids(&self) -> Vec<String> {
        self.app_configs.read().keys().cloned().collect()
    }

    /// Manager for configuration `id`, not yet created.
    pub fn app_config_manager(self: &Arc<Self>, id: &str) -> AppConfigManager {
        AppConfigManager::new(Arc::clone(self), id)
    }

    /// Destroy every remaining component, newest first, then stop the workers.
    pub async fn shutdown(&self) -> Result<()> {
        let services = self.services();
        if !services.is_empty() {
            warn!("Shutting down with {} live component(s)", services.len());
        }
        for service in services.into_iter().rev() {
            if let Err(e) = self.destroy_service(service.uid()).await {
                warn!("Failed to destroy component '{}' during shutdown: {}", service.uid(), e);
            }
        }
        self.workers.stop_all().await;
        info!("Context shut down");
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("workers", &self.workers)
            .field("factories", &*self.factories.read())
            .field("registry", &*self.registry.lock())
            .field("configs", &self.app_config_ids())
            .finish()
    }
}

#[async_trait]
impl KernelComponent for Context {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> Result<()> {
        self.workers.initialize().await
    }

    async fn start(&self) -> Result<()> {
        self.workers.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown().await.map_err(|e| Error::KernelLifecycleError {
            phase: KernelLifecyclePhase::Shutdown,
            component_name: Some(self.name.to_string()),
            message: "context shutdown failed".to_string(),
            source: Some(Box::new(e)),
        })
    }
}
