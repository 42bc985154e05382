use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::com::signal::{HasSignals, Signal};
use crate::com::signature::SignalArgs;
use crate::data::object::Object;
use crate::kernel::context::Context;
use crate::kernel::error::{Error, Result};
use crate::service::error::LifecycleError;
use crate::service::keys::{Access, Bindings, ObjectBinding};

/// Notification signals every component carries.
#[derive(Clone)]
pub(crate) struct Notifier {
    pub(crate) info: Signal<(String,)>,
    pub(crate) success: Signal<(String,)>,
    pub(crate) failure: Signal<(String,)>,
}

/// What a component's hooks and method slots see of the framework: its
/// parameters, its bound objects, its own signals and the owning context.
pub struct ServiceContext {
    uid: String,
    params: Value,
    bindings: Arc<RwLock<Bindings>>,
    outputs: Arc<Mutex<BTreeMap<String, Arc<Object>>>>,
    signals: Arc<HasSignals>,
    notifier: Notifier,
    context: Weak<Context>,
}

impl ServiceContext {
    pub(crate) fn new(
        uid: String,
        bindings: Arc<RwLock<Bindings>>,
        outputs: Arc<Mutex<BTreeMap<String, Arc<Object>>>>,
        signals: Arc<HasSignals>,
        notifier: Notifier,
        context: Weak<Context>,
    ) -> Self {
        Self {
            uid,
            params: Value::Null,
            bindings,
            outputs,
            signals,
            notifier,
            context,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: Value) {
        self.params = params;
    }

    pub fn param<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.params
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn param_or<T: DeserializeOwned>(&self, name: &str, default: T) -> T {
        self.param(name).unwrap_or(default)
    }

    /// Deserialize the whole parameter tree; absent parameters read as `{}`.
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T> {
        let params = match &self.params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        Ok(serde_json::from_value(params)?)
    }

    /// Object currently bound to `key`, whatever its access.
    pub fn object(&self, key: &str) -> Option<Arc<Object>> {
        self.bindings.read().object(key)
    }

    pub fn input(&self, key: &str) -> Result<Arc<Object>> {
        self.bound(key, Access::Input)
    }

    pub fn inout(&self, key: &str) -> Result<Arc<Object>> {
        self.bound(key, Access::Inout)
    }

    fn bound(&self, key: &str, access: Access) -> Result<Arc<Object>> {
        let bindings = self.bindings.read();
        bindings
            .get(key)
            .filter(|b| b.access == access)
            .and_then(|b| b.object.clone())
            .ok_or_else(|| {
                LifecycleError::UnknownKey {
                    uid: self.uid.clone(),
                    key: key.to_string(),
                }
                .into()
            })
    }

    /// Objects bound to the members of `group`, in index order.
    pub fn group(&self, group: &str) -> Vec<Arc<Object>> {
        self.bindings
            .read()
            .group(group)
            .into_iter()
            .filter_map(|(_, b)| b.object.clone())
            .collect()
    }

    /// Produce the object for output `key` and publish it under the uid
    /// declared for that key (or `<component uid>-<key>` when undeclared).
    /// Replaces any object previously produced for the key.
    pub fn create_output(&mut self, key: &str, type_name: &str, value: Option<Value>) -> Result<Arc<Object>> {
        let context = self.context()?;
        self.clear_output(key);
        let uid = self
            .bindings
            .read()
            .get(key)
            .filter(|b| b.access == Access::Output)
            .map(|b| b.uid.clone())
            .unwrap_or_else(|| format!("{}-{}", self.uid, key));
        let object = context.create_object(type_name, Some(&uid), value)?;
        {
            let mut bindings = self.bindings.write();
            match bindings.get_mut(key) {
                Some(binding) => binding.object = Some(Arc::clone(&object)),
                None => {
                    let mut binding = ObjectBinding::output(uid.clone());
                    binding.object = Some(Arc::clone(&object));
                    bindings.insert(key, binding);
                }
            }
        }
        self.outputs.lock().insert(key.to_string(), Arc::clone(&object));
        debug!("Component '{}' produced output '{}' as '{}'", self.uid, key, uid);
        Ok(object)
    }

    pub fn output(&self, key: &str) -> Option<Arc<Object>> {
        self.outputs.lock().get(key).cloned()
    }

    /// Withdraw the object produced for `key`; returns whether there was one.
    pub fn clear_output(&mut self, key: &str) -> bool {
        let Some(object) = self.outputs.lock().remove(key) else {
            return false;
        };
        if let Some(binding) = self.bindings.write().get_mut(key) {
            binding.object = None;
        }
        if let Some(context) = self.context.upgrade() {
            context.release_object(object.uid());
        }
        true
    }

    /// Typed handle to one of this component's signals.
    pub fn signal<A: SignalArgs>(&self, name: &str) -> Option<Signal<A>> {
        self.signals.typed(name)
    }

    pub fn context(&self) -> Result<Arc<Context>> {
        self.context
            .upgrade()
            .ok_or_else(|| Error::Other(format!("context of component '{}' has been dropped", self.uid)))
    }

    pub fn notify_info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("[{}] {}", self.uid, message);
        self.notifier.info.async_emit((message,));
    }

    pub fn notify_success(&self, message: impl Into<String>) {
        let message = message.into();
        info!("[{}] {}", self.uid, message);
        self.notifier.success.async_emit((message,));
    }

    pub fn notify_failure(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", self.uid, message);
        self.notifier.failure.async_emit((message,));
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("uid", &self.uid)
            .field("params", &self.params)
            .field("bindings", &self.bindings.read().keys())
            .finish()
    }
}
