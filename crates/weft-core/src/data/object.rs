use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::trace;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::com::signal::{HasSignals, Signal};
use crate::kernel::error::Result;

pub const MODIFIED_SIG: &str = "modified";
pub const FIELD_CHANGED_SIG: &str = "field_changed";

/// Identified, reference-counted data holder.
///
/// The payload is a JSON value plus named child objects. Every setter
/// emits `modified` asynchronously; field setters also emit
/// `field_changed` with the field name.
pub struct Object {
    uid: String,
    type_name: String,
    value: RwLock<Value>,
    fields: RwLock<BTreeMap<String, Arc<Object>>>,
    signals: HasSignals,
    modified: Signal<()>,
    field_changed: Signal<(String,)>,
}

impl Object {
    pub fn new(type_name: impl Into<String>, uid: impl Into<String>, value: Value) -> Arc<Self> {
        let mut signals = HasSignals::new();
        let modified = signals.create::<()>(MODIFIED_SIG);
        let field_changed = signals.create::<(String,)>(FIELD_CHANGED_SIG);
        Arc::new(Self {
            uid: uid.into(),
            type_name: type_name.into(),
            value: RwLock::new(value),
            fields: RwLock::new(BTreeMap::new()),
            signals,
            modified,
            field_changed,
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn signals(&self) -> &HasSignals {
        &self.signals
    }

    pub fn modified(&self) -> &Signal<()> {
        &self.modified
    }

    pub fn field_changed(&self) -> &Signal<(String,)> {
        &self.field_changed
    }

    pub fn value<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.value.read().clone();
        Ok(serde_json::from_value(value)?)
    }

    pub fn raw_value(&self) -> Value {
        self.value.read().clone()
    }

    pub fn set_value<T: Serialize>(&self, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        *self.value.write() = value;
        self.notify_modified();
        Ok(())
    }

    /// Mutate the payload in place, then notify.
    pub fn update_value<F>(&self, f: F)
    where
        F: FnOnce(&mut Value),
    {
        f(&mut self.value.write());
        self.notify_modified();
    }

    /// Emit `modified`; returns the number of queued deliveries.
    pub fn notify_modified(&self) -> usize {
        let queued = self.modified.async_emit(());
        trace!("Object '{}' modified ({} listener(s))", self.uid, queued);
        queued
    }

    pub fn set_field(&self, name: impl Into<String>, object: Arc<Object>) {
        let name = name.into();
        self.fields.write().insert(name.clone(), object);
        self.field_changed.async_emit((name,));
        self.notify_modified();
    }

    pub fn field(&self, name: &str) -> Option<Arc<Object>> {
        self.fields.read().get(name).cloned()
    }

    pub fn remove_field(&self, name: &str) -> Option<Arc<Object>> {
        let removed = self.fields.write().remove(name);
        if removed.is_some() {
            self.field_changed.async_emit((name.to_string(),));
            self.notify_modified();
        }
        removed
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.read().keys().cloned().collect()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("uid", &self.uid)
            .field("type", &self.type_name)
            .field("value", &*self.value.read())
            .field("fields", &self.field_names())
            .finish()
    }
}
