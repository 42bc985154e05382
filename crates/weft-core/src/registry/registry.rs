use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::data::object::Object;
use crate::registry::error::RegistryError;
use crate::service::handle::ServiceHandle;

/// Live components (in creation order) and published objects.
///
/// Objects are tracked weakly: the registry never keeps one alive.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<ServiceHandle>>,
    objects: BTreeMap<String, Weak<Object>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, service: Arc<ServiceHandle>) -> Result<(), RegistryError> {
        if self.has_uid(service.uid()) {
            return Err(RegistryError::DuplicateUid {
                uid: service.uid().to_string(),
            });
        }
        self.services.push(service);
        Ok(())
    }

    pub fn untrack(&mut self, uid: &str) -> Option<Arc<ServiceHandle>> {
        let pos = self.services.iter().position(|s| s.uid() == uid)?;
        Some(self.services.remove(pos))
    }

    pub fn get(&self, uid: &str) -> Option<Arc<ServiceHandle>> {
        self.services.iter().find(|s| s.uid() == uid).cloned()
    }

    pub fn services(&self) -> Vec<Arc<ServiceHandle>> {
        self.services.clone()
    }

    /// Components holding a binding on object `object_uid`.
    pub fn services_bound_to(&self, object_uid: &str) -> Vec<Arc<ServiceHandle>> {
        self.services
            .iter()
            .filter(|s| s.is_bound_to(object_uid))
            .cloned()
            .collect()
    }

    pub fn register_object(&mut self, object: &Arc<Object>) -> Result<(), RegistryError> {
        self.objects.retain(|_, weak| weak.strong_count() > 0);
        if self.has_uid(object.uid()) {
            return Err(RegistryError::DuplicateUid {
                uid: object.uid().to_string(),
            });
        }
        self.objects
            .insert(object.uid().to_string(), Arc::downgrade(object));
        Ok(())
    }

    pub fn unregister_object(&mut self, uid: &str) -> bool {
        self.objects.remove(uid).is_some()
    }

    pub fn get_object(&self, uid: &str) -> Option<Arc<Object>> {
        self.objects.get(uid).and_then(Weak::upgrade)
    }

    pub fn object_uids(&self) -> Vec<String> {
        self.objects
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    pub fn has_uid(&self, uid: &str) -> bool {
        self.services.iter().any(|s| s.uid() == uid) || self.get_object(uid).is_some()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.iter().map(|s| s.uid()).collect::<Vec<_>>())
            .field("objects", &self.object_uids())
            .finish()
    }
}
