use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::kernel::constants::{
    BOOLEAN_TYPE, COMPOSITE_TYPE, FLOAT_TYPE, INTEGER_TYPE, OBJECT_TYPE, STRING_TYPE,
};
use crate::registry::error::RegistryError;
use crate::service::traits::Service;

pub type ServiceConstructor = Arc<dyn Fn() -> Box<dyn Service> + Send + Sync>;

struct FactoryEntry {
    constructor: ServiceConstructor,
    compatible_object_types: Vec<String>,
}

/// Explicit table of component constructors keyed by implementation id.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: BTreeMap<String, FactoryEntry>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty `compatible_object_types` accepts objects of any type.
    pub fn register_factory(
        &mut self,
        implementation: &str,
        constructor: ServiceConstructor,
        compatible_object_types: Vec<String>,
    ) -> Result<(), RegistryError> {
        if self.factories.contains_key(implementation) {
            return Err(RegistryError::DuplicateFactory {
                implementation: implementation.to_string(),
            });
        }
        self.factories.insert(
            implementation.to_string(),
            FactoryEntry {
                constructor,
                compatible_object_types,
            },
        );
        debug!("Registered factory '{}'", implementation);
        Ok(())
    }

    pub fn register<S: Service + Default>(&mut self, implementation: &str) -> Result<(), RegistryError> {
        self.register_with_types::<S>(implementation, &[])
    }

    pub fn register_with_types<S: Service + Default>(
        &mut self,
        implementation: &str,
        object_types: &[&str],
    ) -> Result<(), RegistryError> {
        self.register_factory(
            implementation,
            Arc::new(|| Box::new(S::default()) as Box<dyn Service>),
            object_types.iter().map(|t| t.to_string()).collect(),
        )
    }

    pub fn create(&self, implementation: &str) -> Result<Box<dyn Service>, RegistryError> {
        let entry = self
            .factories
            .get(implementation)
            .ok_or_else(|| RegistryError::UnknownImplementation {
                implementation: implementation.to_string(),
            })?;
        Ok((entry.constructor)())
    }

    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }

    pub fn implementations(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn compatible_object_types(&self, implementation: &str) -> Option<&[String]> {
        self.factories
            .get(implementation)
            .map(|e| e.compatible_object_types.as_slice())
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

/// Object type names and the value a new instance starts with.
#[derive(Debug, Clone)]
pub struct ObjectTypeRegistry {
    types: BTreeMap<String, Value>,
}

impl Default for ObjectTypeRegistry {
    fn default() -> Self {
        let mut types = BTreeMap::new();
        types.insert(OBJECT_TYPE.to_string(), Value::Null);
        types.insert(INTEGER_TYPE.to_string(), Value::from(0));
        types.insert(FLOAT_TYPE.to_string(), Value::from(0.0));
        types.insert(STRING_TYPE.to_string(), Value::from(""));
        types.insert(BOOLEAN_TYPE.to_string(), Value::from(false));
        types.insert(COMPOSITE_TYPE.to_string(), Value::Object(Default::default()));
        Self { types }
    }
}

impl ObjectTypeRegistry {
    pub fn register(&mut self, type_name: &str, default_value: Value) -> Result<(), RegistryError> {
        if self.types.contains_key(type_name) {
            return Err(RegistryError::DuplicateObjectType {
                type_name: type_name.to_string(),
            });
        }
        self.types.insert(type_name.to_string(), default_value);
        Ok(())
    }

    pub fn default_value(&self, type_name: &str) -> Result<Value, RegistryError> {
        self.types
            .get(type_name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownObjectType {
                type_name: type_name.to_string(),
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}
