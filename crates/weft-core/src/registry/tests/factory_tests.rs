use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::kernel::error::Result;
use crate::registry::error::RegistryError;
use crate::registry::factory::{FactoryRegistry, ObjectTypeRegistry};
use crate::service::context::ServiceContext;
use crate::service::traits::Service;

#[derive(Debug, Default)]
struct Idle {
    label: &'static str,
}

#[async_trait]
impl Service for Idle {
    async fn starting(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }

    async fn updating(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }

    async fn stopping(&mut self, _ctx: &mut ServiceContext) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_register_and_create() {
    let mut factories = FactoryRegistry::new();
    factories.register::<Idle>("test::Idle").expect("register");
    assert!(factories.contains("test::Idle"));
    assert_eq!(factories.implementations(), vec!["test::Idle"]);

    let service = factories.create("test::Idle").expect("create");
    let idle = (*service).as_any().downcast_ref::<Idle>().expect("concrete type");
    assert_eq!(idle.label, "");
}

#[test]
fn test_duplicate_factory_is_rejected() {
    let mut factories = FactoryRegistry::new();
    factories.register::<Idle>("test::Idle").expect("register");
    let err = factories
        .register_factory(
            "test::Idle",
            Arc::new(|| Box::new(Idle { label: "other" }) as Box<dyn Service>),
            Vec::new(),
        )
        .expect_err("duplicate");
    assert!(matches!(err, RegistryError::DuplicateFactory { implementation } if implementation == "test::Idle"));

    // The first registration is kept.
    let service = factories.create("test::Idle").expect("create");
    assert_eq!((*service).as_any().downcast_ref::<Idle>().map(|i| i.label), Some(""));
}

#[test]
fn test_unknown_implementation() {
    let factories = FactoryRegistry::new();
    assert!(matches!(
        factories.create("test::Missing"),
        Err(RegistryError::UnknownImplementation { .. })
    ));
    assert!(factories.compatible_object_types("test::Missing").is_none());
}

#[test]
fn test_compatible_object_types() {
    let mut factories = FactoryRegistry::new();
    factories.register::<Idle>("test::Any").expect("register");
    factories
        .register_with_types::<Idle>("test::Numeric", &["Integer", "Float"])
        .expect("register");
    assert_eq!(factories.compatible_object_types("test::Any"), Some(&[][..]));
    assert_eq!(
        factories.compatible_object_types("test::Numeric").map(<[String]>::to_vec),
        Some(vec!["Integer".to_string(), "Float".to_string()])
    );
}

#[test]
fn test_builtin_object_types_and_defaults() {
    let mut types = ObjectTypeRegistry::default();
    for name in ["Object", "Integer", "Float", "String", "Boolean", "Composite"] {
        assert!(types.contains(name), "missing builtin type {name}");
    }
    assert_eq!(types.default_value("Integer").expect("known"), json!(0));
    assert_eq!(types.default_value("Composite").expect("known"), json!({}));
    assert_eq!(types.default_value("Object").expect("known"), Value::Null);

    types.register("Image", json!({ "width": 0, "height": 0 })).expect("register");
    assert!(matches!(
        types.register("Image", Value::Null),
        Err(RegistryError::DuplicateObjectType { .. })
    ));
    assert!(matches!(
        types.default_value("Mesh"),
        Err(RegistryError::UnknownObjectType { .. })
    ));
}
