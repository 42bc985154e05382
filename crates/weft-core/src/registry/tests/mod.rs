#[cfg(test)]
mod factory_tests;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::data::object::Object;
    use crate::registry::error::RegistryError;
    use crate::registry::registry::ServiceRegistry;

    #[test]
    fn test_objects_are_tracked_weakly() {
        let mut registry = ServiceRegistry::new();
        let object = Object::new("Integer", "n", json!(1));
        registry.register_object(&object).expect("register");
        assert!(registry.has_uid("n"));
        assert_eq!(registry.object_uids(), vec!["n"]);

        drop(object);
        assert!(registry.get_object("n").is_none());
        assert!(!registry.has_uid("n"));

        // The stale entry does not block reuse of the uid.
        let replacement = Object::new("Integer", "n", json!(2));
        registry.register_object(&replacement).expect("re-register");
        assert_eq!(registry.get_object("n").expect("live").raw_value(), json!(2));
    }

    #[test]
    fn test_duplicate_object_uid_is_rejected() {
        let mut registry = ServiceRegistry::new();
        let first = Object::new("Integer", "n", json!(1));
        let second = Object::new("Float", "n", json!(1.0));
        registry.register_object(&first).expect("register");
        let err = registry.register_object(&second).expect_err("duplicate");
        assert!(matches!(err, RegistryError::DuplicateUid { uid } if uid == "n"));
        assert!(registry.unregister_object("n"));
        assert!(!registry.unregister_object("n"));
        assert!(registry.is_empty());
    }
}
