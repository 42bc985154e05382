// Component test module
#[cfg(test)]
mod binding_tests;

#[cfg(test)]
mod tests {
    use crate::service::keys::{Access, AutoConnections, Bindings, KeyDecl, ObjectBinding, group_key, split_group_key};
    use crate::data::object::Object;
    use serde_json::json;

    #[test]
    fn test_group_key_round_trip() {
        assert_eq!(group_key("sources", 2), "sources#2");
        assert_eq!(split_group_key("sources#2"), Some(("sources", 2)));
        assert_eq!(split_group_key("sources"), None);
        assert_eq!(split_group_key("sources#x"), None);
    }

    #[test]
    fn test_key_decl_matches_group_members() {
        let plain = KeyDecl::inout("image");
        assert!(plain.matches("image"));
        assert!(!plain.matches("image#0"));

        let group = KeyDecl::input("sources").group();
        assert!(group.matches("sources#0"));
        assert!(group.matches("sources#12"));
        assert!(!group.matches("sources"));
    }

    #[test]
    fn test_access_parses_short_aliases() {
        assert_eq!(serde_json::from_value::<Access>(json!("in")).expect("alias"), Access::Input);
        assert_eq!(serde_json::from_value::<Access>(json!("out")).expect("alias"), Access::Output);
        assert_eq!(serde_json::from_value::<Access>(json!("inout")).expect("name"), Access::Inout);
        assert!(serde_json::from_value::<Access>(json!("readwrite")).is_err());
        assert_eq!(Access::Inout.to_string(), "inout");
    }

    #[test]
    fn test_auto_connections_fall_back_to_group_entry() {
        let table = AutoConnections::new()
            .with("sources", "modified", "mix")
            .with("sources#1", "field_changed", "relink");
        assert_eq!(table.for_key("sources#0"), &[("modified".to_string(), "mix".to_string())]);
        assert_eq!(table.for_key("sources#1"), &[("field_changed".to_string(), "relink".to_string())]);
        assert!(table.for_key("other").is_empty());
    }

    #[test]
    fn test_bindings_group_is_sorted_by_index() {
        let mut bindings = Bindings::default();
        for index in [10, 2, 0] {
            let object = Object::new("Integer", format!("n{index}"), json!(index));
            bindings.insert(group_key("sources", index), ObjectBinding::new(Access::Input, object));
        }
        bindings.insert("target", ObjectBinding::output("result"));
        let order: Vec<&str> = bindings.group("sources").into_iter().map(|(key, _)| key).collect();
        assert_eq!(order, vec!["sources#0", "sources#2", "sources#10"]);
        assert!(bindings.is_bound_to("n2"));
        assert!(!bindings.is_bound_to("result"), "an unproduced output binds nothing");
        bindings.clear_objects();
        assert!(!bindings.is_bound_to("n2"));
        assert_eq!(bindings.len(), 4);
    }
}
