// Configuration graph test module
#[cfg(test)]
mod launcher_tests;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::app_config::error::ConfigurationError;
    use crate::app_config::node::AppConfig;
    use crate::app_config::params::substitute;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_substitute_replaces_tokens_everywhere() {
        let template = json!({
            "path": "%ROOT%/images/%NAME%.png",
            "list": ["%NAME%", 3, true],
            "nested": { "label": "%NAME%" }
        });
        let out = substitute(&template, &params(&[("ROOT", "/data"), ("NAME", "cat")]), "main").expect("substitute");
        assert_eq!(
            out,
            json!({
                "path": "/data/images/cat.png",
                "list": ["cat", 3, true],
                "nested": { "label": "cat" }
            })
        );
    }

    #[test]
    fn test_stray_percent_signs_are_kept() {
        let template = json!(["100%", "50% of %", "%not a token%", "%%"]);
        let out = substitute(&template, &params(&[]), "main").expect("substitute");
        assert_eq!(out, template);
    }

    #[test]
    fn test_missing_parameter_reports_location() {
        let template = json!({ "services": [{ "config": { "path": "%ROOT%" } }] });
        let err = substitute(&template, &params(&[]), "main").expect_err("ROOT is unset");
        match err {
            ConfigurationError::UnresolvedParameter { name, location } => {
                assert_eq!(name, "ROOT");
                assert!(location.contains("main"));
                assert!(location.contains("$.services[0].config.path"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_declared_uids_cover_objects_components_and_outputs() {
        let config: AppConfig = serde_json::from_value(json!({
            "id": "main",
            "objects": [{ "uid": "img", "type": "Integer" }],
            "services": [
                {
                    "uid": "producer",
                    "type": "test::Producer",
                    "objects": [{ "key": "result", "uid": "total", "access": "out" }]
                },
                { "type": "test::Recorder" }
            ]
        }))
        .expect("config");
        assert_eq!(config.declared_uids(), vec!["img", "producer", "total"]);
        assert!(config.start.is_none());
    }

    #[test]
    fn test_unknown_config_fields_are_rejected() {
        let result = serde_json::from_value::<AppConfig>(json!({ "id": "main", "servcies": [] }));
        assert!(result.is_err());
    }
}
