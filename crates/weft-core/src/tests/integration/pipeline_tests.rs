use serde_json::json;

use crate::app_config::loader::ConfigFormat;
use crate::service::handle::ServiceState;
use crate::service::tests::fixtures::Mixer;
use crate::tests::integration::common::{Doubler, context_from, drain};

const PIPELINE: &str = r#"{
    "context": { "workers": ["compute"] },
    "configs": [{
        "id": "pipeline",
        "objects": [
            { "uid": "source", "type": "Integer" },
            { "uid": "target", "type": "Integer" }
        ],
        "services": [{
            "uid": "doubler",
            "type": "test::Doubler",
            "worker": "compute",
            "auto_connect": true,
            "objects": [
                { "key": "source", "uid": "source", "access": "input" },
                { "key": "target", "uid": "target", "access": "inout" }
            ]
        }]
    }]
}"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_runs_on_its_worker() {
    let (context, ids) = context_from(PIPELINE, ConfigFormat::Json);
    assert_eq!(ids, vec!["pipeline"]);
    let mut manager = context.app_config_manager("pipeline");
    manager.launch().await.expect("launch");

    let doubler = manager.service("doubler").expect("doubler");
    assert_eq!(doubler.worker().name(), "compute");
    let source = manager.object("source").expect("source");
    let target = manager.object("target").expect("target");

    source.set_value(21).expect("set");
    drain(&context, "compute").await;
    assert_eq!(target.value::<i64>().expect("int"), 42);

    manager.stop().await.expect("stop");
    source.set_value(5).expect("set");
    drain(&context, "compute").await;
    assert_eq!(target.value::<i64>().expect("int"), 42, "stopped components do not react");
    let applied = doubler
        .with_service::<Doubler, _, _>(|doubler, _| doubler.applied)
        .expect("doubler");
    assert_eq!(applied, 1);

    manager.destroy().await.expect("destroy");
    context.shutdown().await.expect("shutdown");
}

#[cfg(feature = "yaml-config")]
#[tokio::test]
async fn test_yaml_document_drives_updates_through_connections() {
    let yaml = r#"
context:
  parameters:
    LABEL: counter
configs:
  - id: counting
    objects:
      - uid: trigger
        type: Boolean
      - uid: label
        type: String
        value: "%LABEL%"
    services:
      - uid: producer
        type: test::Producer
        objects:
          - key: result
            uid: total
            access: output
    connections:
      - channel: tick
        signals: [trigger.modified]
        slots: [producer.update]
"#;
    let (context, _) = context_from(yaml, ConfigFormat::Yaml);
    let mut manager = context.app_config_manager("counting");
    manager.launch().await.expect("launch");
    assert_eq!(manager.object("label").expect("label").raw_value(), json!("counter"));

    let total = context.get_object("total").expect("output");
    assert_eq!(total.value::<i64>().expect("int"), 1);
    let trigger = manager.object("trigger").expect("trigger");
    trigger.set_value(true).expect("set");
    trigger.set_value(false).expect("set");
    drain(&context, "main").await;
    assert_eq!(total.value::<i64>().expect("int"), 3);

    manager.stop_and_destroy().await.expect("teardown");
    assert!(context.get_object("total").is_none());
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_group_bindings_from_configuration() {
    let document = json!({
        "configs": [{
            "id": "mixing",
            "objects": [
                { "uid": "a", "type": "Float" },
                { "uid": "b", "type": "Float" }
            ],
            "services": [{
                "uid": "mixer",
                "type": "test::Mixer",
                "auto_connect": true,
                "groups": [{ "group": "sources", "access": "input", "uids": ["a", "b"] }]
            }]
        }]
    });
    let (context, _) = context_from(&document.to_string(), ConfigFormat::Json);
    let mut manager = context.app_config_manager("mixing");
    manager.launch().await.expect("launch");

    let mixer = manager.service("mixer").expect("mixer");
    assert_eq!(mixer.state(), ServiceState::Started);
    assert_eq!(mixer.key_connection_count("sources#0"), 1);
    manager.object("a").expect("a").set_value(0.5).expect("set");
    manager.object("b").expect("b").set_value(1.5).expect("set");
    drain(&context, "main").await;

    let (seen, mixes) = mixer
        .with_service::<Mixer, _, _>(|mixer, _| (mixer.seen.clone(), mixer.mixes))
        .expect("mixer");
    assert_eq!(seen, vec!["a", "b"]);
    assert_eq!(mixes, 2);

    manager.stop_and_destroy().await.expect("teardown");
    context.shutdown().await.expect("shutdown");
}
