use std::sync::atomic::Ordering;

use serde_json::json;

use crate::app_config::error::ConfigurationError;
use crate::app_config::launcher::ConfigLauncher;
use crate::app_config::manager::ManagerState;
use crate::kernel::constants::CONFIG_LAUNCHER;
use crate::kernel::context::Context;
use crate::kernel::error::Error;
use crate::service::handle::ServiceState;
use crate::service::tests::fixtures::{register_recorder, register_viewer, settle};

fn register_inner(context: &Context) {
    context
        .register_app_config(
            "inner",
            json!({
                "id": "inner",
                "parameters": [{ "name": "START", "default": "0" }],
                "objects": [{ "uid": "img1", "type": "Integer", "value": "%START%" }],
                "services": [
                    {
                        "uid": "viewer",
                        "type": "test::Viewer",
                        "auto_connect": true,
                        "objects": [{ "key": "image", "uid": "img1", "access": "inout" }]
                    },
                    { "uid": "recorder", "type": "test::Recorder" }
                ],
                "update": ["recorder"]
            }),
        )
        .expect("register inner");
}

fn register_outer(context: &Context, inner: &str) {
    context
        .register_app_config(
            "outer",
            json!({
                "id": "outer",
                "services": [{
                    "uid": "launcher",
                    "type": CONFIG_LAUNCHER,
                    "config": { "config": inner, "prefix": "nested", "parameters": { "START": "7" } }
                }]
            }),
        )
        .expect("register outer");
}

#[tokio::test]
async fn test_launcher_runs_nested_configuration_while_started() {
    let context = Context::new().expect("context");
    let journal = register_recorder(&context);
    let (refreshes, _) = register_viewer(&context, &[]);
    register_inner(&context);
    register_outer(&context, "inner");

    let mut outer = context.app_config_manager("outer");
    outer.launch().await.expect("launch outer");

    let img1 = context.get_object("nested_img1").expect("nested object published");
    assert_eq!(img1.raw_value(), json!("7"));
    assert!(context.get_service("nested_viewer").is_some());
    assert_eq!(
        context.get_service("nested_recorder").map(|p| p.state()),
        Some(ServiceState::Started)
    );
    assert_eq!(*journal.lock(), vec!["configuring", "starting", "updating"]);

    let launcher = outer.service("launcher").expect("launcher");
    let nested_state = launcher
        .with_service::<ConfigLauncher, _, _>(|launcher, _| launcher.manager().map(|m| m.state()))
        .expect("launcher access");
    assert_eq!(nested_state, Some(ManagerState::Started));

    img1.set_value(8).expect("set");
    settle(&context).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    launcher.update().await.expect("update forwards to the nested graph");
    assert_eq!(journal.lock().iter().filter(|h| *h == "updating").count(), 2);

    outer.stop_and_destroy().await.expect("teardown");
    assert!(!context.has_uid("nested_img1"));
    assert!(!context.has_uid("nested_viewer"));
    assert!(!context.has_uid("nested_recorder"));
    assert!(context.services().is_empty());
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_launcher_hides_context_parameters() {
    let context = Context::new().expect("context");
    context.set_parameter("TITLE", "outside");
    context
        .register_app_config(
            "inner",
            json!({ "id": "inner", "objects": [{ "uid": "label", "type": "String", "value": "%TITLE%" }] }),
        )
        .expect("register inner");
    register_outer(&context, "inner");

    let mut outer = context.app_config_manager("outer");
    outer.create().await.expect("create");
    outer.start().await.expect("a failing child component does not abort the start");
    let launcher = outer.service("launcher").expect("launcher");
    assert_eq!(launcher.state(), ServiceState::Configured);
    assert!(!context.has_uid("nested_label"));

    outer.stop_and_destroy().await.expect("teardown");
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_launcher_rejects_unknown_configuration() {
    let context = Context::new().expect("context");
    register_outer(&context, "absent");

    let mut outer = context.app_config_manager("outer");
    let err = outer.create().await.expect_err("unknown nested configuration");
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::ServiceConfiguration { ref uid, .. }) if uid == "launcher"
    ));
    assert_eq!(outer.state(), ManagerState::Destroyed);
    assert!(context.services().is_empty());
    context.shutdown().await.expect("shutdown");
}
