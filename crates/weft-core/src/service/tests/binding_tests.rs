use std::sync::atomic::Ordering;

use serde_json::json;

use crate::app_config::error::ConfigurationError;
use crate::com::slot::Slot;
use crate::data::object::Object;
use crate::kernel::context::Context;
use crate::kernel::error::Error;
use crate::service::error::LifecycleError;
use crate::service::handle::ServiceState;
use crate::service::keys::{Access, ObjectBinding, group_key};

use super::fixtures::{MIXER, Mixer, PRODUCER, Producer, VIEWER, register_viewer, settle};

#[tokio::test]
async fn test_missing_required_key_fails_configure() {
    let context = Context::new().expect("context");
    register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, Some("viewer"), None).expect("create");

    let err = viewer.configure(json!({})).await.expect_err("image is required");
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::MissingRequiredKey { ref key, .. }) if key == "image"
    ));
    assert_eq!(viewer.state(), ServiceState::Unconfigured);
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_access_mismatch_fails_configure() {
    let context = Context::new().expect("context");
    register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let image = context.create_object("Integer", Some("img"), None).expect("object");

    viewer
        .bind("image", ObjectBinding::new(Access::Input, image))
        .expect("bind");
    let err = viewer.configure(json!({})).await.expect_err("declared inout");
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::AccessMismatch {
            declared: Access::Inout,
            bound: Access::Input,
            ..
        })
    ));
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_incompatible_object_type_fails_configure() {
    let context = Context::new().expect("context");
    context
        .register_object_type("Image", json!({ "pixels": [] }))
        .expect("object type");
    register_viewer(&context, &["Image"]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let number = context.create_object("Integer", Some("n"), None).expect("object");

    viewer.bind("image", ObjectBinding::new(Access::Inout, number)).expect("bind");
    let err = viewer.configure(json!({})).await.expect_err("wrong type");
    assert!(matches!(
        err,
        Error::Configuration(ConfigurationError::IncompatibleObject { ref object_type, .. }) if object_type == "Integer"
    ));

    let image = context.create_object("Image", Some("img"), None).expect("object");
    assert_eq!(image.raw_value(), json!({ "pixels": [] }));
    viewer.bind("image", ObjectBinding::new(Access::Inout, image)).expect("rebind");
    viewer.configure(json!({})).await.expect("compatible now");
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_auto_connections_follow_start_and_stop() {
    let context = Context::new().expect("context");
    let (refreshes, _) = register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, Some("viewer"), None).expect("create");
    let img1 = context.create_object("Integer", Some("img1"), None).expect("object");

    viewer
        .bind("image", ObjectBinding::new(Access::Inout, img1.clone()).with_auto_connect(true))
        .expect("bind");
    viewer.configure(json!({})).await.expect("configure");
    assert_eq!(img1.modified().num_connections(), 0, "connections wait for start");

    viewer.start().await.expect("start");
    assert_eq!(viewer.key_connection_count("image"), 1);
    assert_eq!(img1.modified().num_connections(), 1);

    img1.set_value(5).expect("set");
    settle(&context).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    viewer.stop().await.expect("stop");
    assert_eq!(img1.modified().num_connections(), 0);
    img1.set_value(6).expect("set");
    settle(&context).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 1, "no refresh after stop");
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_component_flag_and_binding_override() {
    let context = Context::new().expect("context");
    register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let image = context.create_object("Integer", Some("image"), None).expect("object");
    let overlay = context.create_object("Integer", Some("overlay"), None).expect("object");

    viewer.set_auto_connect(true);
    viewer.bind("image", ObjectBinding::new(Access::Inout, image.clone())).expect("bind");
    viewer
        .bind("overlay", ObjectBinding::new(Access::Input, overlay.clone()).with_auto_connect(false))
        .expect("bind");
    viewer.configure(json!({})).await.expect("configure");
    viewer.start().await.expect("start");

    assert_eq!(image.modified().num_connections(), 1);
    assert_eq!(overlay.modified().num_connections(), 0, "binding opted out");
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_swap_moves_only_that_keys_connections() {
    let context = Context::new().expect("context");
    let (refreshes, swaps) = register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let first = context.create_object("Integer", Some("first"), None).expect("object");
    let second = context.create_object("Integer", Some("second"), None).expect("object");
    let overlay = context.create_object("Integer", Some("overlay"), None).expect("object");

    viewer.set_auto_connect(true);
    viewer.bind("image", ObjectBinding::new(Access::Inout, first.clone())).expect("bind");
    viewer.bind("overlay", ObjectBinding::new(Access::Input, overlay.clone())).expect("bind");
    viewer.configure(json!({})).await.expect("configure");
    viewer.start().await.expect("start");
    let overlay_connections = overlay.modified().num_connections();
    assert_eq!(overlay_connections, 1);

    viewer.swap_key("image", Some(second.clone())).await.expect("swap");
    assert_eq!(first.modified().num_connections(), 0);
    assert_eq!(second.modified().num_connections(), 1);
    assert_eq!(overlay.modified().num_connections(), overlay_connections);
    assert_eq!(viewer.bound_object("image").map(|o| o.uid().to_string()), Some("second".to_string()));
    assert_eq!(*swaps.lock(), vec!["image"]);

    first.set_value(1).expect("set");
    second.set_value(2).expect("set");
    settle(&context).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 1, "only the new image refreshes");
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_swap_requires_started_and_known_key() {
    let context = Context::new().expect("context");
    register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let image = context.create_object("Integer", Some("image"), None).expect("object");
    viewer.bind("image", ObjectBinding::new(Access::Inout, image.clone())).expect("bind");
    viewer.configure(json!({})).await.expect("configure");

    assert!(matches!(
        viewer.swap_key("image", Some(image.clone())).await,
        Err(Error::Lifecycle(LifecycleError::InvalidState { .. }))
    ));
    viewer.start().await.expect("start");
    assert!(matches!(
        viewer.swap_key("thumbnail", None).await,
        Err(Error::Lifecycle(LifecycleError::UnknownKey { .. }))
    ));
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_bind_is_refused_once_started() {
    let context = Context::new().expect("context");
    register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let image = context.create_object("Integer", Some("image"), None).expect("object");
    viewer.bind("image", ObjectBinding::new(Access::Inout, image.clone())).expect("bind");
    viewer.configure(json!({})).await.expect("configure");
    viewer.start().await.expect("start");

    assert!(viewer.bind("image", ObjectBinding::new(Access::Inout, image)).is_err());
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_group_members_bind_and_auto_connect() {
    let context = Context::new().expect("context");
    context.register_service::<Mixer>(MIXER).expect("register");
    let mixer = context.create_service(MIXER, None, None).expect("create");
    let mut sources = Vec::new();
    for (index, uid) in ["low", "mid", "high"].into_iter().enumerate() {
        let object = context.create_object("Float", Some(uid), None).expect("object");
        mixer
            .bind(&group_key("sources", index), ObjectBinding::new(Access::Input, object.clone()))
            .expect("bind");
        sources.push(object);
    }
    mixer.set_auto_connect(true);
    mixer.configure(json!({})).await.expect("configure");
    mixer.start().await.expect("start");

    let seen = mixer.with_service::<Mixer, _, _>(|m, _| m.seen.clone()).expect("mixer");
    assert_eq!(seen, vec!["low", "mid", "high"]);
    assert_eq!(mixer.key_connection_count("sources#1"), 1);

    for source in &sources {
        source.set_value(1.0).expect("set");
    }
    settle(&context).await;
    let mixes = mixer.with_service::<Mixer, _, _>(|m, _| m.mixes).expect("mixer");
    assert_eq!(mixes, 3);
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_group_requires_at_least_one_member() {
    let context = Context::new().expect("context");
    context.register_service::<Mixer>(MIXER).expect("register");
    let mixer = context.create_service(MIXER, None, None).expect("create");
    assert!(mixer.configure(json!({})).await.is_err());
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_output_is_published_while_started() {
    let context = Context::new().expect("context");
    context.register_service::<Producer>(PRODUCER).expect("register");
    let producer = context.create_service(PRODUCER, Some("producer"), None).expect("create");
    producer.bind("result", ObjectBinding::output("total")).expect("bind");
    producer.configure(json!({})).await.expect("configure");
    assert!(context.get_object("total").is_none());

    producer.start().await.expect("start");
    let total = context.get_object("total").expect("published");
    assert_eq!(total.value::<i64>().expect("int"), 1);
    producer.update().await.expect("update");
    assert_eq!(total.value::<i64>().expect("int"), 2);
    assert_eq!(producer.output("result").map(|o| o.uid().to_string()), Some("total".to_string()));

    producer.stop().await.expect("stop");
    assert!(context.get_object("total").is_none());
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_undeclared_output_uses_generated_uid() {
    let context = Context::new().expect("context");
    context.register_service::<Producer>(PRODUCER).expect("register");
    let producer = context.create_service(PRODUCER, Some("producer"), None).expect("create");
    producer.configure(json!({})).await.expect("output keys are optional");
    producer.start().await.expect("start");
    assert!(context.get_object("producer-result").is_some());
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_destroy_severs_every_connection() {
    let context = Context::new().expect("context");
    let (refreshes, _) = register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, Some("viewer"), None).expect("create");
    let image = context.create_object("Integer", Some("image"), None).expect("object");
    viewer
        .bind("image", ObjectBinding::new(Access::Inout, image.clone()).with_auto_connect(true))
        .expect("bind");
    viewer.configure(json!({})).await.expect("configure");
    viewer.start().await.expect("start");

    // Extra, hand-made connections in both directions.
    let external = Object::new("Integer", "external", json!(0));
    external
        .modified()
        .connect(&viewer.slot("refresh").expect("slot"))
        .expect("connect");
    let listener = Slot::from_fn("listener", |_: ()| Ok(()));
    viewer.signal::<()>("stopped").expect("signal").connect(&listener).expect("connect");
    assert_eq!(image.modified().num_connections(), 1);
    assert_eq!(external.modified().num_connections(), 1);
    assert_eq!(listener.num_connections(), 1);

    let handle = viewer.handle();
    context.destroy_service("viewer").await.expect("destroy");
    assert_eq!(viewer.state(), ServiceState::Stopped);
    assert!(!viewer.is_alive());
    assert!(!context.arena().is_live(handle));
    assert!(context.get_service("viewer").is_none());
    assert_eq!(image.modified().num_connections(), 0);
    assert_eq!(external.modified().num_connections(), 0);
    assert_eq!(listener.num_connections(), 0);

    external.set_value(1).expect("set");
    settle(&context).await;
    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    context.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn test_swap_key_slot_follows_the_published_uid() {
    let context = Context::new().expect("context");
    let (_, swaps) = register_viewer(&context, &[]);
    let viewer = context.create_service(VIEWER, None, None).expect("create");
    let first = context.create_object("Integer", Some("image"), None).expect("object");
    viewer.set_auto_connect(true);
    viewer.bind("image", ObjectBinding::new(Access::Inout, first.clone())).expect("bind");
    viewer.configure(json!({})).await.expect("configure");
    viewer.start().await.expect("start");

    assert!(context.release_object("image"));
    let second = context.create_object("Integer", Some("image"), None).expect("object");
    let swap = viewer.slot("swap_key").expect("builtin slot");
    swap.call(("image".to_string(),)).await.expect("swap");

    let bound = viewer.bound_object("image").expect("bound");
    assert!(std::sync::Arc::ptr_eq(&bound, &second));
    assert_eq!(first.modified().num_connections(), 0);
    assert_eq!(second.modified().num_connections(), 1);
    assert_eq!(*swaps.lock(), vec!["image"]);
    context.shutdown().await.expect("shutdown");
}
