use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::json;

use crate::com::error::ConnectionError;
use crate::com::slot::Slot;
use crate::kernel::context::{Context, ContextConfig};
use crate::service::keys::{Access, ObjectBinding};
use crate::tests::integration::common::{DOUBLER, Doubler, drain};
use crate::thread::error::WorkerError;

fn two_workers() -> Arc<Context> {
    Context::with_config(ContextConfig {
        workers: vec!["left".to_string(), "right".to_string()],
        ..ContextConfig::default()
    })
    .expect("context")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cross_worker_call_cycle_is_reported() {
    let context = two_workers();
    let left = context.workers().get("left").expect("left");
    let right = context.workers().get("right").expect("right");

    let back = Slot::from_fn("back", |(): ()| Ok(()));
    back.set_worker(Some(left.clone()));

    let outcome: Arc<Mutex<Option<ConnectionError>>> = Arc::default();
    let seen = Arc::clone(&outcome);
    let forward = Slot::new("forward", move |(): ()| {
        let back = Arc::clone(&back);
        let seen = Arc::clone(&seen);
        async move {
            if let Err(e) = back.call(()).await {
                *seen.lock() = Some(e);
            }
            Ok(())
        }
    });
    forward.set_worker(Some(right));

    left.run(async move { forward.call(()).await })
        .await
        .expect("left worker")
        .expect("forward delivered");

    let outcome = outcome.lock().take();
    match outcome {
        Some(ConnectionError::Dispatch(WorkerError::DeadlockDetected { cycle, .. })) => {
            assert_eq!(cycle, "right -> left -> right");
        }
        other => panic!("expected a deadlock report, got {other:?}"),
    }
    assert_eq!(context.workers().wait_graph().pending_waits(), 0);
    context.shutdown().await.expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_emitters_on_many_tasks_reach_one_worker_in_turn() {
    let context = two_workers();
    let source = context.create_object("Integer", Some("source"), None).expect("source");
    let target = context.create_object("Integer", Some("target"), None).expect("target");
    context.register_service::<Doubler>(DOUBLER).expect("register");
    let doubler = context.create_service(DOUBLER, Some("doubler"), Some("right")).expect("create");
    doubler
        .bind("source", ObjectBinding::new(Access::Input, Arc::clone(&source)).with_auto_connect(true))
        .expect("bind");
    doubler
        .bind("target", ObjectBinding::new(Access::Inout, Arc::clone(&target)))
        .expect("bind");
    doubler.configure(json!({})).await.expect("configure");
    doubler.start().await.expect("start");

    let delivered = Arc::new(AtomicUsize::new(0));
    let mut emitters = Vec::new();
    for i in 0..8 {
        let source = Arc::clone(&source);
        let delivered = Arc::clone(&delivered);
        emitters.push(tokio::spawn(async move {
            source.set_value(i).expect("set");
            delivered.fetch_add(1, Ordering::SeqCst);
        }));
    }
    for emitter in emitters {
        emitter.await.expect("emitter");
    }
    drain(&context, "right").await;

    assert_eq!(delivered.load(Ordering::SeqCst), 8);
    let doubled = target.value::<i64>().expect("int");
    assert_eq!(doubled, source.value::<i64>().expect("int") * 2);
    context.shutdown().await.expect("shutdown");
}
