use crate::kernel::component::KernelComponent;
use crate::thread::error::WorkerError;
use crate::thread::pool::WorkerPool;

#[tokio::test]
async fn test_pool_spawns_default_worker() {
    let pool = WorkerPool::new("main").expect("pool");
    let default = pool.default_worker().expect("default worker");
    assert_eq!(default.name(), "main");
    assert_eq!(pool.default_name(), "main");
    assert_eq!(pool.names(), vec!["main"]);
    pool.stop_all().await;
}

#[tokio::test]
async fn test_get_or_spawn_reuses_named_workers() {
    let pool = WorkerPool::new("main").expect("pool");
    assert!(pool.get("io").is_none());
    let first = pool.get_or_spawn("io").expect("spawn io");
    let again = pool.get_or_spawn("io").expect("reuse io");
    assert_eq!(first, again);
    assert_eq!(pool.names(), vec!["io", "main"]);

    pool.stop_all().await;
    assert!(!first.is_running());
    assert!(pool.names().is_empty());
    assert!(pool.is_closed());
}

#[tokio::test]
async fn test_stopped_worker_is_replaced_until_pool_stops() {
    let pool = WorkerPool::new("main").expect("pool");
    let first = pool.get_or_spawn("io").expect("spawn io");
    first.stop().await;
    assert!(!first.is_running());

    let respawned = pool.get_or_spawn("io").expect("replace io");
    assert_ne!(respawned.id(), first.id());
    assert!(respawned.is_running());
    assert!(matches!(first.post(async {}), Err(WorkerError::WorkerStopped { .. })));

    pool.stop_all().await;
    assert_eq!(
        pool.get_or_spawn("io"),
        Err(WorkerError::WorkerStopped { worker: "io".to_string() })
    );
    assert!(pool.default_worker().is_err());
}

#[tokio::test]
async fn test_pool_as_kernel_component() {
    let pool = WorkerPool::new("main").expect("pool");
    assert_eq!(pool.name(), "WorkerPool");
    pool.initialize().await.expect("initialize");
    pool.start().await.expect("start");
    pool.stop().await.expect("stop");
    assert!(pool.get("main").is_none());
}
