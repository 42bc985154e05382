use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::com::signal::Signal;
use crate::com::slot::Slot;

fn counter_slot(counter: &Arc<AtomicUsize>) -> Arc<Slot> {
    let counter = Arc::clone(counter);
    Slot::from_fn("count", move |_: ()| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn test_blocked_connection_skips_delivery() {
    let signal: Signal<()> = Signal::new("ping");
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = counter_slot(&counter);
    let connection = signal.connect(&slot).expect("connect");

    connection.block();
    assert!(connection.is_blocked());
    signal.emit(()).await.expect("emit");
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(signal.num_connections(), 1, "blocking keeps the connection");

    connection.unblock();
    signal.emit(()).await.expect("emit");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blocker_restores_previous_state() {
    let signal: Signal<()> = Signal::new("ping");
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = counter_slot(&counter);
    let connection = signal.connect(&slot).expect("connect");

    {
        let _blocker = connection.blocker();
        assert!(connection.is_blocked());
        signal.emit(()).await.expect("emit");
    }
    assert!(!connection.is_blocked());
    signal.emit(()).await.expect("emit");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    connection.block();
    {
        let _blocker = connection.blocker();
    }
    assert!(connection.is_blocked(), "an already blocked connection stays blocked");
}

#[test]
fn test_disconnect_after_signal_dropped() {
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = counter_slot(&counter);
    let connection = {
        let signal: Signal<()> = Signal::new("ping");
        signal.connect(&slot).expect("connect")
    };
    assert!(!connection.is_connected());
    assert!(!connection.disconnect());
    assert_eq!(slot.num_connections(), 0);
}

#[test]
fn test_slot_disconnect_all_detaches_every_signal() {
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = counter_slot(&counter);
    let first: Signal<()> = Signal::new("first");
    let second: Signal<()> = Signal::new("second");
    let a = first.connect(&slot).expect("connect");
    let b = second.connect(&slot).expect("connect");
    assert_eq!(slot.num_connections(), 2);

    assert_eq!(slot.disconnect_all(), 2);
    assert!(!a.is_connected());
    assert!(!b.is_connected());
    assert_eq!(first.num_connections() + second.num_connections(), 0);
    assert_ne!(a.id(), b.id());
}
