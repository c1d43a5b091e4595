//! Integration tests for signals and properties.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use horizon_grid_core::{Property, Signal};
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn slots_may_reconnect_while_emitting() {
    setup();
    let signal = Arc::new(Signal::<u32>::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let inner_signal = signal.clone();
    let inner_calls = calls.clone();
    signal.connect(move |_| {
        let calls = inner_calls.clone();
        inner_signal.connect(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    });

    signal.emit(1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(signal.connection_count(), 2);

    signal.emit(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(signal.connection_count(), 3);
}

#[test]
fn slot_can_disconnect_itself() {
    setup();
    let signal = Arc::new(Signal::<()>::new());
    let id = Arc::new(Mutex::new(None));
    let calls = Arc::new(AtomicUsize::new(0));

    let inner_signal = signal.clone();
    let inner_id = id.clone();
    let inner_calls = calls.clone();
    let connection = signal.connect(move |_| {
        inner_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = *inner_id.lock() {
            inner_signal.disconnect(id);
        }
    });
    *id.lock() = Some(connection);

    signal.emit(());
    signal.emit(());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!signal.is_connected(connection));
}

#[test]
fn scoped_connection_and_blocking() {
    setup();
    let signal = Signal::<String>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    {
        let seen = seen.clone();
        let _guard = signal.connect_scoped(move |name: &String| seen.lock().push(name.clone()));
        signal.emit("price".to_string());
        signal.set_blocked(true);
        signal.emit("ignored".to_string());
        signal.set_blocked(false);
    }
    signal.emit("after".to_string());

    assert_eq!(*seen.lock(), vec!["price".to_string()]);
    assert_eq!(signal.connection_count(), 0);
}

#[test]
fn property_reports_changes_to_a_signal() {
    setup();
    let quantity = Property::new(3);
    let changed = Signal::<i32>::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();
    changed.connect(move |value| log_clone.lock().push(*value));

    for value in [3, 4, 4, 5] {
        if quantity.set(value) {
            changed.emit(value);
        }
    }

    assert_eq!(quantity.get(), 5);
    assert_eq!(*log.lock(), vec![4, 5]);
}
