use crate::client::ConnectionNotifier;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn given_observers_when_notified_then_each_list_fires_its_own() {
    let notifier = ConnectionNotifier::new();
    let connected = Arc::new(AtomicUsize::new(0));
    let disconnected = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = Arc::clone(&connected);
        notifier.register_on_connected(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }
    let counter = Arc::clone(&disconnected);
    notifier.register_on_disconnected(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    notifier.notify_connected();

    assert_eq!(connected.load(Ordering::SeqCst), 2);
    assert_eq!(disconnected.load(Ordering::SeqCst), 0);
}

/// **VALUE**: An observer may register another observer while being notified.
///
/// **BUG THIS CATCHES**: Invoking observers while holding the list lock, which
/// deadlocks on the nested registration.
#[test]
fn given_observer_that_registers_when_notified_then_does_not_deadlock() {
    let notifier = Arc::new(ConnectionNotifier::new());
    let late_calls = Arc::new(AtomicUsize::new(0));

    let inner_notifier = Arc::clone(&notifier);
    let inner_calls = Arc::clone(&late_calls);
    notifier.register_on_connected(Arc::new(move || {
        let calls = Arc::clone(&inner_calls);
        inner_notifier.register_on_connected(Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }));
    }));

    // First round only sees the original observer
    notifier.notify_connected();
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    notifier.notify_connected();
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
}

/// **VALUE**: A panicking observer does not stop the ones registered after it.
///
/// **WHY THIS MATTERS**: Observers run inside `disconnect()`, the connect task and
/// the pipe hook. An unwinding observer would abort teardown halfway or kill the
/// transport task.
///
/// **BUG THIS CATCHES**: Calling observers without `catch_unwind`.
#[test]
fn given_panicking_observer_when_notified_then_later_observers_still_run() {
    // GIVEN: A panicking observer followed by a recording one
    let notifier = ConnectionNotifier::new();
    let calls = Arc::new(AtomicUsize::new(0));
    notifier.register_on_disconnected(Arc::new(|| panic!("observer failure")));
    let counter = Arc::clone(&calls);
    notifier.register_on_disconnected(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    // WHEN: Notifying
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        notifier.notify_disconnected();
    }));

    // THEN: No panic escaped and the second observer ran
    assert!(result.is_ok(), "Observer panic escaped notify_disconnected");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
