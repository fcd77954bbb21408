//! Connection event fan-out.
//!
//! Observers run synchronously on whichever task made the transition (the
//! connect task, a pipe hook, or the caller of `disconnect`). Anything slow,
//! such as updating a UI, should be re-dispatched to the observer's own task.
//!
//! A panicking observer is logged and skipped; the remaining observers still
//! run and the transition that triggered them completes.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use log::{error, warn};

/// Callback invoked on a connection transition.
pub type ConnectionObserver = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct ConnectionNotifier {
    connected: RwLock<Vec<ConnectionObserver>>,
    disconnected: RwLock<Vec<ConnectionObserver>>,
}

impl ConnectionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_on_connected(&self, observer: ConnectionObserver) {
        push(&self.connected, observer);
    }

    pub fn register_on_disconnected(&self, observer: ConnectionObserver) {
        push(&self.disconnected, observer);
    }

    pub fn notify_connected(&self) {
        notify("connected", &self.connected);
    }

    pub fn notify_disconnected(&self) {
        notify("disconnected", &self.disconnected);
    }
}

fn notify(event: &str, list: &RwLock<Vec<ConnectionObserver>>) {
    for observer in snapshot(list) {
        if catch_unwind(AssertUnwindSafe(|| observer())).is_err() {
            error!("Panic in {event} observer");
        }
    }
}

fn push(list: &RwLock<Vec<ConnectionObserver>>, observer: ConnectionObserver) {
    match list.write() {
        Ok(mut observers) => observers.push(observer),
        Err(poisoned) => {
            warn!("Observer list lock poisoned, recovering");
            poisoned.into_inner().push(observer);
        }
    }
}

// Observers run on a copy so they may register further observers.
fn snapshot(list: &RwLock<Vec<ConnectionObserver>>) -> Vec<ConnectionObserver> {
    match list.read() {
        Ok(observers) => observers.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
