//! Headless console shell around [`ReyerClient`].
//!
//! Keeps a session to the runtime alive until shutdown:
//! - Dials whenever the client is disconnected, every [`RECONNECT_INTERVAL`]
//! - On connect, registers the protocol and log handlers once, restarts the
//!   broadcast subscription if the runtime dropped it, and reads the runtime
//!   state
//! - Feeds protocol events into a shared [`ProtocolTracker`]
//!
//! Connection observers run on client tasks, so they only forward a
//! [`ShellEvent`] to the shell's own loop.

use crate::error::ReyerError;

use client_core::client::HandlerResult;
use client_core::error::HandlerError;
use client_core::message::ProtocolEventMessage;
use client_core::protocol::ProtocolTracker;
use client_core::{ConnectionState, ReyerClient};

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::{MissedTickBehavior, interval};

pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Log target for lines relayed from the runtime.
const RUNTIME_LOG_TARGET: &str = "runtime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellEvent {
    Connected,
    Disconnected,
}

pub struct Shell {
    client: ReyerClient,
    tracker: Arc<Mutex<ProtocolTracker>>,
    events: UnboundedReceiver<ShellEvent>,
    protocol_handler_registered: bool,
    log_handler_registered: bool,
}

impl Shell {
    pub fn new(client: ReyerClient) -> Self {
        let (sender, events) = unbounded_channel();

        let on_connected = sender.clone();
        client.register_on_connected(move || {
            let _ = on_connected.send(ShellEvent::Connected);
        });
        client.register_on_disconnected(move || {
            let _ = sender.send(ShellEvent::Disconnected);
        });

        Self {
            client,
            tracker: Arc::new(Mutex::new(ProtocolTracker::new())),
            events,
            protocol_handler_registered: false,
            log_handler_registered: false,
        }
    }

    pub fn tracker(&self) -> Arc<Mutex<ProtocolTracker>> {
        Arc::clone(&self.tracker)
    }

    /// Run until `shutdown` resolves, then disconnect.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ReyerError> {
        tokio::pin!(shutdown);

        let mut reconnect = interval(RECONNECT_INTERVAL);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = reconnect.tick() => {
                    if self.client.state() == ConnectionState::Disconnected {
                        // Completion is reported through the observers.
                        drop(self.client.connect());
                    }
                }
            }
        }

        self.client.disconnect().await;
        info!("Shell stopped");
        Ok(())
    }

    async fn handle(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Connected => {
                info!("Connected to runtime at {}", self.client.config().request_address);

                self.ensure_subscribed().await;

                match self.client.get_runtime_state().await {
                    Ok(state) => {
                        info!("Runtime state: {state:?}");
                        if let Ok(mut tracker) = self.tracker.lock() {
                            tracker.set_runtime_state(state);
                        }
                    }
                    Err(e) => warn!("Failed to read runtime state: {e}"),
                }
            }
            ShellEvent::Disconnected => {
                warn!("Lost connection to runtime, retrying");
                if let Ok(mut tracker) = self.tracker.lock() {
                    tracker.reset();
                }
            }
        }
    }

    /// Register the broadcast handlers that are still missing, then make sure
    /// a dispatcher is receiving.
    ///
    /// Handlers stay registered in the client across publisher hang-ups; only
    /// the dispatcher has to be restarted.
    pub(crate) async fn ensure_subscribed(&mut self) {
        if !self.protocol_handler_registered {
            match self
                .client
                .subscribe_protocol_events(protocol_event_handler(self.tracker()))
                .await
            {
                Ok(()) => self.protocol_handler_registered = true,
                Err(e) => {
                    error!("Failed to subscribe to protocol events: {e}");
                    return;
                }
            }
        }

        if !self.log_handler_registered {
            match self.client.subscribe_log(runtime_log_handler).await {
                Ok(()) => self.log_handler_registered = true,
                Err(e) => {
                    error!("Failed to subscribe to runtime log: {e}");
                    return;
                }
            }
        }

        if !self.client.is_subscribed() {
            info!("Broadcast subscription lost, resubscribing");
            if let Err(e) = self.client.subscribe(None).await {
                error!("Failed to resubscribe to runtime broadcasts: {e}");
            }
        }
    }
}

/// Apply each protocol event to `tracker`.
pub fn protocol_event_handler(
    tracker: Arc<Mutex<ProtocolTracker>>,
) -> impl Fn(&ProtocolEventMessage) -> HandlerResult + Send + Sync + 'static {
    move |event| {
        let mut tracker = tracker
            .lock()
            .map_err(|_| HandlerError::new("Protocol tracker lock poisoned"))?;
        tracker.apply(event);
        Ok(())
    }
}

fn runtime_log_handler(line: &str) -> HandlerResult {
    info!(target: RUNTIME_LOG_TARGET, "{line}");
    Ok(())
}
