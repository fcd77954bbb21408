//! Session with the runtime.
//!
//! [`ReyerClient`] owns one request socket and, once subscribed, one
//! subscription socket with its dispatcher task. It is cheap to clone and all
//! clones share the same session.
//!
//! # Concurrency
//!
//! - The session lock (an async mutex) serialises every request round trip
//!   with connect, subscribe and the final step of disconnect. Requests never
//!   interleave on the wire.
//! - The connection state is an atomic. [`ReyerClient::is_connected`] and
//!   [`ReyerClient::state`] never wait on the session lock.
//! - The dispatcher is stopped *before* the session lock is taken on
//!   disconnect, so a handler that issues requests cannot deadlock it.
//! - Pipe hooks run on transport tasks. Each connect attempt has a generation
//!   number and hooks from an older generation are ignored.

mod dispatcher;
mod notifier;
mod requests;
mod resource;
pub(crate) mod state;
mod subscription;

pub use dispatcher::{
    HandlerResult, RawHandler, SubscriptionRegistry, TopicEvent, TopicHandler,
};
pub use notifier::{ConnectionNotifier, ConnectionObserver};
pub use resource::{
    AvailableCalibrations, AvailableFilters, AvailableMonitors, AvailableSinks, AvailableSources,
    AvailableStages, AvailableTasks, CurrentGraphicsSettings, CurrentProtocol, CurrentRuntimeState,
    CurrentTask, Resource,
};
pub use state::ConnectionState;

use crate::config::ClientConfig;
use crate::error::client::ClientError;
use crate::error::config::ConfigError;
use crate::message::{self, Ping, Pong, Request, Response};
use crate::transport::{IpcAddress, PipeHooks, RequestSocket, SocketCloser};

use dispatcher::Dispatcher;
use state::AtomicConnectionState;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Longest `disconnect` waits for the dispatcher before aborting it.
const DISPATCHER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for the runtime's control (request/reply) and broadcast
/// (publish/subscribe) endpoints.
#[derive(Clone)]
pub struct ReyerClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    request_address: IpcAddress,
    publish_address: IpcAddress,
    state: AtomicConnectionState,
    generation: AtomicU64,
    session: Mutex<Session>,
    // Closes the request socket without waiting on the session lock.
    request_closer: StdMutex<Option<SocketCloser>>,
    dispatcher: StdMutex<Option<Dispatcher>>,
    registry: Arc<SubscriptionRegistry>,
    notifier: ConnectionNotifier,
}

#[derive(Default)]
struct Session {
    request: Option<RequestSocket>,
}

impl ReyerClient {
    /// Create a disconnected client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `config` does not validate.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let request_address = parse_address(&config.request_address)?;
        let publish_address = parse_address(&config.publish_address)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                request_address,
                publish_address,
                state: AtomicConnectionState::new(),
                generation: AtomicU64::new(0),
                session: Mutex::new(Session::default()),
                request_closer: StdMutex::new(None),
                dispatcher: StdMutex::new(None),
                registry: Arc::new(SubscriptionRegistry::new()),
                notifier: ConnectionNotifier::new(),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    /// True only between a successful liveness probe and the next loss of the
    /// pipe or `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Start connecting in the background.
    ///
    /// Returns at once. The spawned task dials the reply endpoint and sends a
    /// ping; the state only becomes [`ConnectionState::Connected`] (and the
    /// connected observers only run) once the runtime answers it. On any
    /// failure the state returns to [`ConnectionState::Disconnected`] without
    /// notifying anyone.
    ///
    /// Calling this while already connecting or connected does nothing.
    pub fn connect(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);

        if !inner
            .state
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
        {
            warn!("connect() ignored, client is already {}", inner.state.load());
            return tokio::spawn(async {});
        }

        let generation = inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!("Connecting to runtime at {}", inner.request_address);

        tokio::spawn(inner.run_connect(generation))
    }

    /// Tear down the session.
    ///
    /// In order: stops the dispatcher and waits for it (aborting it after two
    /// seconds), fails any request in flight, then drops the request socket
    /// under the session lock. Disconnected observers run if the client was
    /// connected. Safe to call in any state and more than once.
    pub async fn disconnect(&self) {
        let inner = &self.inner;

        // Pipe hooks of the current connection are stale from here on.
        inner.generation.fetch_add(1, Ordering::AcqRel);

        let dispatcher = lock(&inner.dispatcher).take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown(DISPATCHER_JOIN_TIMEOUT).await;
        }

        let closer = lock(&inner.request_closer).take();
        if let Some(closer) = closer {
            closer.close();
        }

        let mut session = inner.session.lock().await;
        session.request = None;
        let previous = inner.state.replace(ConnectionState::Disconnected);
        // A subscribe that held the lock above may have installed a dispatcher.
        let late_dispatcher = lock(&inner.dispatcher).take();
        drop(session);

        if let Some(dispatcher) = late_dispatcher {
            dispatcher.shutdown(DISPATCHER_JOIN_TIMEOUT).await;
        }

        if previous == ConnectionState::Connected {
            info!("Disconnected from runtime");
            inner.notifier.notify_disconnected();
        } else {
            debug!("disconnect() while {previous}");
        }
    }

    /// Send one request and return the raw reply body.
    ///
    /// Fails fast with [`ClientError::NotConnected`] and no socket I/O unless
    /// connected. Handing the request to the socket is bounded by the request
    /// timeout and waiting for the reply by the receive timeout.
    pub async fn send_request(&self, request: impl Into<Request>) -> Result<Bytes, ClientError> {
        let request = request.into();

        if !self.is_connected() {
            error!("Cannot send {} request, not connected", request.kind());
            return Err(ClientError::not_connected());
        }

        let mut session = self.inner.session.lock().await;
        let socket = match session.request.as_mut() {
            Some(socket) if self.is_connected() => socket,
            _ => return Err(ClientError::not_connected()),
        };

        let result = self.inner.round_trip(socket, &request).await;
        if let Err(e) = &result {
            error!("Error sending {} request: {e}", request.kind());
        }
        result
    }

    pub fn register_on_connected(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.inner.notifier.register_on_connected(Arc::new(observer));
    }

    pub fn register_on_disconnected(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.inner
            .notifier
            .register_on_disconnected(Arc::new(observer));
    }
}

impl ClientInner {
    async fn run_connect(self: Arc<Self>, generation: u64) {
        let mut session = self.session.lock().await;

        if !self.is_current(generation) {
            debug!("Connect attempt {generation} superseded before dialing");
            return;
        }

        let dial = RequestSocket::dial(&self.request_address, self.pipe_hooks(generation));
        let mut socket = match timeout(self.config.request_timeout, dial).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {e}", self.request_address);
                self.abandon_connect(generation);
                return;
            }
            Err(_) => {
                error!(
                    "Timed out connecting to {} after {:?}",
                    self.request_address, self.config.request_timeout
                );
                self.abandon_connect(generation);
                return;
            }
        };

        if !self.is_current(generation) {
            debug!("Connect attempt {generation} superseded after dialing");
            return;
        }

        *lock(&self.request_closer) = Some(socket.closer());

        if let Err(e) = self.probe(&mut socket).await {
            error!("Connection established but runtime is not responding: {e}");
            socket.close();
            self.abandon_connect(generation);
            return;
        }

        if !self.is_current(generation)
            || !self
                .state
                .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            debug!("Connect attempt {generation} lost its pipe during the probe");
            socket.close();
            return;
        }

        session.request = Some(socket);
        drop(session);

        info!("Connected to runtime at {}", self.request_address);
        self.notifier.notify_connected();
    }

    /// Ping the runtime; connected only counts once it answers.
    async fn probe(&self, socket: &mut RequestSocket) -> Result<Pong, ClientError> {
        let reply = self
            .round_trip(socket, &Request::Ping(Ping { timestamp: 0 }))
            .await?;
        let response: Response = message::decode(&reply)?;

        if !response.success {
            return Err(ClientError::Rejected {
                error_code: response.error_code,
                message: response.error_message,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if response.payload.is_empty() {
            return Err(ClientError::decode("ping response carried no payload"));
        }

        Ok(message::decode_str(&response.payload)?)
    }

    async fn round_trip(
        &self,
        socket: &mut RequestSocket,
        request: &Request,
    ) -> Result<Bytes, ClientError> {
        let body = message::encode(request)?;
        debug!("Sending {} request ({} bytes)", request.kind(), body.len());

        match timeout(self.config.request_timeout, socket.send(&body)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::timeout(format!(
                    "sending {} request took longer than {:?}",
                    request.kind(),
                    self.config.request_timeout
                )));
            }
        }

        match timeout(self.config.receive_timeout, socket.recv()).await {
            Ok(result) => {
                let reply = result?;
                debug!("Received response ({} bytes)", reply.len());
                Ok(reply)
            }
            Err(_) => Err(ClientError::timeout(format!(
                "no reply to {} request within {:?}",
                request.kind(),
                self.config.receive_timeout
            ))),
        }
    }

    fn pipe_hooks(self: &Arc<Self>, generation: u64) -> PipeHooks {
        let inner = Arc::downgrade(self);
        let address = self.request_address.clone();

        PipeHooks::default()
            .on_connect(move || debug!("Pipe connected to {address}"))
            .on_remove(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.pipe_removed(generation);
                }
            })
    }

    fn pipe_removed(&self, generation: u64) {
        if !self.is_current(generation) {
            debug!("Ignoring removal of pipe from connect attempt {generation}");
            return;
        }

        match self.state.replace(ConnectionState::Disconnected) {
            ConnectionState::Connected => {
                info!("Pipe to runtime removed, disconnected");
                self.notifier.notify_disconnected();
            }
            ConnectionState::Connecting => debug!("Pipe removed while connecting"),
            ConnectionState::Disconnected => {}
        }
    }

    fn abandon_connect(&self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }

        lock(&self.request_closer).take();
        self.state
            .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

#[track_caller]
fn parse_address(address: &str) -> Result<IpcAddress, ConfigError> {
    IpcAddress::parse(address).map_err(|e| ConfigError::Validation {
        location: ErrorLocation::from(Location::caller()),
        reason: e.to_string(),
    })
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
