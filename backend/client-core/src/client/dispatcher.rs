//! Subscription registry and the background loop that feeds it.
//!
//! One dispatcher task runs per subscription socket. It receives broadcast
//! frames in wire order and, per frame, runs the frame's topic handlers one
//! after another in registration order, then the raw handlers. Nothing a frame
//! or a handler does can stop the loop: malformed frames, undecodable payloads,
//! handler errors and handler panics are logged and skipped.

use crate::error::handler::HandlerError;
use crate::error::transport::TransportError;
use crate::message::{self, BroadcastMessage, BroadcastTopic, ProtocolEventMessage};
use crate::transport::SubscribeSocket;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Decoded payload of a broadcast, selected by its topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicEvent {
    /// `LOG` payloads have no fixed schema and are forwarded as-is.
    Log(String),
    Protocol(ProtocolEventMessage),
}

impl TopicEvent {
    pub fn topic(&self) -> BroadcastTopic {
        match self {
            TopicEvent::Log(_) => BroadcastTopic::Log,
            TopicEvent::Protocol(_) => BroadcastTopic::Protocol,
        }
    }

    fn decode(topic: BroadcastTopic, payload: &str) -> Result<Self, crate::error::CodecError> {
        match topic {
            BroadcastTopic::Log => Ok(TopicEvent::Log(payload.to_string())),
            BroadcastTopic::Protocol => message::decode_str(payload).map(TopicEvent::Protocol),
        }
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Handler for decoded events of one topic.
pub type TopicHandler = Arc<dyn Fn(&TopicEvent) -> HandlerResult + Send + Sync>;

/// Handler for every broadcast frame, undecoded.
pub type RawHandler = Arc<dyn Fn(&[u8]) -> HandlerResult + Send + Sync>;

#[derive(Default)]
struct Handlers {
    topics: HashMap<BroadcastTopic, Arc<Vec<TopicHandler>>>,
    raw: Arc<Vec<RawHandler>>,
}

/// Topic → handlers, plus the raw handler list.
///
/// Lists are copy-on-write: registration swaps in a new `Arc<Vec<_>>` and the
/// dispatcher works on the `Arc` it cloned for the current frame, so
/// registering from inside a handler is safe and takes effect from the next
/// frame.
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: RwLock<Handlers>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_topic_handler(&self, topic: BroadcastTopic, handler: TopicHandler) {
        let mut handlers = self.write();
        let list = handlers.topics.entry(topic).or_default();
        let mut next = Vec::with_capacity(list.len() + 1);
        next.extend(list.iter().cloned());
        next.push(handler);
        *list = Arc::new(next);
    }

    pub fn add_raw_handler(&self, handler: RawHandler) {
        let mut handlers = self.write();
        let mut next = Vec::with_capacity(handlers.raw.len() + 1);
        next.extend(handlers.raw.iter().cloned());
        next.push(handler);
        handlers.raw = Arc::new(next);
    }

    /// Remove one raw handler by identity (the `Arc` it was registered with).
    ///
    /// Returns false if it was not registered.
    pub fn remove_raw_handler(&self, handler: &RawHandler) -> bool {
        let mut handlers = self.write();
        let next: Vec<RawHandler> = handlers
            .raw
            .iter()
            .filter(|registered| !Arc::ptr_eq(*registered, handler))
            .cloned()
            .collect();

        if next.len() == handlers.raw.len() {
            return false;
        }

        handlers.raw = Arc::new(next);
        true
    }

    pub fn clear_raw_handlers(&self) {
        self.write().raw = Arc::new(Vec::new());
    }

    pub fn topic_handler_count(&self, topic: BroadcastTopic) -> usize {
        self.read().topics.get(&topic).map_or(0, |list| list.len())
    }

    pub fn raw_handler_count(&self) -> usize {
        self.read().raw.len()
    }

    fn topic_snapshot(&self, topic: BroadcastTopic) -> Option<Arc<Vec<TopicHandler>>> {
        self.read().topics.get(&topic).cloned()
    }

    fn raw_snapshot(&self) -> Arc<Vec<RawHandler>> {
        Arc::clone(&self.read().raw)
    }

    /// Route one received frame.
    pub fn dispatch(&self, frame: &[u8]) {
        let broadcast: BroadcastMessage = match message::decode(frame) {
            Ok(broadcast) => broadcast,
            Err(e) => {
                error!("Error parsing broadcast message: {e}");
                return;
            }
        };

        match broadcast.topic() {
            Some(topic) => self.dispatch_topic(topic, &broadcast.payload),
            None => debug!("Broadcast with unknown topic {}", broadcast.topic_code),
        }

        for handler in self.raw_snapshot().iter() {
            invoke("raw", || handler(frame));
        }
    }

    fn dispatch_topic(&self, topic: BroadcastTopic, payload: &str) {
        // Payloads are only decoded for topics someone listens to.
        let Some(handlers) = self.topic_snapshot(topic).filter(|list| !list.is_empty()) else {
            return;
        };

        let event = match TopicEvent::decode(topic, payload) {
            Ok(event) => event,
            Err(e) => {
                error!("Error decoding {topic:?} payload: {e}");
                return;
            }
        };

        for handler in handlers.iter() {
            invoke("topic", || handler(&event));
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Handlers> {
        self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Handlers> {
        self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn invoke(kind: &str, call: impl FnOnce() -> HandlerResult) {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Error in {kind} subscription handler: {e}"),
        Err(_) => error!("Panic in {kind} subscription handler"),
    }
}

/// Handle to a running dispatcher task.
pub(crate) struct Dispatcher {
    socket: Arc<SubscribeSocket>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        socket: SubscribeSocket,
        registry: Arc<SubscriptionRegistry>,
        receive_timeout: Duration,
    ) -> Self {
        let socket = Arc::new(socket);
        let running = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(run(
            Arc::clone(&socket),
            registry,
            Arc::clone(&running),
            receive_timeout,
        ));

        Self {
            socket,
            running,
            task,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.task.is_finished()
    }

    /// Stop the loop and wait for it to end.
    ///
    /// The stop flag is raised and the socket closed before waiting, so a
    /// receive in progress returns immediately. If the task still has not
    /// ended after `wait` it is aborted; either way it has terminated when this
    /// returns.
    pub(crate) async fn shutdown(mut self, wait: Duration) {
        self.running.store(false, Ordering::Release);
        self.socket.close();

        match timeout(wait, &mut self.task).await {
            Ok(Ok(())) => debug!("Subscription dispatcher joined"),
            Ok(Err(e)) => warn!("Subscription dispatcher ended abnormally: {e}"),
            Err(_) => {
                warn!("Subscription dispatcher did not stop within {wait:?}, aborting");
                self.task.abort();
                let _ = (&mut self.task).await;
            }
        }
    }
}

async fn run(
    socket: Arc<SubscribeSocket>,
    registry: Arc<SubscriptionRegistry>,
    running: Arc<AtomicBool>,
    receive_timeout: Duration,
) {
    debug!("Started subscription receive loop");

    while running.load(Ordering::Acquire) {
        // A timeout only gives the loop a chance to see the stop flag.
        let frame = match timeout(receive_timeout, socket.recv()).await {
            Err(_) => continue,
            Ok(Ok(frame)) => frame,
            Ok(Err(TransportError::Closed { message, .. })) => {
                info!("Subscription socket closed ({message}), stopping loop");
                break;
            }
            Ok(Err(e)) => {
                if running.load(Ordering::Acquire) {
                    error!("Error in subscription loop: {e}");
                }
                break;
            }
        };

        registry.dispatch(&frame);
    }

    running.store(false, Ordering::Release);
    debug!("Subscription receive loop ended");
}
