//! Test helpers for client integration tests.
//!
//! [`FakeRuntime`] stands in for the runtime process:
//! - A reply endpoint that answers requests through a [`Responder`]
//! - A publish endpoint that broadcasts whatever a test hands it
//! - Counters for accepted connections and received requests
//!
//! Both endpoints are Unix sockets in a temp directory and speak the same SP
//! framing as the real runtime.

use client_core::ClientConfig;
use client_core::ReyerClient;
use client_core::message::{BroadcastMessage, Response};
use client_core::transport::{SpFrameCodec, SpProtocol, handshake};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, FramedWrite};

/// How the fake runtime answers one request.
pub enum Reply {
    Now(Response),
    Delayed(Duration, Response),
    /// Swallow the request; the client will time out.
    Never,
}

pub type Responder = Arc<dyn Fn(&Value) -> Reply + Send + Sync>;

/// Answer pings with a pong and everything else with `handler`.
pub fn answering<F>(handler: F) -> Responder
where
    F: Fn(&Value) -> Reply + Send + Sync + 'static,
{
    Arc::new(move |request| match request.get("timestamp") {
        Some(timestamp) => Reply::Now(pong(timestamp)),
        None => handler(request),
    })
}

/// Answer pings and accept everything else with an empty payload.
pub fn accepting() -> Responder {
    answering(|_| Reply::Now(Response::ok("")))
}

pub fn pong(timestamp: &Value) -> Response {
    Response::ok(json!({ "timestamp": timestamp }).to_string())
}

#[derive(Default)]
struct RuntimeStats {
    connections: AtomicUsize,
    requests: StdMutex<Vec<Value>>,
}

type Subscribers = Arc<Mutex<Vec<FramedWrite<UnixStream, SpFrameCodec>>>>;

pub struct FakeRuntime {
    dir: TempDir,
    stats: Arc<RuntimeStats>,
    subscribers: Subscribers,
    kill: watch::Sender<u64>,
    tasks: Vec<JoinHandle<()>>,
    receive_timeout: Duration,
}

impl FakeRuntime {
    pub async fn start(responder: Responder) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let stats = Arc::new(RuntimeStats::default());
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));
        let (kill, _) = watch::channel(0u64);

        let reply_listener =
            UnixListener::bind(reply_path(dir.path())).expect("Failed to bind reply socket");
        let publish_listener =
            UnixListener::bind(publish_path(dir.path())).expect("Failed to bind publish socket");

        let reply_task = tokio::spawn(accept_requests(
            reply_listener,
            responder,
            Arc::clone(&stats),
            kill.clone(),
        ));
        let publish_task = tokio::spawn(accept_subscribers(
            publish_listener,
            Arc::clone(&subscribers),
        ));

        Self {
            dir,
            stats,
            subscribers,
            kill,
            tasks: vec![reply_task, publish_task],
            receive_timeout: Duration::from_millis(500),
        }
    }

    pub fn with_receive_timeout(mut self, receive_timeout: Duration) -> Self {
        self.receive_timeout = receive_timeout;
        self
    }

    pub fn config(&self) -> ClientConfig {
        config_for(self.dir.path(), self.receive_timeout)
    }

    pub fn client(&self) -> ReyerClient {
        ReyerClient::new(self.config()).expect("Failed to create client")
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Value> {
        self.stats
            .requests
            .lock()
            .expect("requests lock")
            .clone()
    }

    /// Hang up on every connected requester, like a runtime crash would.
    pub fn drop_request_connections(&self) {
        self.kill.send_modify(|generation| *generation += 1);
    }

    /// Hang up on every subscriber, like a runtime restart would.
    pub async fn drop_subscribers(&self) {
        self.subscribers.lock().await.clear();
    }

    pub async fn publish(&self, message: &BroadcastMessage) {
        let bytes = serde_json::to_vec(message).expect("Failed to encode broadcast");
        self.publish_raw(&bytes).await;
    }

    pub async fn publish_raw(&self, bytes: &[u8]) {
        let mut subscribers = self.subscribers.lock().await;
        let mut alive = Vec::with_capacity(subscribers.len());

        for mut subscriber in subscribers.drain(..) {
            if subscriber.send(Bytes::copy_from_slice(bytes)).await.is_ok() {
                alive.push(subscriber);
            }
        }

        *subscribers = alive;
    }

    pub async fn wait_for_subscribers(&self, count: usize) {
        let subscribers = Arc::clone(&self.subscribers);
        wait_until_async(
            || {
                let subscribers = Arc::clone(&subscribers);
                async move { subscribers.lock().await.len() >= count }
            },
            "subscribers to connect",
        )
        .await;
    }
}

impl Drop for FakeRuntime {
    fn drop(&mut self) {
        self.drop_request_connections();
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Config pointing at sockets in `dir`; nothing needs to listen there.
pub fn config_for(dir: &Path, receive_timeout: Duration) -> ClientConfig {
    ClientConfig {
        request_address: format!("ipc://{}", reply_path(dir).display()),
        publish_address: format!("ipc://{}", publish_path(dir).display()),
        request_timeout: Duration::from_secs(1),
        receive_timeout,
    }
}

fn reply_path(dir: &Path) -> PathBuf {
    dir.join("rep.sock")
}

fn publish_path(dir: &Path) -> PathBuf {
    dir.join("pub.sock")
}

async fn accept_requests(
    listener: UnixListener,
    responder: Responder,
    stats: Arc<RuntimeStats>,
    kill: watch::Sender<u64>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        stats.connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve_requests(
            stream,
            Arc::clone(&responder),
            Arc::clone(&stats),
            kill.subscribe(),
        ));
    }
}

async fn serve_requests(
    mut stream: UnixStream,
    responder: Responder,
    stats: Arc<RuntimeStats>,
    mut kill: watch::Receiver<u64>,
) {
    if handshake(&mut stream, SpProtocol::Rep0).await.is_err() {
        return;
    }

    let mut framed = Framed::new(stream, SpFrameCodec::default());

    loop {
        let frame = tokio::select! {
            _ = kill.changed() => return,
            frame = framed.next() => match frame {
                Some(Ok(frame)) => frame,
                _ => return,
            },
        };

        let (request_id, body) = frame.split_at(4);
        let request: Value = serde_json::from_slice(body).expect("Client sent invalid JSON");
        stats
            .requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        let response = match responder(&request) {
            Reply::Now(response) => response,
            Reply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                response
            }
            Reply::Never => continue,
        };

        let mut reply = BytesMut::from(request_id);
        reply.extend_from_slice(&serde_json::to_vec(&response).expect("encode response"));

        if framed.send(reply.freeze()).await.is_err() {
            return;
        }
    }
}

async fn accept_subscribers(listener: UnixListener, subscribers: Subscribers) {
    while let Ok((mut stream, _)) = listener.accept().await {
        if handshake(&mut stream, SpProtocol::Pub0).await.is_ok() {
            subscribers
                .lock()
                .await
                .push(FramedWrite::new(stream, SpFrameCodec::default()));
        }
    }
}

/// Counts observer invocations.
#[derive(Clone, Default)]
pub struct ObserverCounts {
    connected: Arc<AtomicUsize>,
    disconnected: Arc<AtomicUsize>,
}

impl ObserverCounts {
    pub fn attach(client: &ReyerClient) -> Self {
        let counts = Self::default();

        let connected = Arc::clone(&counts.connected);
        client.register_on_connected(move || {
            connected.fetch_add(1, Ordering::SeqCst);
        });

        let disconnected = Arc::clone(&counts.disconnected);
        client.register_on_disconnected(move || {
            disconnected.fetch_add(1, Ordering::SeqCst);
        });

        counts
    }

    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn disconnected(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }
}

/// Connect and wait for the attempt to finish.
pub async fn connect(client: &ReyerClient) {
    client.connect().await.expect("Connect task panicked");
}

pub async fn wait_until(condition: impl Fn() -> bool, what: &str) {
    wait_until_async(|| std::future::ready(condition()), what).await;
}

async fn wait_until_async<F, Fut>(condition: F, what: &str)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);

    while !condition().await {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
