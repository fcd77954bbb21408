use crate::client_tests::helpers::{
    FakeRuntime, ObserverCounts, Reply, accepting, answering, config_for, connect, wait_until,
};

use client_core::error::ClientError;
use client_core::message::{Ping, ResourceCode, ResourceRequest, Response};
use client_core::{ConnectionState, ReyerClient};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// **VALUE**: Connecting to a responsive runtime ends in `Connected` with exactly
/// one connected notification, and disconnecting produces exactly one
/// disconnected notification.
///
/// **WHY THIS MATTERS**: The UI enables and disables every control from these two
/// notifications. A duplicate or missing one leaves it out of sync with the
/// runtime.
///
/// **BUG THIS CATCHES**: Firing observers from both the pipe hook and
/// `disconnect()`, or firing connected before the probe answered.
#[tokio::test]
async fn given_responsive_runtime_when_connect_then_connected_and_observers_fire_once() {
    // GIVEN: A runtime that answers pings
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let counts = ObserverCounts::attach(&client);

    // WHEN: Connecting
    connect(&client).await;

    // THEN: Connected, notified once, and the probe was a ping with timestamp 0
    assert!(client.is_connected());
    assert_eq!(counts.connected(), 1);
    assert_eq!(counts.disconnected(), 0);
    assert_eq!(runtime.requests(), vec![serde_json::json!({"timestamp": 0})]);

    // WHEN: Disconnecting twice
    client.disconnect().await;
    client.disconnect().await;

    // THEN: Disconnected, notified once
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(counts.disconnected(), 1);
}

/// **VALUE**: A runtime whose socket accepts connections but never answers is not
/// reported as connected.
///
/// **WHY THIS MATTERS**: The reply socket exists before the runtime's message loop
/// runs. Treating a successful dial as "connected" would let the UI send
/// requests into the void.
///
/// **BUG THIS CATCHES**: Moving to `Connected` on dial, or notifying observers
/// before the probe result is known.
#[tokio::test]
async fn given_unresponsive_runtime_when_probe_times_out_then_disconnected_without_notification()
{
    // GIVEN: A runtime that swallows every request
    let runtime = FakeRuntime::start(Arc::new(|_| Reply::Never))
        .await
        .with_receive_timeout(Duration::from_millis(200));
    let client = runtime.client();
    let counts = ObserverCounts::attach(&client);

    // WHEN: Connecting
    connect(&client).await;

    // THEN: Back to Disconnected, no observer fired
    assert_eq!(runtime.connections(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(counts.connected(), 0);
    assert_eq!(counts.disconnected(), 0);
}

#[tokio::test]
async fn given_no_runtime_when_connect_then_stays_disconnected() {
    let dir = TempDir::new().expect("temp dir");
    let client = ReyerClient::new(config_for(dir.path(), Duration::from_millis(200)))
        .expect("client");
    let counts = ObserverCounts::attach(&client);

    connect(&client).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(counts.connected(), 0);
}

/// **VALUE**: Requests while disconnected fail immediately without touching the
/// socket.
///
/// **BUG THIS CATCHES**: Lazily dialing inside `send_request`, or waiting for the
/// receive timeout before reporting the failure.
#[tokio::test]
async fn given_disconnected_client_when_send_request_then_not_connected_without_io() {
    // GIVEN: A running runtime the client never connected to
    let runtime = FakeRuntime::start(accepting())
        .await
        .with_receive_timeout(Duration::from_secs(5));
    let client = runtime.client();

    // WHEN: Sending a request
    let started = Instant::now();
    let result = client.send_request(Ping { timestamp: 1 }).await;

    // THEN: NotConnected at once, and the runtime saw nothing
    assert!(matches!(result, Err(ClientError::NotConnected { .. })));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(runtime.connections(), 0);
    assert!(runtime.requests().is_empty());
}

/// **VALUE**: Losing the pipe moves a connected client to `Disconnected` with one
/// notification, and a later `connect()` recovers.
///
/// **WHY THIS MATTERS**: The runtime can crash or restart at any time. Without the
/// pipe hook the client would keep claiming to be connected.
///
/// **BUG THIS CATCHES**: Ignoring EOF on the request pipe, or a stale hook from
/// the first connection knocking down the second.
#[tokio::test]
async fn given_connected_client_when_pipe_removed_then_disconnected_once_and_can_reconnect() {
    // GIVEN: A connected client
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let counts = ObserverCounts::attach(&client);
    connect(&client).await;
    assert!(client.is_connected());

    // WHEN: The runtime hangs up
    runtime.drop_request_connections();

    // THEN: Disconnected, notified once, requests fail fast
    wait_until(|| !client.is_connected(), "pipe removal").await;
    assert_eq!(counts.disconnected(), 1);
    assert!(matches!(
        client.send_request(Ping { timestamp: 1 }).await,
        Err(ClientError::NotConnected { .. })
    ));

    // WHEN: Connecting again
    connect(&client).await;

    // THEN: Connected on a new pipe, with a second connected notification
    assert!(client.is_connected());
    assert_eq!(runtime.connections(), 2);
    assert_eq!(counts.connected(), 2);
    assert_eq!(counts.disconnected(), 1);
}

#[tokio::test]
async fn given_connected_client_when_connect_again_then_ignored() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let counts = ObserverCounts::attach(&client);
    connect(&client).await;

    connect(&client).await;

    assert!(client.is_connected());
    assert_eq!(runtime.connections(), 1);
    assert_eq!(counts.connected(), 1);
}

/// **VALUE**: `disconnect()` fails a request that is waiting for its reply.
///
/// **WHY THIS MATTERS**: A request holds the session lock. If closing could not
/// interrupt it, `disconnect()` would wait out the full receive timeout.
///
/// **BUG THIS CATCHES**: Closing the request socket only after taking the session
/// lock.
#[tokio::test]
async fn given_request_in_flight_when_disconnect_then_request_fails_promptly() {
    // GIVEN: A connected client and a runtime that never answers queries
    let runtime = FakeRuntime::start(answering(|_| Reply::Never))
        .await
        .with_receive_timeout(Duration::from_secs(10));
    let client = runtime.client();
    connect(&client).await;

    let request_client = client.clone();
    let request = tokio::spawn(async move {
        request_client
            .send_request(ResourceRequest::new(ResourceCode::RuntimeState))
            .await
    });
    wait_until(|| runtime.requests().len() == 2, "query to reach the runtime").await;

    // WHEN: Disconnecting
    let started = Instant::now();
    client.disconnect().await;

    // THEN: Both the request and disconnect finished well inside the timeout
    let result = request.await.expect("request task");
    assert!(matches!(result, Err(ClientError::Transport { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(!client.is_connected());
}

/// **VALUE**: A reply that arrives after its request timed out is not mistaken for
/// the reply to the next request.
///
/// **BUG THIS CATCHES**: Reading the next frame off the pipe without checking the
/// request id, which shifts every later reply by one.
#[tokio::test]
async fn given_late_reply_when_next_request_sent_then_late_reply_is_discarded() {
    // GIVEN: A runtime that answers state queries too late
    let runtime = FakeRuntime::start(answering(|_| {
        Reply::Delayed(Duration::from_millis(400), Response::ok("2"))
    }))
    .await
    .with_receive_timeout(Duration::from_millis(300));
    let client = runtime.client();
    connect(&client).await;

    // WHEN: A query times out, then a ping follows
    let query = client.get_runtime_state().await;
    let pong = client.ping(42).await;

    // THEN: The query timed out and the ping got its own answer
    assert!(matches!(query, Err(ClientError::Timeout { .. })));
    assert_eq!(pong.expect("pong").timestamp, 42);
}
