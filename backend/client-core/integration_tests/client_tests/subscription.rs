use crate::client_tests::helpers::{FakeRuntime, accepting, config_for, wait_until};

use client_core::ReyerClient;
use client_core::client::{RawHandler, TopicEvent, TopicHandler};
use client_core::error::ClientError;
use client_core::message::{BroadcastMessage, BroadcastTopic, ProtocolEvent, ProtocolEventMessage};
use client_core::transport::{SpProtocol, handshake};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::oneshot;

fn collector<T>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn len<T>(items: &Arc<Mutex<Vec<T>>>) -> usize {
    items.lock().expect("lock").len()
}

/// **VALUE**: A `TASK_START` broadcast from the runtime reaches a protocol handler
/// decoded.
///
/// **WHY THIS MATTERS**: This is the path the UI uses to follow a running
/// protocol. It crosses the publish socket, the dispatcher task and the topic
/// registry.
///
/// **BUG THIS CATCHES**: A dispatcher that never starts, or that routes by the
/// wrong topic number.
#[tokio::test]
async fn given_protocol_subscription_when_task_start_published_then_handler_receives_it() {
    // GIVEN: A client subscribed to protocol events
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let events = collector::<ProtocolEventMessage>();
    let sink = Arc::clone(&events);
    client
        .subscribe_protocol_events(move |event| {
            sink.lock().expect("lock").push(event.clone());
            Ok(())
        })
        .await
        .expect("subscribe");
    runtime.wait_for_subscribers(1).await;

    // WHEN: The runtime publishes TASK_START for task 3
    runtime
        .publish(&BroadcastMessage::new(
            BroadcastTopic::Protocol,
            r#"{"protocol_uuid":"abc","event":2,"data":3}"#,
        ))
        .await;

    // THEN: The handler got it decoded
    wait_until(|| len(&events) == 1, "protocol event").await;
    let event = events.lock().expect("lock")[0].clone();
    assert_eq!(event.event, ProtocolEvent::TaskStart);
    assert_eq!(event.data, 3);
    assert!(client.is_subscribed());
}

/// **VALUE**: Broadcasts are delivered in publish order across topics.
///
/// **BUG THIS CATCHES**: Dispatching frames concurrently, which lets a later log
/// line overtake the protocol event before it.
#[tokio::test]
async fn given_mixed_topics_when_published_then_delivered_in_order() {
    // GIVEN: Handlers on both topics writing into one list
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let seen = collector::<String>();

    let log_sink = Arc::clone(&seen);
    client
        .subscribe_log(move |line| {
            log_sink.lock().expect("lock").push(format!("log:{line}"));
            Ok(())
        })
        .await
        .expect("subscribe log");
    let protocol_sink = Arc::clone(&seen);
    client
        .subscribe_protocol_events(move |event| {
            protocol_sink
                .lock()
                .expect("lock")
                .push(format!("protocol:{}", event.data));
            Ok(())
        })
        .await
        .expect("subscribe protocol");
    runtime.wait_for_subscribers(1).await;

    // WHEN: log, protocol, log are published
    runtime
        .publish(&BroadcastMessage::new(BroadcastTopic::Log, "first"))
        .await;
    runtime
        .publish(&BroadcastMessage::new(
            BroadcastTopic::Protocol,
            r#"{"protocol_uuid":"abc","event":3,"data":7}"#,
        ))
        .await;
    runtime
        .publish(&BroadcastMessage::new(BroadcastTopic::Log, "second"))
        .await;

    // THEN: Same order on the client, over a single subscription
    wait_until(|| len(&seen) == 3, "three broadcasts").await;
    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["log:first", "protocol:7", "log:second"]
    );
    assert_eq!(runtime.connections(), 0);
}

#[tokio::test]
async fn given_malformed_broadcast_when_published_then_later_broadcasts_still_arrive() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let lines = collector::<String>();
    let sink = Arc::clone(&lines);
    client
        .subscribe_log(move |line| {
            sink.lock().expect("lock").push(line.to_string());
            Ok(())
        })
        .await
        .expect("subscribe");
    runtime.wait_for_subscribers(1).await;

    runtime.publish_raw(b"{\"topic\": ").await;
    runtime
        .publish(&BroadcastMessage::new(BroadcastTopic::Log, "after"))
        .await;

    wait_until(|| len(&lines) == 1, "log line").await;
    assert_eq!(*lines.lock().expect("lock"), vec!["after"]);
}

#[tokio::test]
async fn given_raw_subscription_when_published_then_raw_handler_gets_frame_bytes() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let frames = collector::<Vec<u8>>();
    let sink = Arc::clone(&frames);
    let handler: RawHandler = Arc::new(move |frame: &[u8]| {
        sink.lock().expect("lock").push(frame.to_vec());
        Ok(())
    });
    client
        .subscribe(Some(handler))
        .await
        .expect("subscribe");
    runtime.wait_for_subscribers(1).await;

    let broadcast = BroadcastMessage::new(BroadcastTopic::Log, "raw");
    runtime.publish(&broadcast).await;

    wait_until(|| len(&frames) == 1, "raw frame").await;
    let expected = serde_json::to_vec(&broadcast).expect("encode");
    assert_eq!(frames.lock().expect("lock")[0], expected);

    client.unsubscribe_raw();
    runtime.publish(&broadcast).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(len(&frames), 1);
}

/// **VALUE**: `disconnect()` stops a dispatcher that is blocked waiting for a
/// broadcast, well before its receive timeout.
///
/// **WHY THIS MATTERS**: A quiet runtime can go minutes without publishing. The
/// application must still be able to shut down promptly.
///
/// **BUG THIS CATCHES**: Joining the dispatcher before closing its socket, which
/// waits out the receive timeout or hangs.
#[tokio::test]
async fn given_idle_subscription_when_disconnect_then_dispatcher_stops_promptly() {
    // GIVEN: A subscribed client with a long receive timeout and no traffic
    let runtime = FakeRuntime::start(accepting())
        .await
        .with_receive_timeout(Duration::from_secs(10));
    let client = runtime.client();
    let handler: TopicHandler = Arc::new(|_: &TopicEvent| Ok(()));
    client
        .subscribe_to_topic(BroadcastTopic::Log, handler)
        .await
        .expect("subscribe");
    runtime.wait_for_subscribers(1).await;
    assert!(client.is_subscribed());

    // WHEN: Disconnecting
    let started = Instant::now();
    client.disconnect().await;

    // THEN: The dispatcher is gone and disconnect did not wait for the timeout
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!client.is_subscribed());
}

#[tokio::test]
async fn given_no_publisher_when_subscribe_then_subscription_error() {
    let dir = TempDir::new().expect("temp dir");
    let client =
        ReyerClient::new(config_for(dir.path(), Duration::from_millis(200))).expect("client");

    let result = client.subscribe(None).await;

    assert!(matches!(result, Err(ClientError::Subscription { .. })));
    assert!(!client.is_subscribed());
}

/// **VALUE**: After the runtime hangs up the publish pipe, `subscribe(None)`
/// restores delivery to the handlers registered before the hang-up.
///
/// **WHY THIS MATTERS**: A runtime restart drops every subscriber. Without a way
/// back, every protocol event after the restart is lost and the tracker goes
/// stale.
///
/// **BUG THIS CATCHES**: Handlers dropped with the old dispatcher, registered a
/// second time on resubscribe, or `is_subscribed()` staying true after the
/// publisher left.
#[tokio::test]
async fn given_publisher_hang_up_when_resubscribed_then_existing_handlers_receive_again() {
    // GIVEN: A subscribed client whose publisher hangs up
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    let events = collector::<ProtocolEventMessage>();
    let sink = Arc::clone(&events);
    client
        .subscribe_protocol_events(move |event| {
            sink.lock().expect("lock").push(event.clone());
            Ok(())
        })
        .await
        .expect("subscribe");
    runtime.wait_for_subscribers(1).await;

    runtime.drop_subscribers().await;
    wait_until(|| !client.is_subscribed(), "dispatcher to stop").await;

    // WHEN: Resubscribing and publishing TASK_START
    client.subscribe(None).await.expect("resubscribe");
    runtime.wait_for_subscribers(1).await;
    runtime
        .publish(&BroadcastMessage::new(
            BroadcastTopic::Protocol,
            r#"{"protocol_uuid":"abc","event":2,"data":3}"#,
        ))
        .await;

    // THEN: The original handler got it exactly once
    wait_until(|| len(&events) == 1, "protocol event after resubscribe").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(len(&events), 1);
    assert!(client.is_subscribed());
}

/// **VALUE**: A `disconnect()` that overlaps a subscribe still leaves no
/// dispatcher running when it returns.
///
/// **WHY THIS MATTERS**: Subscribing dials under the session lock. A disconnect
/// arriving during the dial finds no dispatcher yet and must not let the one
/// installed right after outlive it.
///
/// **BUG THIS CATCHES**: Taking the dispatcher slot only before waiting for the
/// session lock.
#[tokio::test]
async fn given_subscribe_in_progress_when_disconnect_then_no_dispatcher_survives() {
    // GIVEN: A publisher that accepts at once but answers the handshake late
    let dir = TempDir::new().expect("temp dir");
    let listener = UnixListener::bind(dir.path().join("pub.sock")).expect("bind publish socket");
    let (accepted_tx, accepted_rx) = oneshot::channel();
    let publisher = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _ = accepted_tx.send(());
        tokio::time::sleep(Duration::from_millis(300)).await;
        handshake(&mut stream, SpProtocol::Pub0)
            .await
            .expect("handshake");
        stream
    });

    let client =
        ReyerClient::new(config_for(dir.path(), Duration::from_secs(10))).expect("client");
    let subscriber = client.clone();
    let subscribing = tokio::spawn(async move { subscriber.subscribe(None).await });
    accepted_rx.await.expect("publisher accepted");

    // WHEN: Disconnecting while the subscribe is still dialing
    client.disconnect().await;

    // THEN: The dispatcher the subscribe installed is already gone
    assert!(!client.is_subscribed());
    let subscribed = subscribing.await.expect("subscribe task");
    assert!(subscribed.is_ok());
    let _stream = publisher.await.expect("publisher task");
    assert!(!client.is_subscribed());
}
