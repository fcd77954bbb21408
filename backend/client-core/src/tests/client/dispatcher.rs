use crate::client::{RawHandler, SubscriptionRegistry, TopicEvent};
use crate::error::HandlerError;
use crate::message::{self, BroadcastMessage, BroadcastTopic, ProtocolEvent};

use std::sync::{Arc, Mutex};

fn frame(topic: BroadcastTopic, payload: &str) -> Vec<u8> {
    message::encode(&BroadcastMessage::new(topic, payload)).expect("encode")
}

fn recorder() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Arc<Mutex<Vec<String>>>, registry: &SubscriptionRegistry, topic: BroadcastTopic, name: &str) {
    let log = Arc::clone(log);
    let name = name.to_string();
    registry.add_topic_handler(
        topic,
        Arc::new(move |_| {
            log.lock().expect("lock").push(name.clone());
            Ok(())
        }),
    );
}

/// **VALUE**: A `PROTOCOL` broadcast reaches its handler decoded.
///
/// **WHY THIS MATTERS**: This is how the client learns which task the runtime is
/// running. `data` carries the zero-based task index for `TASK_START`.
///
/// **BUG THIS CATCHES**: Handing handlers the raw payload string, or decoding it
/// with the wrong shape.
#[test]
fn given_task_start_broadcast_when_dispatched_then_handler_gets_decoded_event() {
    // GIVEN: A protocol handler capturing what it receives
    let registry = SubscriptionRegistry::new();
    let received = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&received);
    registry.add_topic_handler(
        BroadcastTopic::Protocol,
        Arc::new(move |event| {
            *sink.lock().expect("lock") = Some(event.clone());
            Ok(())
        }),
    );

    // WHEN: Dispatching a TASK_START frame
    registry.dispatch(&frame(
        BroadcastTopic::Protocol,
        r#"{"protocol_uuid":"abc","event":2,"data":3}"#,
    ));

    // THEN: The handler saw TASK_START with data 3
    let event = received.lock().expect("lock").take();
    match event {
        Some(TopicEvent::Protocol(message)) => {
            assert_eq!(message.event, ProtocolEvent::TaskStart);
            assert_eq!(message.data, 3);
            assert_eq!(message.protocol_uuid, "abc");
        }
        other => panic!("expected a protocol event, got {other:?}"),
    }
}

/// **VALUE**: Frames are handled one at a time, in arrival order, with each
/// frame's handlers in registration order.
///
/// **WHY THIS MATTERS**: Protocol state is rebuilt from the event sequence. A
/// `TASK_END` handled before its `TASK_START` would corrupt it.
///
/// **BUG THIS CATCHES**: Grouping handlers by topic instead of by frame, or
/// running them out of registration order.
#[test]
fn given_frames_for_two_topics_when_dispatched_then_order_is_preserved() {
    // GIVEN: Two handlers on each topic
    let registry = SubscriptionRegistry::new();
    let log = recorder();
    record(&log, &registry, BroadcastTopic::Log, "log-1");
    record(&log, &registry, BroadcastTopic::Protocol, "protocol-1");
    record(&log, &registry, BroadcastTopic::Log, "log-2");
    record(&log, &registry, BroadcastTopic::Protocol, "protocol-2");

    // WHEN: A log frame then a protocol frame arrive
    registry.dispatch(&frame(BroadcastTopic::Log, "line"));
    registry.dispatch(&frame(
        BroadcastTopic::Protocol,
        r#"{"protocol_uuid":"","event":0,"data":0}"#,
    ));

    // THEN: All log handlers ran before any protocol handler
    assert_eq!(
        *log.lock().expect("lock"),
        vec!["log-1", "log-2", "protocol-1", "protocol-2"]
    );
}

#[test]
fn given_malformed_frame_when_dispatched_then_next_frame_still_delivered() {
    let registry = SubscriptionRegistry::new();
    let log = recorder();
    record(&log, &registry, BroadcastTopic::Log, "log");

    registry.dispatch(b"{\"topic\": 0, \"payl");
    registry.dispatch(b"\xff\xfe");
    registry.dispatch(&frame(BroadcastTopic::Log, "line"));

    assert_eq!(*log.lock().expect("lock"), vec!["log"]);
}

/// **VALUE**: A failing or panicking handler does not stop the handlers after it.
///
/// **BUG THIS CATCHES**: Propagating a handler error with `?` out of the frame
/// loop, or letting a panic unwind through the dispatcher.
#[test]
fn given_failing_handlers_when_dispatched_then_later_handlers_still_run() {
    // GIVEN: An erroring handler, a panicking handler, then a recording one
    let registry = SubscriptionRegistry::new();
    registry.add_topic_handler(
        BroadcastTopic::Log,
        Arc::new(|_| Err(HandlerError::new("handler refused"))),
    );
    registry.add_topic_handler(BroadcastTopic::Log, Arc::new(|_| panic!("handler bug")));
    let log = recorder();
    record(&log, &registry, BroadcastTopic::Log, "survivor");

    // WHEN: Two frames arrive
    registry.dispatch(&frame(BroadcastTopic::Log, "one"));
    registry.dispatch(&frame(BroadcastTopic::Log, "two"));

    // THEN: The last handler ran for both
    assert_eq!(*log.lock().expect("lock"), vec!["survivor", "survivor"]);
}

#[test]
fn given_raw_handler_when_dispatched_then_runs_after_topic_handlers_with_whole_frame() {
    let registry = SubscriptionRegistry::new();
    let log = recorder();
    record(&log, &registry, BroadcastTopic::Log, "topic");

    let raw_log = Arc::clone(&log);
    let frames = Arc::new(Mutex::new(Vec::new()));
    let raw_frames = Arc::clone(&frames);
    registry.add_raw_handler(Arc::new(move |bytes| {
        raw_log.lock().expect("lock").push("raw".to_string());
        raw_frames.lock().expect("lock").push(bytes.to_vec());
        Ok(())
    }));

    let sent = frame(BroadcastTopic::Log, "line");
    registry.dispatch(&sent);

    assert_eq!(*log.lock().expect("lock"), vec!["topic", "raw"]);
    assert_eq!(*frames.lock().expect("lock"), vec![sent]);
}

#[test]
fn given_unknown_topic_when_dispatched_then_only_raw_handlers_run() {
    let registry = SubscriptionRegistry::new();
    let log = recorder();
    record(&log, &registry, BroadcastTopic::Log, "topic");
    let raw_log = Arc::clone(&log);
    registry.add_raw_handler(Arc::new(move |_| {
        raw_log.lock().expect("lock").push("raw".to_string());
        Ok(())
    }));

    registry.dispatch(br#"{"topic": 9, "payload": ""}"#);

    assert_eq!(*log.lock().expect("lock"), vec!["raw"]);
}

#[test]
fn given_undecodable_protocol_payload_when_dispatched_then_topic_handlers_skipped() {
    let registry = SubscriptionRegistry::new();
    let log = recorder();
    record(&log, &registry, BroadcastTopic::Protocol, "protocol");

    registry.dispatch(&frame(BroadcastTopic::Protocol, "not json"));

    assert!(log.lock().expect("lock").is_empty());
}

#[test]
fn given_raw_handlers_when_cleared_then_topic_handlers_remain() {
    let registry = SubscriptionRegistry::new();
    registry.add_raw_handler(Arc::new(|_| Ok(())));
    registry.add_topic_handler(BroadcastTopic::Log, Arc::new(|_| Ok(())));

    registry.clear_raw_handlers();

    assert_eq!(registry.raw_handler_count(), 0);
    assert_eq!(registry.topic_handler_count(BroadcastTopic::Log), 1);
}

/// **VALUE**: One raw handler can be removed while the others keep receiving.
///
/// **BUG THIS CATCHES**: Removal by position or by clearing the whole list.
#[test]
fn given_two_raw_handlers_when_one_removed_then_only_the_other_runs() {
    // GIVEN: Two recording raw handlers
    let registry = SubscriptionRegistry::new();
    let log = recorder();
    let first_log = Arc::clone(&log);
    let first: RawHandler = Arc::new(move |_: &[u8]| {
        first_log.lock().expect("lock").push("first".to_string());
        Ok(())
    });
    let second_log = Arc::clone(&log);
    let second: RawHandler = Arc::new(move |_: &[u8]| {
        second_log.lock().expect("lock").push("second".to_string());
        Ok(())
    });
    registry.add_raw_handler(Arc::clone(&first));
    registry.add_raw_handler(second);

    // WHEN: Removing the first, then dispatching
    let removed = registry.remove_raw_handler(&first);
    registry.dispatch(&frame(BroadcastTopic::Log, "hello"));

    // THEN: Only the second ran, and a second removal finds nothing
    assert!(removed);
    assert_eq!(*log.lock().expect("lock"), vec!["second"]);
    assert!(!registry.remove_raw_handler(&first));
    assert_eq!(registry.raw_handler_count(), 1);
}

/// **VALUE**: A handler may register further handlers mid-dispatch.
///
/// **BUG THIS CATCHES**: Holding the registry lock while handlers run, which
/// deadlocks as soon as a handler subscribes.
#[test]
fn given_handler_that_registers_when_dispatched_then_new_handler_applies_from_next_frame() {
    let registry = Arc::new(SubscriptionRegistry::new());
    let log = recorder();

    let nested_registry = Arc::clone(&registry);
    let nested_log = Arc::clone(&log);
    registry.add_topic_handler(
        BroadcastTopic::Log,
        Arc::new(move |_| {
            if nested_registry.topic_handler_count(BroadcastTopic::Log) == 1 {
                record(&nested_log, &nested_registry, BroadcastTopic::Log, "late");
            }
            Ok(())
        }),
    );

    registry.dispatch(&frame(BroadcastTopic::Log, "one"));
    assert!(log.lock().expect("lock").is_empty());

    registry.dispatch(&frame(BroadcastTopic::Log, "two"));
    assert_eq!(*log.lock().expect("lock"), vec!["late"]);
}
