use crate::client_tests::helpers::{FakeRuntime, Reply, accepting, answering, connect};

use client_core::client::AvailableMonitors;
use client_core::error::ClientError;
use client_core::message::{
    Command, CommandRequest, PipelineConfigRequest, ProtocolRequest, Response, RuntimeState,
    TaskInfo,
};

use serde_json::json;

/// **VALUE**: End-to-end runtime state query, from request to typed result.
///
/// **WHY THIS MATTERS**: The runtime answers with a bare integer inside the
/// payload string. The client must send the right resource code and map the
/// integer onto the right variant.
///
/// **BUG THIS CATCHES**: Renumbered resource codes or runtime states.
#[tokio::test]
async fn given_standby_runtime_when_get_runtime_state_then_returns_standby() {
    // GIVEN: A runtime answering resource code 0 with "1"
    let runtime = FakeRuntime::start(answering(|request| {
        if request.get("resource_code") == Some(&json!(0)) {
            Reply::Now(Response::ok("1"))
        } else {
            Reply::Now(Response::rejected(1, "unexpected request"))
        }
    }))
    .await;
    let client = runtime.client();
    connect(&client).await;

    // WHEN: Querying the runtime state
    let state = client.get_runtime_state().await;

    // THEN: Standby
    assert_eq!(state.expect("runtime state"), RuntimeState::Standby);
    assert_eq!(runtime.requests()[1], json!({"resource_code": 0}));
}

/// **VALUE**: A refused protocol comes back as a typed rejection carrying the
/// runtime's message.
///
/// **WHY THIS MATTERS**: The operator needs to see why the runtime refused the
/// protocol, and the caller must be able to tell refusal from no answer.
///
/// **BUG THIS CATCHES**: Treating `success: false` as success, or folding it into
/// a transport error.
#[tokio::test]
async fn given_protocol_without_tasks_when_sent_then_rejected_with_runtime_message() {
    // GIVEN: A runtime that refuses protocols
    let runtime = FakeRuntime::start(answering(|request| {
        if request.get("participant_id").is_some() {
            Reply::Now(Response::rejected(1, "no tasks"))
        } else {
            Reply::Now(Response::ok(""))
        }
    }))
    .await;
    let client = runtime.client();
    connect(&client).await;

    // WHEN: Sending an empty protocol
    let protocol = ProtocolRequest::new("Foo", "P01");
    let result = client.send_protocol(&protocol).await;

    // THEN: Rejected with the runtime's message
    match result {
        Err(ClientError::Rejected { message, .. }) => assert_eq!(message, "no tasks"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    assert!(client.is_connected());
    assert_eq!(
        runtime.requests()[1],
        json!({
            "name": "Foo",
            "participant_id": "P01",
            "notes": "",
            "tasks": [],
            "protocol_uuid": ""
        })
    );
}

#[tokio::test]
async fn given_connected_client_when_ping_then_timestamp_is_echoed() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    connect(&client).await;

    let pong = client.ping(1_700_000_000).await.expect("pong");

    assert_eq!(pong.timestamp, 1_700_000_000);
}

#[tokio::test]
async fn given_monitor_list_when_queried_then_decodes_monitor_info() {
    let runtime = FakeRuntime::start(answering(|_| {
        Reply::Now(Response::ok(
            json!([{
                "index": 0,
                "width_px": 2560,
                "height_px": 1440,
                "width_mm": 597,
                "height_mm": 336,
                "refresh_rate": 144,
                "name": "DP-1"
            }])
            .to_string(),
        ))
    }))
    .await;
    let client = runtime.client();
    connect(&client).await;

    let monitors = client.query::<AvailableMonitors>().await.expect("monitors");

    assert_eq!(monitors.len(), 1);
    assert_eq!(monitors[0].name, "DP-1");
    assert_eq!(monitors[0].refresh_rate, 144);
    assert_eq!(runtime.requests()[1], json!({"resource_code": 1}));
}

#[tokio::test]
async fn given_commands_when_sent_then_routed_by_origin_and_destination() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    connect(&client).await;

    client.send_command(Command::Start).await.expect("start");
    client
        .send_routed_command(CommandRequest::new(Command::Exit).with_route("ui", "runtime"))
        .await
        .expect("exit");

    let requests = runtime.requests();
    assert_eq!(
        requests[1],
        json!({"command": 0, "origin": "client", "destination": "graphics"})
    );
    assert_eq!(
        requests[2],
        json!({"command": 5, "origin": "ui", "destination": "runtime"})
    );
}

#[tokio::test]
async fn given_pipeline_config_when_sent_then_runtime_receives_it() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    connect(&client).await;

    let config = PipelineConfigRequest::new("ddpi_ipc_source")
        .with_filter("kalman")
        .with_stages(["saccade_detector"]);
    client.send_pipeline_config(config).await.expect("pipeline");

    assert_eq!(runtime.requests()[1]["pipeline_filter"], json!("kalman"));
}

/// **VALUE**: A success without the payload the operation needs is a decode
/// failure, not a default value.
///
/// **BUG THIS CATCHES**: Decoding `""` into an empty list or a default state.
#[tokio::test]
async fn given_empty_payload_when_payload_required_then_decode_error() {
    let runtime = FakeRuntime::start(accepting()).await;
    let client = runtime.client();
    connect(&client).await;

    let result = client.get_current_task().await;

    assert!(matches!(result, Err(ClientError::Decode { .. })));
}

#[tokio::test]
async fn given_malformed_payload_when_decoded_then_decode_error_and_session_survives() {
    let runtime = FakeRuntime::start(answering(|request| {
        if request.get("resource_code").is_some() {
            Reply::Now(Response::ok("{\"name\": 7}"))
        } else {
            Reply::Now(Response::ok(""))
        }
    }))
    .await;
    let client = runtime.client();
    connect(&client).await;

    let task = client.get_current_task().await;
    let protocol = ProtocolRequest::new("Foo", "P01").with_task(TaskInfo::new("t", "{}"));
    let sent = client.send_protocol(&protocol).await;

    assert!(matches!(task, Err(ClientError::Decode { .. })));
    assert!(sent.is_ok());
}
