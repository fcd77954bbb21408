use crate::error::CodecError;
use crate::message::{
    self, BroadcastMessage, BroadcastTopic, Command, CommandRequest, GraphicsSettings,
    GraphicsSettingsRequest, Ping, PipelineConfigRequest, ProtocolEvent, ProtocolEventMessage,
    ProtocolRequest, Request, ResourceCode, ResourceRequest, Response, RuntimeState, TaskInfo,
};

use serde_json::{Value, json};

fn wire_json<T: serde::Serialize>(message: &T) -> Value {
    let bytes = message::encode(message).expect("encode");
    serde_json::from_slice(&bytes).expect("valid JSON")
}

/// **VALUE**: A full protocol survives encode then decode unchanged.
///
/// **WHY THIS MATTERS**: Protocols are the largest request the client sends and the
/// same shape is written to disk. Any field lost here is lost for the runtime too.
///
/// **BUG THIS CATCHES**: A `#[serde(skip)]` or rename on a nested task field.
#[test]
fn given_protocol_request_when_round_tripped_then_equals_original() {
    // GIVEN: A protocol with notes, two tasks and a UUID
    let protocol = ProtocolRequest::new("Foo", "P01")
        .with_notes("dim room")
        .with_task(TaskInfo::new("calibration", r#"{"points":9}"#))
        .with_task(TaskInfo::new("smooth_pursuit", "{}"));
    let protocol = ProtocolRequest {
        protocol_uuid: "abc".to_string(),
        ..protocol
    };

    // WHEN: Encoding and decoding as the same shape
    let bytes = message::encode(&protocol).expect("encode");
    let decoded: ProtocolRequest = message::decode(&bytes).expect("decode");

    // THEN: Nothing changed
    assert_eq!(decoded, protocol);
}

#[test]
fn given_graphics_settings_request_when_round_tripped_then_equals_original() {
    let request = GraphicsSettingsRequest {
        graphics_settings: GraphicsSettings {
            monitor_index: 1,
            full_screen: true,
            ..GraphicsSettings::default()
        },
        view_distance_mm: 600,
    };

    let decoded: GraphicsSettingsRequest =
        message::decode(&message::encode(&request).expect("encode")).expect("decode");

    assert_eq!(decoded, request);
}

/// **VALUE**: Requests go out as bare objects with no variant tag.
///
/// **WHY THIS MATTERS**: The runtime recognises the request kind from its field set.
/// A tag such as `{"Ping": {...}}` would make every request unrecognisable.
///
/// **BUG THIS CATCHES**: Removing `#[serde(untagged)]` from `Request`.
#[test]
fn given_request_variants_when_encoded_then_fields_are_top_level() {
    assert_eq!(
        wire_json(&Request::from(Ping { timestamp: 5 })),
        json!({"timestamp": 5})
    );
    assert_eq!(
        wire_json(&Request::from(ResourceRequest::new(ResourceCode::RuntimeState))),
        json!({"resource_code": 0})
    );
    assert_eq!(
        wire_json(&Request::from(CommandRequest::new(Command::Next))),
        json!({"command": 2, "origin": "client", "destination": "graphics"})
    );
}

#[test]
fn given_pipeline_config_when_encoded_then_optional_parts_default_to_empty() {
    let request = PipelineConfigRequest::new("ddpi_ipc_source").with_stages(["blink"]);

    assert_eq!(
        wire_json(&request),
        json!({
            "pipeline_source": "ddpi_ipc_source",
            "pipeline_calibration": "",
            "pipeline_filter": "",
            "pipeline_stages": ["blink"]
        })
    );
}

/// **VALUE**: Decoding into the wrong shape fails instead of producing defaults.
///
/// **WHY THIS MATTERS**: The client decodes payloads into the shape the request kind
/// promises. A silent partial decode would hand callers fabricated values.
///
/// **BUG THIS CATCHES**: Adding `#[serde(default)]` to a required field.
#[test]
fn given_mismatched_shape_when_decoded_then_returns_decode_error() {
    // GIVEN: A ping on the wire
    let bytes = message::encode(&Ping { timestamp: 1 }).expect("encode");

    // WHEN: Decoding it as a protocol
    let result = message::decode::<ProtocolRequest>(&bytes);

    // THEN: Decode error
    assert!(matches!(result, Err(CodecError::Decode { .. })));
}

#[test]
fn given_invalid_json_when_decoded_then_returns_decode_error() {
    let result = message::decode::<Response>(b"{not json");

    assert!(matches!(result, Err(CodecError::Decode { .. })));
}

/// **VALUE**: Enumerations are range checked on decode.
///
/// **BUG THIS CATCHES**: A resource code or event the client does not know being
/// mapped onto some default variant.
#[test]
fn given_out_of_range_enum_when_decoded_then_returns_decode_error() {
    let resource = message::decode::<ResourceRequest>(br#"{"resource_code": 42}"#);
    let event = message::decode_str::<ProtocolEventMessage>(
        r#"{"protocol_uuid": "abc", "event": 9, "data": 0}"#,
    );

    assert!(matches!(resource, Err(CodecError::Decode { .. })));
    assert!(matches!(event, Err(CodecError::Decode { .. })));
}

#[test]
fn given_wire_integers_when_converted_then_match_runtime_numbering() {
    assert_eq!(ResourceCode::try_from(1u32).ok(), Some(ResourceCode::AvailableMonitors));
    assert_eq!(ResourceCode::try_from(10u32).ok(), Some(ResourceCode::AvailableFilters));
    assert!(ResourceCode::try_from(11u32).is_err());

    assert_eq!(u8::from(Command::Start), 0);
    assert_eq!(u8::from(Command::Exit), 5);

    assert_eq!(RuntimeState::try_from(3u8).ok(), Some(RuntimeState::Saving));
    assert_eq!(u8::from(ProtocolEvent::ProtocolLoaded), 4);
}

#[test]
fn given_response_with_only_success_when_decoded_then_other_fields_default() {
    let response: Response = message::decode(br#"{"success": true}"#).expect("decode");

    assert_eq!(response, Response::ok(""));
}

#[test]
fn given_runtime_state_payload_when_decoded_then_returns_standby() {
    let response = Response::ok("1");

    let state: RuntimeState = message::decode_str(&response.payload).expect("decode");

    assert_eq!(state, RuntimeState::Standby);
}

/// **VALUE**: Protocol events with only the three core fields decode.
///
/// **WHY THIS MATTERS**: The runtime fills the protocol description only for
/// `PROTOCOL_LOADED`. Every other event carries uuid, event and data alone.
///
/// **BUG THIS CATCHES**: Making `tasks` or `file_path` required.
#[test]
fn given_minimal_protocol_event_when_decoded_then_optional_fields_are_empty() {
    let event: ProtocolEventMessage =
        message::decode_str(r#"{"protocol_uuid":"abc","event":2,"data":3}"#).expect("decode");

    assert_eq!(event, ProtocolEventMessage::new("abc", ProtocolEvent::TaskStart, 3));
    assert!(event.tasks.is_empty());
}

#[test]
fn given_broadcast_with_unknown_topic_when_decoded_then_envelope_survives() {
    let broadcast: BroadcastMessage =
        message::decode(br#"{"topic": 7, "payload": "x"}"#).expect("decode");

    assert_eq!(broadcast.topic_code, 7);
    assert_eq!(broadcast.topic(), None);
}

#[test]
fn given_broadcast_when_encoded_then_topic_is_integer_field() {
    let broadcast = BroadcastMessage::new(BroadcastTopic::Protocol, "{}");

    assert_eq!(wire_json(&broadcast), json!({"topic": 1, "payload": "{}"}));
}
