use super::request::TaskInfo;
use super::wire_enum;

use serde::{Deserialize, Serialize};

wire_enum! {
    pub enum BroadcastTopic: u8 {
        Log = 0,
        Protocol = 1,
    }
}

/// Publish/subscribe envelope.
///
/// `topic` stays a raw integer so frames with topics this client does not know
/// still decode and reach raw handlers. Use [`BroadcastMessage::topic`] for the
/// validated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "topic")]
    pub topic_code: u8,
    pub payload: String,
}

impl BroadcastMessage {
    pub fn new(topic: BroadcastTopic, payload: impl Into<String>) -> Self {
        Self {
            topic_code: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn topic(&self) -> Option<BroadcastTopic> {
        BroadcastTopic::try_from(self.topic_code).ok()
    }
}

wire_enum! {
    /// Points in the runtime's protocol execution state machine.
    pub enum ProtocolEvent: u8 {
        GraphicsReady = 0,
        ProtocolNew = 1,
        TaskStart = 2,
        TaskEnd = 3,
        ProtocolLoaded = 4,
    }
}

/// Payload of the `PROTOCOL` topic.
///
/// `data` is the zero-based task index for [`ProtocolEvent::TaskStart`]. The
/// protocol description fields are only filled for
/// [`ProtocolEvent::ProtocolLoaded`]; `file_path` names the run's data file on
/// [`ProtocolEvent::ProtocolNew`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEventMessage {
    pub protocol_uuid: String,
    pub event: ProtocolEvent,
    pub data: u64,
    #[serde(default)]
    pub protocol_name: String,
    #[serde(default)]
    pub participant_id: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tasks: Vec<TaskInfo>,
    #[serde(default)]
    pub file_path: String,
}

impl ProtocolEventMessage {
    pub fn new(protocol_uuid: impl Into<String>, event: ProtocolEvent, data: u64) -> Self {
        Self {
            protocol_uuid: protocol_uuid.into(),
            event,
            data,
            protocol_name: String::new(),
            participant_id: String::new(),
            notes: String::new(),
            tasks: Vec::new(),
            file_path: String::new(),
        }
    }
}
