use super::wire_enum;

use serde::{Deserialize, Serialize};

/// Liveness probe. The runtime answers with a [`Pong`](super::Pong) inside the
/// response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: u64,
}

wire_enum! {
    /// Resource kinds understood by [`ResourceRequest`].
    pub enum ResourceCode: u32 {
        RuntimeState = 0,
        AvailableMonitors = 1,
        AvailableSources = 2,
        AvailableStages = 3,
        AvailableSinks = 4,
        AvailableTasks = 5,
        CurrentGraphicsSettings = 6,
        CurrentProtocol = 7,
        CurrentTask = 8,
        AvailableCalibrations = 9,
        AvailableFilters = 10,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub resource_code: ResourceCode,
}

impl ResourceRequest {
    pub fn new(resource_code: ResourceCode) -> Self {
        Self { resource_code }
    }
}

wire_enum! {
    /// Commands for the runtime's graphics manager.
    ///
    /// Numbered as the desktop client sends them. The runtime's own header
    /// lists only START, STOP, NEXT, EXIT (EXIT = 3); the two disagree on EXIT
    /// and this numbering is the one deployed clients use.
    pub enum Command: u8 {
        Start = 0,
        Stop = 1,
        Next = 2,
        Previous = 3,
        Restart = 4,
        Exit = 5,
    }
}

const DEFAULT_COMMAND_ORIGIN: &str = "client";
const DEFAULT_COMMAND_DESTINATION: &str = "graphics";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: Command,
    pub origin: String,
    pub destination: String,
}

impl CommandRequest {
    /// Command addressed from the client to the graphics manager.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            origin: DEFAULT_COMMAND_ORIGIN.to_string(),
            destination: DEFAULT_COMMAND_DESTINATION.to_string(),
        }
    }

    pub fn with_route(mut self, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        self.origin = origin.into();
        self.destination = destination.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfigRequest {
    pub pipeline_source: String,
    #[serde(default)]
    pub pipeline_calibration: String,
    #[serde(default)]
    pub pipeline_filter: String,
    #[serde(default)]
    pub pipeline_stages: Vec<String>,
}

impl PipelineConfigRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            pipeline_source: source.into(),
            pipeline_calibration: String::new(),
            pipeline_filter: String::new(),
            pipeline_stages: Vec::new(),
        }
    }

    pub fn with_calibration(mut self, calibration: impl Into<String>) -> Self {
        self.pipeline_calibration = calibration.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.pipeline_filter = filter.into();
        self
    }

    pub fn with_stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline_stages = stages.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsSettings {
    pub monitor_index: i32,
    pub vsync: bool,
    pub anti_aliasing: bool,
    pub full_screen: bool,
    pub target_fps: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self {
            monitor_index: 0,
            vsync: true,
            anti_aliasing: false,
            full_screen: false,
            target_fps: 60,
            width: 1920,
            height: 1080,
        }
    }
}

/// Graphics initialisation, sent once the operator has picked a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsSettingsRequest {
    pub graphics_settings: GraphicsSettings,
    pub view_distance_mm: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    /// JSON document conforming to the task plugin's configuration schema.
    #[serde(default)]
    pub configuration: String,
}

impl TaskInfo {
    pub fn new(name: impl Into<String>, configuration: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configuration: configuration.into(),
        }
    }
}

/// A complete experiment protocol: ordered tasks for one participant.
///
/// This is also the on-disk shape used by
/// [`ProtocolStorage`](crate::storage::ProtocolStorage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRequest {
    pub name: String,
    pub participant_id: String,
    pub notes: String,
    pub tasks: Vec<TaskInfo>,
    /// Empty lets the runtime assign one.
    #[serde(default)]
    pub protocol_uuid: String,
}

impl ProtocolRequest {
    pub fn new(name: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            participant_id: participant_id.into(),
            notes: String::new(),
            tasks: Vec::new(),
            protocol_uuid: String::new(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_task(mut self, task: TaskInfo) -> Self {
        self.tasks.push(task);
        self
    }
}

/// Every request the client can put on the request channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Ping(Ping),
    Resource(ResourceRequest),
    PipelineConfig(PipelineConfigRequest),
    GraphicsSettings(GraphicsSettingsRequest),
    Command(CommandRequest),
    Protocol(ProtocolRequest),
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Ping(_) => "Ping",
            Request::Resource(_) => "ResourceRequest",
            Request::PipelineConfig(_) => "PipelineConfigRequest",
            Request::GraphicsSettings(_) => "GraphicsSettingsRequest",
            Request::Command(_) => "CommandRequest",
            Request::Protocol(_) => "ProtocolRequest",
        }
    }
}

impl From<Ping> for Request {
    fn from(value: Ping) -> Self {
        Request::Ping(value)
    }
}

impl From<ResourceRequest> for Request {
    fn from(value: ResourceRequest) -> Self {
        Request::Resource(value)
    }
}

impl From<PipelineConfigRequest> for Request {
    fn from(value: PipelineConfigRequest) -> Self {
        Request::PipelineConfig(value)
    }
}

impl From<GraphicsSettingsRequest> for Request {
    fn from(value: GraphicsSettingsRequest) -> Self {
        Request::GraphicsSettings(value)
    }
}

impl From<CommandRequest> for Request {
    fn from(value: CommandRequest) -> Self {
        Request::Command(value)
    }
}

impl From<ProtocolRequest> for Request {
    fn from(value: ProtocolRequest) -> Self {
        Request::Protocol(value)
    }
}
