use crate::message::{ProtocolEvent, ProtocolEventMessage, ProtocolRequest, RuntimeState};

use std::path::PathBuf;
use std::time::SystemTime;

use log::info;

/// Where the current protocol run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No protocol loaded yet.
    Idle,
    /// A protocol is loaded (or a run was created) and no task is running.
    Ready,
    Running { task_index: usize },
    /// A task ended before the last one; the run can be restarted.
    Stopped { task_index: usize },
    Completed,
}

/// Which runtime commands make sense right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub next: bool,
}

/// One protocol run announced by `PROTOCOL_NEW`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub protocol: ProtocolRequest,
    pub started_at: SystemTime,
    pub data_file: Option<PathBuf>,
}

/// Mirrors the runtime's protocol state from its broadcasts.
///
/// Feed every `PROTOCOL` event to [`apply`](Self::apply) in the order
/// received.
#[derive(Debug, Clone)]
pub struct ProtocolTracker {
    graphics_ready: bool,
    runtime_state: RuntimeState,
    protocol: Option<ProtocolRequest>,
    run_uuid: Option<String>,
    data_file: Option<PathBuf>,
    phase: RunPhase,
    history: Vec<RunRecord>,
}

impl Default for ProtocolTracker {
    fn default() -> Self {
        Self {
            graphics_ready: false,
            runtime_state: RuntimeState::Default,
            protocol: None,
            run_uuid: None,
            data_file: None,
            phase: RunPhase::Idle,
            history: Vec::new(),
        }
    }
}

impl ProtocolTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ProtocolEventMessage) {
        match event.event {
            ProtocolEvent::GraphicsReady => {
                self.graphics_ready = true;
                self.runtime_state = RuntimeState::Standby;
                info!("Graphics initialized and ready");
            }
            ProtocolEvent::ProtocolLoaded => {
                let protocol = ProtocolRequest {
                    name: event.protocol_name.clone(),
                    participant_id: event.participant_id.clone(),
                    notes: event.notes.clone(),
                    tasks: event.tasks.clone(),
                    protocol_uuid: String::new(),
                };
                info!(
                    "Protocol '{}' loaded with {} task(s)",
                    protocol.name,
                    protocol.tasks.len()
                );
                self.protocol = Some(protocol);
                self.phase = RunPhase::Ready;
            }
            ProtocolEvent::ProtocolNew => {
                self.run_uuid = Some(event.protocol_uuid.clone());
                self.data_file =
                    (!event.file_path.is_empty()).then(|| PathBuf::from(&event.file_path));

                if let Some(protocol) = self.protocol.as_mut() {
                    protocol.protocol_uuid = event.protocol_uuid.clone();
                    self.history.insert(
                        0,
                        RunRecord {
                            protocol: protocol.clone(),
                            started_at: SystemTime::now(),
                            data_file: self.data_file.clone(),
                        },
                    );
                }

                info!(
                    "Protocol run started (UUID: {}, file: {})",
                    event.protocol_uuid, event.file_path
                );
                self.phase = RunPhase::Ready;
            }
            ProtocolEvent::TaskStart => {
                let task_index = usize::try_from(event.data).unwrap_or(usize::MAX);
                info!(
                    "Task {}/{} started: {}",
                    task_index.saturating_add(1),
                    self.total_tasks(),
                    self.task_name(task_index).unwrap_or("Unknown")
                );
                self.phase = RunPhase::Running { task_index };
            }
            ProtocolEvent::TaskEnd => {
                let task_index = self.current_task_index().unwrap_or(0);
                if self.is_last_task(task_index) {
                    info!("Protocol '{}' completed", self.protocol_name());
                    self.phase = RunPhase::Completed;
                } else {
                    info!(
                        "Task {} ended: {}",
                        task_index + 1,
                        self.task_name(task_index).unwrap_or("Unknown")
                    );
                    self.phase = RunPhase::Stopped { task_index };
                }
            }
        }
    }

    /// Forget everything, for when the runtime goes away.
    pub fn reset(&mut self) {
        let history = std::mem::take(&mut self.history);
        *self = Self {
            history,
            ..Self::default()
        };
    }

    pub fn controls(&self) -> Controls {
        match self.phase {
            RunPhase::Idle => Controls::default(),
            RunPhase::Ready | RunPhase::Stopped { .. } | RunPhase::Completed => Controls {
                start: true,
                ..Controls::default()
            },
            RunPhase::Running { task_index } => Controls {
                start: false,
                stop: true,
                next: !self.is_last_task(task_index),
            },
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn graphics_ready(&self) -> bool {
        self.graphics_ready
    }

    pub fn runtime_state(&self) -> RuntimeState {
        self.runtime_state
    }

    /// Record a state learned some other way, such as a resource query.
    pub fn set_runtime_state(&mut self, state: RuntimeState) {
        self.runtime_state = state;
        if state != RuntimeState::Default {
            self.graphics_ready = true;
        }
    }

    pub fn protocol(&self) -> Option<&ProtocolRequest> {
        self.protocol.as_ref()
    }

    pub fn run_uuid(&self) -> Option<&str> {
        self.run_uuid.as_deref()
    }

    /// Data file of the current run; ready to collect once the run completed.
    pub fn data_file(&self) -> Option<&PathBuf> {
        self.data_file.as_ref()
    }

    /// Runs seen so far, newest first.
    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    pub fn current_task_index(&self) -> Option<usize> {
        match self.phase {
            RunPhase::Running { task_index } | RunPhase::Stopped { task_index } => Some(task_index),
            _ => None,
        }
    }

    pub fn total_tasks(&self) -> usize {
        self.protocol.as_ref().map_or(0, |protocol| protocol.tasks.len())
    }

    pub fn task_name(&self, index: usize) -> Option<&str> {
        self.protocol
            .as_ref()
            .and_then(|protocol| protocol.tasks.get(index))
            .map(|task| task.name.as_str())
    }

    fn protocol_name(&self) -> &str {
        self.protocol
            .as_ref()
            .map_or("Unknown", |protocol| protocol.name.as_str())
    }

    fn is_last_task(&self, index: usize) -> bool {
        index.saturating_add(1) >= self.total_tasks()
    }
}
