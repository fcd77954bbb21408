use crate::message::{ProtocolEvent, ProtocolEventMessage, RuntimeState, TaskInfo};
use crate::protocol::{Controls, ProtocolTracker, RunPhase};

use std::path::Path;

fn loaded(tasks: usize) -> ProtocolEventMessage {
    let mut event = ProtocolEventMessage::new("", ProtocolEvent::ProtocolLoaded, 0);
    event.protocol_name = "Foo".to_string();
    event.participant_id = "P01".to_string();
    event.tasks = (0..tasks)
        .map(|index| TaskInfo::new(format!("task-{index}"), "{}"))
        .collect();
    event
}

fn event(kind: ProtocolEvent, data: u64) -> ProtocolEventMessage {
    ProtocolEventMessage::new("run-1", kind, data)
}

#[test]
fn given_new_tracker_when_queried_then_nothing_is_enabled() {
    let tracker = ProtocolTracker::new();

    assert_eq!(tracker.phase(), RunPhase::Idle);
    assert_eq!(tracker.controls(), Controls::default());
    assert!(!tracker.graphics_ready());
}

#[test]
fn given_graphics_ready_when_applied_then_runtime_is_standby() {
    let mut tracker = ProtocolTracker::new();

    tracker.apply(&event(ProtocolEvent::GraphicsReady, 0));

    assert!(tracker.graphics_ready());
    assert_eq!(tracker.runtime_state(), RuntimeState::Standby);
}

#[test]
fn given_loaded_protocol_when_applied_then_only_start_is_enabled() {
    let mut tracker = ProtocolTracker::new();

    tracker.apply(&loaded(3));

    assert_eq!(tracker.total_tasks(), 3);
    assert_eq!(tracker.protocol().map(|p| p.name.as_str()), Some("Foo"));
    assert_eq!(
        tracker.controls(),
        Controls {
            start: true,
            stop: false,
            next: false
        }
    );
}

/// **VALUE**: NEXT is offered on every task but the last.
///
/// **WHY THIS MATTERS**: Sending NEXT on the final task has nothing to advance to.
///
/// **BUG THIS CATCHES**: An off-by-one between the zero-based `data` index and
/// the task count.
#[test]
fn given_running_tasks_when_started_then_next_disabled_on_last_task() {
    // GIVEN: A loaded three-task protocol
    let mut tracker = ProtocolTracker::new();
    tracker.apply(&loaded(3));

    // WHEN: The second task starts
    tracker.apply(&event(ProtocolEvent::TaskStart, 1));

    // THEN: STOP and NEXT are available
    assert_eq!(tracker.phase(), RunPhase::Running { task_index: 1 });
    assert_eq!(tracker.task_name(1), Some("task-1"));
    assert_eq!(
        tracker.controls(),
        Controls {
            start: false,
            stop: true,
            next: true
        }
    );

    // WHEN: The last task starts
    tracker.apply(&event(ProtocolEvent::TaskStart, 2));

    // THEN: NEXT is gone
    assert!(tracker.controls().stop);
    assert!(!tracker.controls().next);
}

#[test]
fn given_last_task_when_ended_then_run_is_completed() {
    let mut tracker = ProtocolTracker::new();
    tracker.apply(&loaded(2));
    tracker.apply(&event(ProtocolEvent::TaskStart, 1));

    tracker.apply(&event(ProtocolEvent::TaskEnd, 0));

    assert_eq!(tracker.phase(), RunPhase::Completed);
    assert!(tracker.controls().start);
}

#[test]
fn given_middle_task_when_ended_then_run_is_stopped_and_can_restart() {
    let mut tracker = ProtocolTracker::new();
    tracker.apply(&loaded(3));
    tracker.apply(&event(ProtocolEvent::TaskStart, 0));

    tracker.apply(&event(ProtocolEvent::TaskEnd, 0));

    assert_eq!(tracker.phase(), RunPhase::Stopped { task_index: 0 });
    assert_eq!(tracker.current_task_index(), Some(0));
    assert!(tracker.controls().start);
    assert!(!tracker.controls().stop);
}

#[test]
fn given_new_run_when_applied_then_recorded_in_history_with_data_file() {
    let mut tracker = ProtocolTracker::new();
    tracker.apply(&loaded(1));
    let mut new_run = event(ProtocolEvent::ProtocolNew, 0);
    new_run.file_path = "/data/run-1.h5".to_string();

    tracker.apply(&new_run);

    assert_eq!(tracker.run_uuid(), Some("run-1"));
    assert_eq!(
        tracker.data_file().map(|path| path.as_path()),
        Some(Path::new("/data/run-1.h5"))
    );
    assert_eq!(tracker.history().len(), 1);
    assert_eq!(tracker.history()[0].protocol.protocol_uuid, "run-1");
}

#[test]
fn given_tracker_when_reset_then_history_survives() {
    let mut tracker = ProtocolTracker::new();
    tracker.apply(&event(ProtocolEvent::GraphicsReady, 0));
    tracker.apply(&loaded(1));
    tracker.apply(&event(ProtocolEvent::ProtocolNew, 0));

    tracker.reset();

    assert!(!tracker.graphics_ready());
    assert_eq!(tracker.phase(), RunPhase::Idle);
    assert!(tracker.protocol().is_none());
    assert_eq!(tracker.history().len(), 1);
}
