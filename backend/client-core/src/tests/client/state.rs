use crate::client::ConnectionState;
use crate::client::state::AtomicConnectionState;

#[test]
fn given_new_state_when_loaded_then_disconnected() {
    let state = AtomicConnectionState::new();

    assert_eq!(state.load(), ConnectionState::Disconnected);
}

/// **VALUE**: Only one caller can claim a transition.
///
/// **WHY THIS MATTERS**: `connect()` relies on the Disconnected → Connecting edge
/// to ignore a second call while the first attempt is still running.
///
/// **BUG THIS CATCHES**: Replacing the compare-and-swap with a load then store,
/// which lets two connect attempts race on the same session.
#[test]
fn given_state_when_same_transition_attempted_twice_then_only_first_succeeds() {
    let state = AtomicConnectionState::new();

    let first = state.transition(ConnectionState::Disconnected, ConnectionState::Connecting);
    let second = state.transition(ConnectionState::Disconnected, ConnectionState::Connecting);

    assert!(first);
    assert!(!second);
    assert_eq!(state.load(), ConnectionState::Connecting);
}

#[test]
fn given_connected_state_when_replaced_then_returns_previous() {
    let state = AtomicConnectionState::new();
    state.transition(ConnectionState::Disconnected, ConnectionState::Connecting);
    state.transition(ConnectionState::Connecting, ConnectionState::Connected);

    let previous = state.replace(ConnectionState::Disconnected);
    let again = state.replace(ConnectionState::Disconnected);

    assert_eq!(previous, ConnectionState::Connected);
    assert_eq!(again, ConnectionState::Disconnected);
}

#[test]
fn given_states_when_displayed_then_lowercase_names() {
    assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    assert_eq!(ConnectionState::Connected.to_string(), "connected");
}
