//! High-level connection state of the session.

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        formatter.write_str(name)
    }
}

/// Lock-free cell holding a [`ConnectionState`].
///
/// Reads never block, so UI code can poll it at any rate. Transitions are
/// compare-and-swap so two racing paths cannot both claim the same edge.
#[derive(Debug)]
pub(crate) struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Disconnected as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; false if the state was not `from`.
    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Force `to`, returning the state it replaced.
    pub(crate) fn replace(&self, to: ConnectionState) -> ConnectionState {
        ConnectionState::from_raw(self.0.swap(to as u8, Ordering::AcqRel))
    }
}
