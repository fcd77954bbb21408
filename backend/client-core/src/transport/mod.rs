//! Scalability-protocol (SP) sockets over Unix domain sockets.
//!
//! The runtime exposes an `ipc://` reply endpoint and an `ipc://` publish
//! endpoint. This module speaks just enough of the SP wire protocol to act as
//! the requesting side of the first and the subscribing side of the second:
//!
//! - An 8-byte connection header announcing the local protocol, checked
//!   against the peer's ([`handshake`]).
//! - Length-prefixed message frames ([`SpFrameCodec`]).
//! - A 4-byte request id in front of every request body, echoed back by the
//!   reply side ([`RequestSocket`]).
//!
//! Publish/subscribe frames carry no header; the subscriber receives every
//! message the publisher sends.

mod address;
mod codec;
mod request_socket;
mod subscribe_socket;

pub use address::{IPC_SCHEME, IpcAddress};
pub use codec::{MAX_FRAME_SIZE, SP_HEADER_LEN, SpFrameCodec, SpProtocol, handshake};
pub use request_socket::{PipeHooks, RequestSocket};
pub use subscribe_socket::SubscribeSocket;

use std::sync::Arc;

use tokio::sync::watch;

/// Shared close switch for a socket.
///
/// Closing is observed by every pending receive on the socket, which then
/// fails with [`TransportError::Closed`](crate::error::TransportError::Closed).
/// Clones can be handed out so the socket can be closed without owning it.
#[derive(Debug, Clone)]
pub struct SocketCloser {
    closed: Arc<watch::Sender<bool>>,
}

impl SocketCloser {
    pub(crate) fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed: Arc::new(closed),
        }
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}
