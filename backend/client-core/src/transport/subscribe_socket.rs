use crate::error::transport::TransportError;
use crate::transport::codec::{SpFrameCodec, SpProtocol, handshake};
use crate::transport::{IpcAddress, SocketCloser};

use bytes::Bytes;
use futures_util::StreamExt;
use log::debug;
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;

/// Subscribing side of the publish/subscribe pattern, subscribed to every
/// message.
///
/// Shared by reference between the owner (who may [`close`](Self::close) it)
/// and a single reader. Closing wakes a pending [`recv`](Self::recv) with
/// [`TransportError::Closed`].
pub struct SubscribeSocket {
    address: IpcAddress,
    reader: Mutex<FramedRead<OwnedReadHalf, SpFrameCodec>>,
    // Held so the publisher does not see the pipe half-closed.
    _writer: OwnedWriteHalf,
    closer: SocketCloser,
}

impl SubscribeSocket {
    pub async fn dial(address: &IpcAddress) -> Result<Self, TransportError> {
        let mut stream = UnixStream::connect(address.path()).await?;
        handshake(&mut stream, SpProtocol::Sub0).await?;

        debug!("Subscription pipe connected to {address}");

        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            address: address.clone(),
            reader: Mutex::new(FramedRead::new(read_half, SpFrameCodec::default())),
            _writer: write_half,
            closer: SocketCloser::new(),
        })
    }

    pub fn address(&self) -> &IpcAddress {
        &self.address
    }

    /// Wait for the next published message.
    ///
    /// Cancel-safe: partially received frames stay buffered for the next call.
    pub async fn recv(&self) -> Result<Bytes, TransportError> {
        let mut closed = self.closer.subscribe();
        if *closed.borrow() {
            return Err(TransportError::closed("subscribe socket closed"));
        }

        let mut reader = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => {
                return Err(TransportError::closed("subscribe socket closed"));
            }
            reader = self.reader.lock() => reader,
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => {
                Err(TransportError::closed("subscribe socket closed"))
            }
            frame = reader.next() => match frame {
                Some(result) => result,
                None => Err(TransportError::closed("runtime closed the subscription pipe")),
            },
        }
    }

    pub fn close(&self) {
        self.closer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}
