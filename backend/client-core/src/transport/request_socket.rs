use crate::error::transport::TransportError;
use crate::transport::codec::{SpFrameCodec, SpProtocol, handshake};
use crate::transport::{IpcAddress, SocketCloser};

use common::ErrorLocation;

use std::panic::Location;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

const REQUEST_ID_LEN: usize = 4;
const REQUEST_ID_FLAG: u32 = 0x8000_0000;

type PipeCallback = Box<dyn Fn() + Send + Sync>;

/// Callbacks for the lifetime of the socket's pipe (the underlying stream).
///
/// `on_connect` runs once the stream is connected and the SP handshake
/// succeeded. `on_remove` runs exactly once when the pipe goes away, whether
/// the peer hung up, the stream failed or the socket was closed locally.
/// Both run on the transport's own task and must not block.
#[derive(Default)]
pub struct PipeHooks {
    on_connect: Option<PipeCallback>,
    on_remove: Option<PipeCallback>,
}

impl PipeHooks {
    pub fn on_connect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Box::new(callback));
        self
    }

    pub fn on_remove(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_remove = Some(Box::new(callback));
        self
    }

    fn connected(&self) {
        if let Some(callback) = &self.on_connect {
            callback();
        }
    }

    fn removed(&self) {
        if let Some(callback) = &self.on_remove {
            callback();
        }
    }
}

/// Requesting side of the request/reply pattern.
///
/// Strictly one request in flight: [`send`](Self::send) followed by
/// [`recv`](Self::recv). A reply that carries the id of an earlier, abandoned
/// request is dropped.
pub struct RequestSocket {
    address: IpcAddress,
    writer: FramedWrite<OwnedWriteHalf, SpFrameCodec>,
    replies: mpsc::UnboundedReceiver<Bytes>,
    closer: SocketCloser,
    next_id: u32,
    pending: Option<u32>,
    pipe: JoinHandle<()>,
}

impl RequestSocket {
    /// Connect to a reply endpoint and start the pipe reader.
    pub async fn dial(address: &IpcAddress, hooks: PipeHooks) -> Result<Self, TransportError> {
        let mut stream = UnixStream::connect(address.path()).await?;
        handshake(&mut stream, SpProtocol::Req0).await?;

        debug!("Request pipe connected to {address}");
        hooks.connected();

        let (read_half, write_half) = stream.into_split();
        let closer = SocketCloser::new();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let pipe = tokio::spawn(run_pipe(
            FramedRead::new(read_half, SpFrameCodec::default()),
            reply_tx,
            closer.subscribe(),
            hooks,
        ));

        Ok(Self {
            address: address.clone(),
            writer: FramedWrite::new(write_half, SpFrameCodec::default()),
            replies: reply_rx,
            closer,
            next_id: initial_request_id(),
            pending: None,
            pipe,
        })
    }

    pub fn address(&self) -> &IpcAddress {
        &self.address
    }

    /// Handle that closes this socket from outside whoever owns it.
    pub fn closer(&self) -> SocketCloser {
        self.closer.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed() || self.pipe.is_finished()
    }

    /// Send one request body. Any earlier unanswered request is abandoned.
    pub async fn send(&mut self, body: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::closed("request socket is closed"));
        }

        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id | REQUEST_ID_FLAG;

        let mut frame = BytesMut::with_capacity(REQUEST_ID_LEN + body.len());
        frame.put_u32(id);
        frame.extend_from_slice(body);

        self.pending = Some(id);
        self.writer.send(frame.freeze()).await
    }

    /// Wait for the reply to the last request sent.
    ///
    /// Cancel-safe: dropping the future leaves the request pending, and its
    /// reply is discarded once a newer request goes out.
    pub async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let Some(id) = self.pending else {
            return Err(TransportError::Frame {
                message: "no request in flight".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        let mut closed = self.closer.subscribe();

        loop {
            let frame = tokio::select! {
                biased;
                _ = closed.wait_for(|closed| *closed) => {
                    return Err(TransportError::closed("request socket closed"));
                }
                frame = self.replies.recv() => {
                    frame.ok_or_else(|| TransportError::closed("request pipe removed"))?
                }
            };

            if frame.len() < REQUEST_ID_LEN {
                warn!("Dropping {} byte reply without a request id", frame.len());
                continue;
            }

            let reply_id = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
            if reply_id != id {
                debug!("Dropping stale reply 0x{reply_id:08x} (waiting for 0x{id:08x})");
                continue;
            }

            self.pending = None;
            return Ok(frame.slice(REQUEST_ID_LEN..));
        }
    }

    pub fn close(&self) {
        self.closer.close();
    }
}

impl Drop for RequestSocket {
    fn drop(&mut self) {
        self.closer.close();
    }
}

/// Reads replies off the stream until it ends or the socket is closed, then
/// reports the pipe as removed.
async fn run_pipe(
    mut reader: FramedRead<OwnedReadHalf, SpFrameCodec>,
    replies: mpsc::UnboundedSender<Bytes>,
    mut closed: watch::Receiver<bool>,
    hooks: PipeHooks,
) {
    loop {
        tokio::select! {
            _ = closed.wait_for(|closed| *closed) => {
                debug!("Request pipe closed locally");
                break;
            }
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    if replies.send(frame).is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Request pipe failed: {e}");
                    break;
                }
                None => {
                    info!("Runtime closed the request pipe");
                    break;
                }
            }
        }
    }

    hooks.removed();
}

fn initial_request_id() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.subsec_nanos())
        .unwrap_or(0)
}
