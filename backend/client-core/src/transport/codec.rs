use crate::error::transport::TransportError;

use common::ErrorLocation;

use std::panic::Location;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Length of the connection header each side sends once after connecting.
pub const SP_HEADER_LEN: usize = 8;

/// Largest message accepted from the runtime.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const FRAME_MARKER: u8 = 0x01;
const FRAME_HEADER_LEN: usize = 1 + 8;

/// SP protocol identities, as announced in the connection header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpProtocol {
    Req0,
    Rep0,
    Pub0,
    Sub0,
}

impl SpProtocol {
    pub const fn id(self) -> u16 {
        match self {
            SpProtocol::Req0 => 0x30,
            SpProtocol::Rep0 => 0x31,
            SpProtocol::Pub0 => 0x20,
            SpProtocol::Sub0 => 0x21,
        }
    }

    /// The only protocol this one may talk to.
    pub const fn peer(self) -> SpProtocol {
        match self {
            SpProtocol::Req0 => SpProtocol::Rep0,
            SpProtocol::Rep0 => SpProtocol::Req0,
            SpProtocol::Pub0 => SpProtocol::Sub0,
            SpProtocol::Sub0 => SpProtocol::Pub0,
        }
    }

    pub fn header(self) -> [u8; SP_HEADER_LEN] {
        let id = self.id().to_be_bytes();
        [0x00, b'S', b'P', 0x00, id[0], id[1], 0x00, 0x00]
    }
}

/// Exchange connection headers and check the peer speaks the matching protocol.
///
/// Must run on a fresh stream before any framing.
pub async fn handshake<S>(stream: &mut S, protocol: SpProtocol) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&protocol.header()).await?;
    stream.flush().await?;

    let mut peer = [0u8; SP_HEADER_LEN];
    stream.read_exact(&mut peer).await?;

    if peer[0] != 0x00 || peer[1] != b'S' || peer[2] != b'P' || peer[3] != 0x00 {
        return Err(TransportError::Handshake {
            message: format!("peer sent an invalid SP header {peer:02x?}"),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    let peer_id = u16::from_be_bytes([peer[4], peer[5]]);
    let expected = protocol.peer();
    if peer_id != expected.id() {
        return Err(TransportError::Handshake {
            message: format!(
                "{protocol:?} expects a {expected:?} peer (0x{:02x}), got 0x{peer_id:02x}",
                expected.id()
            ),
            location: ErrorLocation::from(Location::caller()),
        });
    }

    Ok(())
}

/// Message framing: a `0x01` marker, a big-endian `u64` length, then the bytes.
#[derive(Debug, Clone, Copy)]
pub struct SpFrameCodec {
    max_frame_size: usize,
}

impl SpFrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for SpFrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for SpFrameCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_LEN {
            src.reserve(FRAME_HEADER_LEN - src.len());
            return Ok(None);
        }

        if src[0] != FRAME_MARKER {
            return Err(TransportError::Frame {
                message: format!("unexpected frame marker 0x{:02x}", src[0]),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let mut length_bytes = [0u8; 8];
        length_bytes.copy_from_slice(&src[1..FRAME_HEADER_LEN]);
        let length = u64::from_be_bytes(length_bytes);

        if length > self.max_frame_size as u64 {
            return Err(TransportError::Frame {
                message: format!(
                    "frame of {length} bytes exceeds the {} byte limit",
                    self.max_frame_size
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let length = length as usize;
        if src.len() < FRAME_HEADER_LEN + length {
            src.reserve(FRAME_HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for SpFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_size {
            return Err(TransportError::Frame {
                message: format!(
                    "refusing to send {} bytes, limit is {}",
                    item.len(),
                    self.max_frame_size
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        dst.reserve(FRAME_HEADER_LEN + item.len());
        dst.put_u8(FRAME_MARKER);
        dst.put_u64(item.len() as u64);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
