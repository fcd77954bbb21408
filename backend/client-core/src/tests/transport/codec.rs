use crate::error::TransportError;
use crate::transport::{MAX_FRAME_SIZE, SpFrameCodec, SpProtocol, handshake};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn given_protocols_when_header_built_then_matches_sp_layout() {
    assert_eq!(
        SpProtocol::Req0.header(),
        [0x00, b'S', b'P', 0x00, 0x00, 0x30, 0x00, 0x00]
    );
    assert_eq!(SpProtocol::Sub0.header()[5], 0x21);
    assert_eq!(SpProtocol::Req0.peer(), SpProtocol::Rep0);
    assert_eq!(SpProtocol::Sub0.peer(), SpProtocol::Pub0);
}

#[test]
fn given_message_when_encoded_then_prefixed_by_marker_and_length() {
    let mut codec = SpFrameCodec::default();
    let mut buffer = BytesMut::new();

    codec
        .encode(Bytes::from_static(b"hello"), &mut buffer)
        .expect("encode");

    assert_eq!(buffer[0], 0x01);
    assert_eq!(&buffer[1..9], &5u64.to_be_bytes());
    assert_eq!(&buffer[9..], b"hello");
}

/// **VALUE**: Frames split across reads are reassembled.
///
/// **WHY THIS MATTERS**: Unix sockets deliver bytes, not messages. A large
/// broadcast can arrive in several reads.
///
/// **BUG THIS CATCHES**: Returning a truncated frame, or an error, when only part
/// of the payload has been buffered.
#[test]
fn given_partial_frame_when_decoded_then_waits_for_rest() {
    // GIVEN: The header and half the payload of one frame
    let mut codec = SpFrameCodec::default();
    let mut buffer = BytesMut::new();
    buffer.put_u8(0x01);
    buffer.put_u64(6);
    buffer.extend_from_slice(b"abc");

    // WHEN: Decoding before and after the rest arrives
    let first = codec.decode(&mut buffer).expect("decode");
    buffer.extend_from_slice(b"def");
    let second = codec.decode(&mut buffer).expect("decode");

    // THEN: Nothing, then the whole message
    assert!(first.is_none());
    assert_eq!(second, Some(Bytes::from_static(b"abcdef")));
    assert!(buffer.is_empty());
}

#[test]
fn given_oversized_length_when_decoded_then_returns_frame_error() {
    let mut codec = SpFrameCodec::default();
    let mut buffer = BytesMut::new();
    buffer.put_u8(0x01);
    buffer.put_u64(MAX_FRAME_SIZE as u64 + 1);

    let result = codec.decode(&mut buffer);

    assert!(matches!(result, Err(TransportError::Frame { .. })));
}

#[test]
fn given_bad_marker_when_decoded_then_returns_frame_error() {
    let mut codec = SpFrameCodec::default();
    let mut buffer = BytesMut::from(&[0x02u8, 0, 0, 0, 0, 0, 0, 0, 0][..]);

    let result = codec.decode(&mut buffer);

    assert!(matches!(result, Err(TransportError::Frame { .. })));
}

#[tokio::test]
async fn given_matching_peer_when_handshaking_then_succeeds() {
    let (mut client, mut server) = tokio::io::duplex(64);

    let peer = tokio::spawn(async move {
        let mut header = [0u8; 8];
        server.read_exact(&mut header).await.expect("read header");
        server
            .write_all(&SpProtocol::Rep0.header())
            .await
            .expect("write header");
        header
    });

    handshake(&mut client, SpProtocol::Req0)
        .await
        .expect("handshake");

    assert_eq!(peer.await.expect("join"), SpProtocol::Req0.header());
}

/// **VALUE**: A peer speaking the wrong pattern is refused at connect time.
///
/// **BUG THIS CATCHES**: Dialing the publish endpoint with the request socket
/// (swapped addresses in the config) and then hanging on the first reply.
#[tokio::test]
async fn given_wrong_peer_protocol_when_handshaking_then_returns_handshake_error() {
    let (mut client, mut server) = tokio::io::duplex(64);

    tokio::spawn(async move {
        let mut header = [0u8; 8];
        let _ = server.read_exact(&mut header).await;
        let _ = server.write_all(&SpProtocol::Pub0.header()).await;
    });

    let result = handshake(&mut client, SpProtocol::Req0).await;

    assert!(matches!(result, Err(TransportError::Handshake { .. })));
}
