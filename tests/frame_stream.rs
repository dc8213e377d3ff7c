// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

// Stream splitting through the public codec API.

use bytes::Bytes;

use dsair_bridge::constants::ALL_ROOMS;
use dsair_bridge::protocol::{Decoded, FrameCodec, decode_result, encode_frame, encode_heartbeat};
use dsair_bridge::{DeviceKind, DsAirError, Param, ProtocolVersion, ResultBody};

fn stream() -> Vec<u8> {
    let mut bytes = Vec::new();
    let rooms = Param::all_rooms().to_frame(1, ProtocolVersion::Old).unwrap();
    let temp = Param::RecommendedIndoorTemp.to_frame(2, ProtocolVersion::Old).unwrap();
    bytes.extend_from_slice(&encode_frame(&rooms).unwrap());
    bytes.extend_from_slice(&encode_heartbeat());
    bytes.extend_from_slice(&encode_frame(&temp).unwrap());
    bytes
}

fn drain(codec: &mut FrameCodec, out: &mut Vec<Decoded>) {
    while let Some(decoded) = codec.decode().unwrap() {
        out.push(decoded);
    }
}

#[test]
fn test_any_split_yields_same_frames() {
    let bytes = stream();
    let mut whole = Vec::new();
    let mut codec = FrameCodec::new();
    codec.push(&bytes);
    drain(&mut codec, &mut whole);
    assert_eq!(whole.len(), 3);
    assert_eq!(whole[1], Decoded::Heartbeat);

    for cut in 1..bytes.len() {
        let mut parts = Vec::new();
        let mut codec = FrameCodec::new();
        codec.push(&bytes[..cut]);
        drain(&mut codec, &mut parts);
        codec.push(&bytes[cut..]);
        drain(&mut codec, &mut parts);
        assert_eq!(parts, whole, "split at {cut}");
        assert_eq!(codec.buffered_len(), 0);
    }
}

#[test]
fn test_byte_at_a_time() {
    let bytes = stream();
    let mut codec = FrameCodec::new();
    let mut out = Vec::new();
    for b in &bytes {
        codec.push(std::slice::from_ref(b));
        drain(&mut codec, &mut out);
    }
    let sequences: Vec<u32> = out
        .iter()
        .filter_map(|d| match d {
            Decoded::Frame(f) => Some(f.sequence),
            Decoded::Heartbeat => None,
        })
        .collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[test]
fn test_garbage_is_fatal_and_clears_buffer() {
    let mut codec = FrameCodec::new();
    codec.push(&[0x7E, 0x00, 0x10, 0x00]);
    let err = codec.decode().unwrap_err();
    assert!(matches!(err, DsAirError::MalformedFrame { .. }));
    assert!(!err.is_record_local());
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_request_decodes_as_system_record() {
    let frame = Param::all_rooms().to_frame(5, ProtocolVersion::Old).unwrap();
    assert_eq!(frame.target(), Some(DeviceKind::System));
    assert_eq!(frame.subbody, Bytes::from(vec![1, 0xFF, 0xFF]));
    assert_eq!(u16::from_le_bytes([frame.subbody[1], frame.subbody[2]]), ALL_ROOMS);

    // a room-info request body is too short to be a room-info response
    let err = decode_result(&frame, ProtocolVersion::Old).unwrap_err();
    assert!(err.is_record_local());

    let ack = dsair_bridge::protocol::Frame {
        command: 1,
        subbody: Bytes::new(),
        ..frame
    };
    let result = decode_result(&ack, ProtocolVersion::Old).unwrap();
    assert_eq!(result.sequence, 5);
    assert!(matches!(result.body, ResultBody::Ack { version: None }));
}
