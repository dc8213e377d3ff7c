// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

//! Frame splitting and serialization.
//!
//! ```text
//! +-------+--------+------+-----+-----+-----+----------+------+--------+-----+-------+---------+------+
//! | 0x02  | len:16 | 0x0D | 0   | ver | 0   | seq:32   | 0x08 | dev:32 | ack | cmd:16| subbody | 0x03 |
//! +-------+--------+------+-----+-----+-----+----------+------+--------+-----+-------+---------+------+
//! ```
//!
//! `len` counts the 16 header bytes after it plus the subbody.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{
    DeviceKind, FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_OVERHEAD, FRAME_RESERVED, FRAME_TAIL,
};
use crate::error::{DsAirError, Result};

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub subbody_version: u8,
    pub sequence: u32,
    pub type_code: u8,
    pub device_id: u32,
    pub need_ack: bool,
    pub command: u16,
    pub subbody: Bytes,
}

impl Frame {
    /// Modelled target of this frame, if its device id is known.
    pub fn target(&self) -> Option<DeviceKind> {
        DeviceKind::from_device_id(self.device_id)
    }
}

/// Output of a successful decode step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Zero-length keep-alive sentinel `02 00 00 03`.
    Heartbeat,
    Frame(Frame),
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the decoded unit
/// and the number of bytes it occupied. Bad magic or tail bytes are
/// unrecoverable since the stream has no resync marker.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(Decoded, usize)>> {
    let Some(&magic) = buf.first() else {
        return Ok(None);
    };
    if magic != FRAME_MAGIC {
        return Err(DsAirError::MalformedFrame {
            details: format!("bad magic byte 0x{:02X}", magic),
        });
    }
    if buf.len() < 3 {
        return Ok(None);
    }

    let length = u16::from_le_bytes([buf[1], buf[2]]) as usize;
    if length != 0 && length < FRAME_HEADER_LEN {
        return Err(DsAirError::MalformedFrame {
            details: format!("length {} shorter than header", length),
        });
    }

    let total = length + FRAME_OVERHEAD;
    if buf.len() < total {
        return Ok(None);
    }

    let tail = buf[total - 1];
    if tail != FRAME_TAIL {
        return Err(DsAirError::MalformedFrame {
            details: format!("bad tail byte 0x{:02X} at offset {}", tail, total - 1),
        });
    }

    if length == 0 {
        return Ok(Some((Decoded::Heartbeat, total)));
    }

    let mut header = &buf[3..3 + FRAME_HEADER_LEN];
    header.advance(2); // reserved
    let subbody_version = header.get_u8();
    header.advance(1); // reserved
    let sequence = header.get_u32_le();
    let type_code = header.get_u8();
    let device_id = header.get_u32_le();
    let need_ack = header.get_u8() != 0;
    let command = header.get_u16_le();

    let subbody = Bytes::copy_from_slice(&buf[3 + FRAME_HEADER_LEN..total - 1]);

    Ok(Some((
        Decoded::Frame(Frame {
            subbody_version,
            sequence,
            type_code,
            device_id,
            need_ack,
            command,
            subbody,
        }),
        total,
    )))
}

/// Serialize a frame. Exact inverse of [`decode_frame`] apart from the
/// reserved bytes, which are always written with their fixed values.
///
/// Fails if the subbody does not fit the 16-bit length field.
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let length = FRAME_HEADER_LEN + frame.subbody.len();
    let wire_length = u16::try_from(length).map_err(|_| DsAirError::MalformedFrame {
        details: format!("subbody of {} bytes exceeds frame length field", frame.subbody.len()),
    })?;
    let mut buf = BytesMut::with_capacity(length + FRAME_OVERHEAD);
    buf.put_u8(FRAME_MAGIC);
    buf.put_u16_le(wire_length);
    buf.put_u8(FRAME_RESERVED);
    buf.put_u8(0);
    buf.put_u8(frame.subbody_version);
    buf.put_u8(0);
    buf.put_u32_le(frame.sequence);
    buf.put_u8(frame.type_code);
    buf.put_u32_le(frame.device_id);
    buf.put_u8(frame.need_ack as u8);
    buf.put_u16_le(frame.command);
    buf.put_slice(&frame.subbody);
    buf.put_u8(FRAME_TAIL);
    Ok(buf.freeze())
}

/// The 4-byte keep-alive sentinel.
pub fn encode_heartbeat() -> Bytes {
    Bytes::from_static(&[FRAME_MAGIC, 0, 0, FRAME_TAIL])
}

/// Accumulating decoder fed from the socket reader.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode the next unit, or `Ok(None)` if more data is needed.
    ///
    /// On a malformed stream the whole buffer is discarded and the error
    /// returned; the caller is expected to drop the connection.
    pub fn decode(&mut self) -> Result<Option<Decoded>> {
        match decode_frame(&self.buffer) {
            Ok(Some((decoded, consumed))) => {
                self.buffer.advance(consumed);
                Ok(Some(decoded))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.buffer.clear();
                Err(e)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
