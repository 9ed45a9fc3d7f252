use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Relay header: magic (2) + length (4) + op (1) + handle (2) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Magic bytes: "SH" (0x53 0x48).
pub const MAGIC: [u8; 2] = [0x53, 0x48];

/// Default maximum relay payload size: 4 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 4 * 1024;

/// Relay operation codes.
///
/// Codes below `0x80` travel from the radio daemon to the bridge; codes
/// from `0x80` up travel from the bridge to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Request the service table.
    Describe = 0x01,
    /// Read a characteristic value.
    Read = 0x02,
    /// Write a characteristic value.
    Write = 0x03,
    /// Enable notifications on a characteristic.
    Subscribe = 0x04,
    /// Disable notifications on a characteristic.
    Unsubscribe = 0x05,
    /// JSON service descriptor.
    ServiceTable = 0x81,
    /// Value returned for a read.
    ReadResponse = 0x82,
    /// One-byte ATT status for a write.
    WriteResponse = 0x83,
    /// One notification frame.
    Notify = 0x84,
    /// End of a notification stream.
    NotifyEnd = 0x85,
    /// One-byte ATT status followed by a UTF-8 message.
    Error = 0xFF,
}

impl Op {
    /// Returns a human-readable name for the op.
    pub fn name(self) -> &'static str {
        match self {
            Op::Describe => "DESCRIBE",
            Op::Read => "READ",
            Op::Write => "WRITE",
            Op::Subscribe => "SUBSCRIBE",
            Op::Unsubscribe => "UNSUBSCRIBE",
            Op::ServiceTable => "SERVICE_TABLE",
            Op::ReadResponse => "READ_RESPONSE",
            Op::WriteResponse => "WRITE_RESPONSE",
            Op::Notify => "NOTIFY",
            Op::NotifyEnd => "NOTIFY_END",
            Op::Error => "ERROR",
        }
    }
}

impl TryFrom<u8> for Op {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Op::Describe),
            0x02 => Ok(Op::Read),
            0x03 => Ok(Op::Write),
            0x04 => Ok(Op::Subscribe),
            0x05 => Ok(Op::Unsubscribe),
            0x81 => Ok(Op::ServiceTable),
            0x82 => Ok(Op::ReadResponse),
            0x83 => Ok(Op::WriteResponse),
            0x84 => Ok(Op::Notify),
            0x85 => Ok(Op::NotifyEnd),
            0xFF => Ok(Op::Error),
            other => Err(FrameError::UnknownOp(other)),
        }
    }
}

/// A relay message addressed to one characteristic handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    /// Operation carried by this frame.
    pub op: Op,
    /// Characteristic handle. Zero for service-level ops.
    pub handle: u16,
    /// Operation payload.
    pub payload: Bytes,
}

impl RelayFrame {
    /// Create a new relay frame.
    pub fn new(op: Op, handle: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            op,
            handle,
            payload: payload.into(),
        }
    }

    /// Create a relay frame without payload.
    pub fn empty(op: Op, handle: u16) -> Self {
        Self::new(op, handle, Bytes::new())
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a relay frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬───────────┬────────┬──────────┬──────────────────┐
/// │ Magic (2B) │ Length    │ Op     │ Handle   │ Payload          │
/// │ 0x53 0x48  │ (4B LE)   │ (1B)   │ (2B LE)  │ (Length bytes)   │
/// │ "SH"       │           │        │          │                  │
/// └────────────┴───────────┴────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(frame: &RelayFrame, dst: &mut BytesMut) -> Result<()> {
    if frame.payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(frame.wire_size());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(frame.payload.len() as u32);
    dst.put_u8(frame.op as u8);
    dst.put_u16_le(frame.handle);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a relay frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<RelayFrame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    let op = Op::try_from(src[6])?;
    let handle = u16::from_le_bytes([src[7], src[8]]);

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(RelayFrame {
        op,
        handle,
        payload,
    }))
}

/// `tokio_util` codec for the relay socket.
#[derive(Debug, Clone)]
pub struct RelayCodec {
    max_payload_size: usize,
}

impl RelayCodec {
    /// Create a codec with the default payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a codec with an explicit payload limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Current payload limit.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RelayCodec {
    type Item = RelayFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        decode_frame(src, self.max_payload_size)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<RelayFrame> for RelayCodec {
    type Error = FrameError;

    fn encode(&mut self, item: RelayFrame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}
