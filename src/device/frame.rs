//! DV3K vocoder wire format
//!
//! ```text
//! ┌───────┬──────────┬──────┬─────────────────────┐
//! │ Start │  Length  │ Type │ Payload             │
//! │ 0x61  │ u16 BE   │ u8   │ `Length` bytes      │
//! └───────┴──────────┴──────┴─────────────────────┘
//! ```
//!
//! The length field counts the bytes after the 4-byte header.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::DeviceError;

/// First byte of every frame
pub const START_BYTE: u8 = 0x61;

/// Start byte, two length bytes and the type byte
pub const HEADER_LEN: usize = 4;

/// Largest payload accepted from the device. A decoded speech frame
/// (field id, sample count, 160 samples) is 322 bytes.
pub const MAX_PAYLOAD_LEN: usize = 1024;

pub const TYPE_CONTROL: u8 = 0x00;
pub const TYPE_AMBE: u8 = 0x01;
pub const TYPE_AUDIO: u8 = 0x02;

/// Control field identifiers
pub mod control {
    pub const RATEP: u8 = 0x0A;
    pub const CHANFMT: u8 = 0x15;
    pub const PRODID: u8 = 0x30;
    pub const VERSTRING: u8 = 0x31;
    pub const RESET: u8 = 0x33;
    pub const READY: u8 = 0x39;
}

/// Encoded bytes in one hardware sub-frame
pub const AMBE_SUBFRAME_LEN: usize = 9;

/// Sub-frames carried by one superframe from the network side
pub const SUBFRAMES_PER_SUPERFRAME: usize = 3;

/// Encoded bytes in one superframe
pub const SUPERFRAME_LEN: usize = AMBE_SUBFRAME_LEN * SUBFRAMES_PER_SUPERFRAME;

/// Header prepended to each outbound sub-frame: frame header, channel
/// data field id (0x01) and the bit count (72 = 9 bytes).
pub const AMBE_SUBFRAME_HEADER: [u8; 6] = [
    START_BYTE,
    0x00,
    (2 + AMBE_SUBFRAME_LEN) as u8,
    TYPE_AMBE,
    0x01,
    (AMBE_SUBFRAME_LEN * 8) as u8,
];

/// Frame type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Control,
    Ambe,
    Audio,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            TYPE_CONTROL => FrameType::Control,
            TYPE_AMBE => FrameType::Ambe,
            TYPE_AUDIO => FrameType::Audio,
            other => FrameType::Unknown(other),
        }
    }
}

/// One complete device frame, header included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Validate a complete frame
    pub fn parse(bytes: Bytes) -> Result<Self, DeviceError> {
        if bytes.len() < HEADER_LEN {
            return Err(DeviceError::ShortFrame(bytes.len()));
        }
        if bytes[0] != START_BYTE {
            return Err(DeviceError::MissingStartByte);
        }
        let declared = declared_payload_len(&bytes).unwrap_or(0);
        if bytes.len() != HEADER_LEN + declared {
            return Err(DeviceError::LengthMismatch {
                declared,
                actual: bytes.len() - HEADER_LEN,
            });
        }
        Ok(Self { bytes })
    }

    /// Build a frame from its type and payload
    pub fn new(frame_type: u8, payload: &[u8]) -> Result<Self, DeviceError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(DeviceError::PayloadTooLarge {
                declared: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u8(START_BYTE);
        buf.put_u16(payload.len() as u16);
        buf.put_u8(frame_type);
        buf.put_slice(payload);
        Ok(Self { bytes: buf.freeze() })
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from(self.bytes[3])
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    pub fn payload_len(&self) -> usize {
        self.bytes.len() - HEADER_LEN
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Payload length declared by a header, if the header is complete
pub fn declared_payload_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([buf[1], buf[2]]) as usize)
}

/// Single-field control request, e.g. `[0x61, 0x00, 0x01, 0x00, 0x30]`
pub fn control_request(field: u8) -> Bytes {
    Bytes::copy_from_slice(&[START_BYTE, 0x00, 0x01, TYPE_CONTROL, field])
}

/// Split one superframe into its hardware sub-frames, each prefixed with
/// [`AMBE_SUBFRAME_HEADER`], in transmit order.
pub fn packetize_superframe(superframe: &[u8]) -> Result<Vec<Bytes>, DeviceError> {
    if superframe.len() != SUPERFRAME_LEN {
        return Err(DeviceError::SuperframeSize {
            expected: SUPERFRAME_LEN,
            actual: superframe.len(),
        });
    }

    Ok(superframe
        .chunks_exact(AMBE_SUBFRAME_LEN)
        .map(|sub| {
            let mut buf = BytesMut::with_capacity(AMBE_SUBFRAME_HEADER.len() + sub.len());
            buf.put_slice(&AMBE_SUBFRAME_HEADER);
            buf.put_slice(sub);
            buf.freeze()
        })
        .collect())
}
