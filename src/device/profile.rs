//! Hardware profile extension points
//!
//! Four transforms sit between the session and the wire. The decoder
//! facing pair defaults to identity; the encoder facing pair depends on
//! the concrete hardware and has no default.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::{Frame, AMBE_SUBFRAME_LEN, TYPE_AUDIO};
use crate::error::DeviceError;

/// Samples in one speech frame (20 ms at 8 kHz)
pub const SPEECH_FRAME_SAMPLES: usize = 160;

/// Field id of speech data inside an audio frame
const FIELD_SPEECHD: u8 = 0x00;

/// Field id of channel data inside an AMBE frame
const FIELD_CHAND: u8 = 0x01;

/// Byte order and framing of a concrete vocoder
pub trait HardwareProfile: Send {
    /// Prepare one network superframe before it is split into sub-frames
    fn pack_for_decoding(&self, superframe: Bytes) -> Bytes {
        superframe
    }

    /// Prepare the payload of a decoded-audio frame before it is parsed as PCM
    fn unpack_decoded(&self, payload: Bytes) -> Bytes {
        payload
    }

    /// Turn local PCM into the frame the hardware encodes
    fn pack_for_encoding(&self, samples: &[f32]) -> Result<Bytes, DeviceError>;

    /// Extract encoded bytes from an AMBE frame payload
    fn unpack_encoded(&self, payload: &[u8]) -> Result<Bytes, DeviceError>;
}

/// AMBE-3000 style USB stick or AMBEserver
#[derive(Debug, Clone, Copy, Default)]
pub struct Dv3kUsbProfile;

impl HardwareProfile for Dv3kUsbProfile {
    fn pack_for_encoding(&self, samples: &[f32]) -> Result<Bytes, DeviceError> {
        if samples.len() > u8::MAX as usize {
            return Err(DeviceError::PayloadTooLarge {
                declared: samples.len(),
                max: u8::MAX as usize,
            });
        }

        let mut payload = BytesMut::with_capacity(2 + samples.len() * 2);
        payload.put_u8(FIELD_SPEECHD);
        payload.put_u8(samples.len() as u8);
        for &s in samples {
            payload.put_i16(float_to_i16(s));
        }
        Ok(Frame::new(TYPE_AUDIO, &payload)?.into_bytes())
    }

    fn unpack_encoded(&self, payload: &[u8]) -> Result<Bytes, DeviceError> {
        // field id, bit count, channel data
        if payload.len() < 2 + AMBE_SUBFRAME_LEN || payload[0] != FIELD_CHAND {
            return Err(DeviceError::ShortFrame(payload.len()));
        }
        let bytes = (payload[1] as usize).div_ceil(8).min(payload.len() - 2);
        Ok(Bytes::copy_from_slice(&payload[2..2 + bytes]))
    }
}

/// Parse the speech field of a decoded-audio payload into samples
pub fn pcm_from_payload(payload: &[u8]) -> Result<Vec<i16>, DeviceError> {
    if payload.len() < 2 || payload[0] != FIELD_SPEECHD {
        return Err(DeviceError::ShortFrame(payload.len()));
    }
    let count = payload[1] as usize;
    let data = &payload[2..];
    if data.len() < count * 2 {
        return Err(DeviceError::LengthMismatch {
            declared: count * 2,
            actual: data.len(),
        });
    }
    Ok(data[..count * 2]
        .chunks_exact(2)
        .map(|b| i16::from_be_bytes([b[0], b[1]]))
        .collect())
}

fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
