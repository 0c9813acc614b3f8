//! Raw 16-bit PCM encoder
//!
//! Emits little endian signed 16-bit samples. There is no internal
//! buffering so a flush always completes immediately.

use bytes::{BufMut, Bytes, BytesMut};

use super::{AudioEncoder, EncoderFlush};

/// Signed 16-bit PCM encoder
#[derive(Debug, Default)]
pub struct S16Encoder {
    /// Calls to `encode` that produced output
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl S16Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset statistics
    pub fn reset_stats(&mut self) {
        self.frames_encoded = 0;
        self.bytes_produced = 0;
    }
}

impl AudioEncoder for S16Encoder {
    fn name(&self) -> &'static str {
        "S16"
    }

    fn encode(&mut self, samples: &[f32]) -> Bytes {
        let mut buf = BytesMut::with_capacity(samples.len() * 2);
        for &s in samples {
            buf.put_i16_le(to_i16(s));
        }

        if !samples.is_empty() {
            self.frames_encoded += 1;
            self.bytes_produced += buf.len() as u64;
        }
        buf.freeze()
    }

    fn flush(&mut self) -> EncoderFlush {
        EncoderFlush {
            data: Bytes::new(),
            complete: true,
        }
    }

    fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Encoder statistics
#[derive(Debug, Clone, Default)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}
