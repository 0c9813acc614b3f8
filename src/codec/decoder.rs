//! Raw 16-bit PCM decoder

use super::AudioDecoder;
use crate::error::CodecError;

/// Signed 16-bit little endian PCM decoder
#[derive(Debug, Default)]
pub struct S16Decoder {
    frames_decoded: u64,
    /// Inputs rejected for an odd byte count
    frames_rejected: u64,
    samples_produced: u64,
}

impl S16Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset_stats(&mut self) {
        self.frames_decoded = 0;
        self.frames_rejected = 0;
        self.samples_produced = 0;
    }
}

impl AudioDecoder for S16Decoder {
    fn name(&self) -> &'static str {
        "S16"
    }

    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        if data.len() % 2 != 0 {
            self.frames_rejected += 1;
            return Err(CodecError::InvalidLength(data.len()));
        }

        let samples: Vec<f32> = data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect();

        self.frames_decoded += 1;
        self.samples_produced += samples.len() as u64;
        Ok(samples)
    }

    fn flush(&mut self) -> Vec<f32> {
        Vec::new()
    }

    fn stats(&self) -> DecoderStats {
        let total = self.frames_decoded + self.frames_rejected;
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_rejected: self.frames_rejected,
            samples_produced: self.samples_produced,
            reject_rate: if total > 0 {
                self.frames_rejected as f32 / total as f32
            } else {
                0.0
            },
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone, Default)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub samples_produced: u64,
    pub reject_rate: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode() {
        let mut decoder = S16Decoder::new();
        let samples = decoder.decode(&[0x00, 0x40, 0x00, 0xC0]).unwrap();
        assert_eq!(samples, vec![0.5, -0.5]);
        assert_eq!(decoder.stats().samples_produced, 2);
    }

    #[test]
    fn test_odd_length_is_rejected() {
        let mut decoder = S16Decoder::new();
        assert!(matches!(
            decoder.decode(&[0x00, 0x40, 0x00]),
            Err(CodecError::InvalidLength(3))
        ));
        decoder.decode(&[0x00, 0x00]).unwrap();

        let stats = decoder.stats();
        assert_eq!(stats.frames_rejected, 1);
        assert_eq!(stats.reject_rate, 0.5);
    }
}
