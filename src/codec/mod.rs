//! Audio codecs between the pipeline and the network engine
//!
//! Encoders turn pipeline samples into the bytes the network engine
//! frames; decoders do the reverse. Codecs are selected by name.

pub mod decoder;
pub mod encoder;

pub use decoder::{DecoderStats, S16Decoder};
pub use encoder::{EncoderStats, S16Encoder};

use bytes::Bytes;

use crate::error::CodecError;

/// Result of flushing an encoder
#[derive(Debug, Clone, Default)]
pub struct EncoderFlush {
    /// Bytes still held by the encoder
    pub data: Bytes,
    /// False if completion is reported later through the owner
    pub complete: bool,
}

/// Sample to byte encoder
pub trait AudioEncoder: Send {
    fn name(&self) -> &'static str;

    /// Encode samples normalised to [-1, 1]
    fn encode(&mut self, samples: &[f32]) -> Bytes;

    /// Emit anything buffered at the end of a stream
    fn flush(&mut self) -> EncoderFlush;

    fn stats(&self) -> EncoderStats;
}

/// Byte to sample decoder
pub trait AudioDecoder: Send {
    fn name(&self) -> &'static str;

    fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError>;

    /// Emit anything buffered at the end of a stream
    fn flush(&mut self) -> Vec<f32>;

    fn stats(&self) -> DecoderStats;
}

/// Codec names accepted by [`create_encoder`] and [`create_decoder`]
pub const CODECS: &[&str] = &["S16"];

pub fn create_encoder(name: &str) -> Result<Box<dyn AudioEncoder>, CodecError> {
    match name.to_ascii_uppercase().as_str() {
        "S16" => Ok(Box::new(S16Encoder::new())),
        _ => Err(CodecError::UnknownCodec(name.to_string())),
    }
}

pub fn create_decoder(name: &str) -> Result<Box<dyn AudioDecoder>, CodecError> {
    match name.to_ascii_uppercase().as_str() {
        "S16" => Ok(Box::new(S16Decoder::new())),
        _ => Err(CodecError::UnknownCodec(name.to_string())),
    }
}
