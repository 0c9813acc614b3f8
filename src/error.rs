//! Error types for the digital voice bridge

use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors. These are the only fatal errors: a logic or a
/// vocoder session that fails validation is never started.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Unspecified codec TYPE")]
    UnspecifiedType,

    #[error("Unknown codec TYPE: {0}")]
    UnknownType(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Vocoder framing errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Declared payload length {declared} exceeds maximum {max}")]
    PayloadTooLarge { declared: usize, max: usize },

    #[error("Frame too short: {0} bytes")]
    ShortFrame(usize),

    #[error("Missing start byte")]
    MissingStartByte,

    #[error("Frame length mismatch: header says {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Superframe must be {expected} bytes, got {actual}")]
    SuperframeSize { expected: usize, actual: usize },
}

/// Byte-stream transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    #[error("Could not resolve {host} after {attempts} attempts")]
    ResolveExhausted { host: String, attempts: u32 },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    #[error("Invalid encoded length: {0} bytes")]
    InvalidLength(usize),
}

/// Network errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Message too short: {0} bytes")]
    MessageTooShort(usize),

    #[error("Bad magic in message header")]
    BadMagic,

    #[error("Failed to pack message: {0}")]
    PackFailed(String),

    #[error("Invalid packet format: {0}")]
    InvalidPacket(String),
}

/// Audio pipeline errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AudioError {
    #[error("Buffer overflow: {requested} items requested, {available} available")]
    BufferOverflow { requested: usize, available: usize },

    #[error("Unknown filter profile: {0}")]
    UnknownFilter(String),
}

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, Error>;
