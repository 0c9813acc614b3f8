//! Byte-stream transports to the vocoder
//!
//! A transport can send bytes and report received chunks. Chunk
//! boundaries carry no meaning; the session reassembles frames itself.

mod ambeserver;
mod mock;
#[cfg(feature = "serial")]
mod serial;

pub use ambeserver::{AmbeServerTransport, ResolvePolicy};
pub use mock::{MockHandle, MockTransport};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

use bytes::Bytes;

use super::registry::SessionKey;
use crate::error::{ConfigError, TransportError};

/// Baud rates the vocoder firmware supports
pub const SUPPORTED_BAUD_RATES: [u32; 2] = [230_400, 460_800];

/// Capability interface implemented by every transport
pub trait Transport: Send {
    /// Queue bytes for transmission without blocking
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Return the next received chunk, or `None` if nothing is waiting
    fn poll_received(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Release the underlying device or socket
    fn close(&mut self);

    /// Human readable endpoint, for logs
    fn describe(&self) -> String;
}

/// Transport selection parsed from a session key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// UDP to an AMBEserver adapter
    AmbeServer { host: String, port: u16 },
    /// Serial line, 8-N-1 without flow control
    Tty { device: String, baud_rate: u32 },
}

impl TransportConfig {
    /// Validate the `TYPE` discriminator and the fields it requires
    pub fn from_key(key: &SessionKey) -> Result<Self, ConfigError> {
        let kind = key.get("TYPE").ok_or(ConfigError::UnspecifiedType)?;

        match kind {
            "AMBESERVER" => {
                let host = required(key, "AMBESERVER_HOST")?;
                let port = parse_number::<u16>(key, "AMBESERVER_PORT")?;
                Ok(TransportConfig::AmbeServer {
                    host: host.to_string(),
                    port,
                })
            }
            "TTY" => {
                let device = required(key, "TTY_DEVICE")?;
                let baud_rate = parse_number::<u32>(key, "TTY_BAUDRATE")?;
                if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
                    return Err(ConfigError::invalid(
                        "TTY_BAUDRATE",
                        "must be 230400 or 460800",
                    ));
                }
                Ok(TransportConfig::Tty {
                    device: device.to_string(),
                    baud_rate,
                })
            }
            other => Err(ConfigError::UnknownType(other.to_string())),
        }
    }
}

fn required<'a>(key: &'a SessionKey, name: &str) -> Result<&'a str, ConfigError> {
    key.get(name)
        .ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn parse_number<T: std::str::FromStr>(key: &SessionKey, name: &str) -> Result<T, ConfigError> {
    required(key, name)?
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, "not a number"))
}

/// Open the transport a configuration selects
pub fn open_transport(config: &TransportConfig) -> Result<Box<dyn Transport>, TransportError> {
    match config {
        TransportConfig::AmbeServer { host, port } => Ok(Box::new(AmbeServerTransport::open(
            host,
            *port,
            ResolvePolicy::default(),
        )?)),
        #[cfg(feature = "serial")]
        TransportConfig::Tty { device, baud_rate } => {
            Ok(Box::new(SerialTransport::open(device, *baud_rate)?))
        }
        #[cfg(not(feature = "serial"))]
        TransportConfig::Tty { device, .. } => Err(TransportError::OpenFailed {
            device: device.clone(),
            reason: "serial support not compiled in".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pairs: &[(&str, &str)]) -> SessionKey {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_tty_config() {
        let cfg = TransportConfig::from_key(&key(&[
            ("TYPE", "TTY"),
            ("TTY_DEVICE", "/dev/ttyUSB0"),
            ("TTY_BAUDRATE", "460800"),
        ]))
        .unwrap();
        assert_eq!(
            cfg,
            TransportConfig::Tty {
                device: "/dev/ttyUSB0".into(),
                baud_rate: 460_800
            }
        );
    }

    #[test]
    fn test_invalid_baud_rate() {
        let err = TransportConfig::from_key(&key(&[
            ("TYPE", "TTY"),
            ("TTY_DEVICE", "/dev/ttyUSB0"),
            ("TTY_BAUDRATE", "115200"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "TTY_BAUDRATE"));
    }

    #[test]
    fn test_missing_fields() {
        let err = TransportConfig::from_key(&key(&[("TYPE", "AMBESERVER")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref k) if k == "AMBESERVER_HOST"));

        let err = TransportConfig::from_key(&key(&[
            ("TYPE", "AMBESERVER"),
            ("AMBESERVER_HOST", "localhost"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref k) if k == "AMBESERVER_PORT"));
    }

    #[test]
    fn test_type_discriminator() {
        assert!(matches!(
            TransportConfig::from_key(&key(&[])),
            Err(ConfigError::UnspecifiedType)
        ));
        assert!(matches!(
            TransportConfig::from_key(&key(&[("TYPE", "USB")])),
            Err(ConfigError::UnknownType(_))
        ));
    }
}
