//! DV3K vocoder framing engine
//!
//! Reassembles device frames from arbitrary transport chunks, drives the
//! control handshake and packetizes outbound audio into hardware
//! sub-frames.

pub mod frame;
pub mod profile;
pub mod reassembly;
pub mod registry;
pub mod session;
pub mod transport;

pub use frame::{Frame, FrameType};
pub use profile::{Dv3kUsbProfile, HardwareProfile};
pub use reassembly::Reassembler;
pub use registry::{SessionKey, SessionRegistry};
pub use session::{Dv3kSession, HandshakeState, VocoderSink};
pub use transport::{Transport, TransportConfig};
