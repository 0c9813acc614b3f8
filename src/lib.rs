//! # Digital Voice Bridge
//!
//! Framed-protocol plumbing between a DV3K hardware vocoder, a USRP voice
//! network peer and a local audio pipeline.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                         DV3K FRAMING ENGINE (device)                         │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐   ┌─────────────┐      │
//! │  │ Serial/USB  │   │ AMBEserver  │   │    Mock     │   │  Registry   │      │
//! │  │  Transport  │   │  (UDP)      │   │  Transport  │   │ key -> sess │      │
//! │  └──────┬──────┘   └──────┬──────┘   └──────┬──────┘   └─────────────┘      │
//! │         └─────────────────┼─────────────────┘                               │
//! │                           ▼  arbitrary chunks                               │
//! │  ┌─────────────────────────────────────────────────────────────────────┐    │
//! │  │  Reassembler [0x61|len hi|len lo|type|payload]  ->  Frame           │    │
//! │  └─────────────────────────────────────────────────────────────────────┘    │
//! │                           │                                                 │
//! │                           ▼                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────────┐    │
//! │  │  Dv3kSession: PRODID -> VERSTRING -> READY, sub-frame packetizer    │    │
//! │  └─────────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                      USRP STREAMING ENGINE (network)                         │
//! │                                                                              │
//! │  local audio ─► Pipeline (gain, decimate, filter) ─► Encoder                 │
//! │                                                        │                     │
//! │                                                        ▼                     │
//! │                    SampleAccumulator ─► 160 sample frames ─► outbox ─► UDP   │
//! │                                                                              │
//! │  UDP ─► UsrpMessage::decode ─┬─► Decoder ─► Pipeline (jitter, filter,        │
//! │                              │              gain, interpolate) ─► AudioSink  │
//! │                              └─► metadata ─► EventSink                       │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both engines are sans-IO: hosts feed bytes, datagrams and time in, and
//! drain outbound data. The binaries in `src/bin` wire them to tokio.

pub mod audio;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod framing;
pub mod network;
pub mod timer;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Samples per USRP voice frame (20 ms at 8 kHz)
    pub const USRP_AUDIO_FRAME_LEN: usize = 160;

    /// Size of the USRP message header
    pub const USRP_HEADER_LEN: usize = 32;

    /// Default UDP port the peer listens on
    pub const DEFAULT_USRP_TX_PORT: u16 = 41234;

    /// Default UDP port we listen on
    pub const DEFAULT_USRP_RX_PORT: u16 = 41233;

    /// Longest callsign carried in station metadata
    pub const MAX_CALLSIGN_LEN: usize = 6;

    /// Sample rate of the local audio pipeline
    pub const INTERNAL_SAMPLE_RATE: u32 = 16000;

    /// Sample rate on the USRP link
    pub const NETWORK_SAMPLE_RATE: u32 = 8000;

    /// Time allowed for an encoder to finish flushing
    pub const FLUSH_TIMEOUT: Duration = Duration::from_millis(3000);

    /// Voice silence after which the talker is considered gone
    pub const TALKER_TIMEOUT: Duration = Duration::from_secs(3);

    /// Watchdog tick interval
    pub const TIMER_TICK: Duration = Duration::from_secs(1);

    /// Jitter FIFO capacity in samples
    pub const JITTER_FIFO_CAPACITY: usize = 2 * INTERNAL_SAMPLE_RATE as usize;
}
