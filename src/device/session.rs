//! DV3K vocoder session
//!
//! A session owns one transport and drives the control handshake
//! (product id, then version string) before forwarding audio frames to
//! the local consumer. All methods are non-blocking; the host feeds
//! received chunks in and the session answers through the transport.

use bytes::Bytes;

use super::frame::{
    control, control_request, packetize_superframe, Frame, FrameType, HEADER_LEN,
};
use super::profile::{pcm_from_payload, HardwareProfile};
use super::reassembly::Reassembler;
use super::transport::Transport;
use crate::error::{Error, TransportError};

/// Handshake progress of one vocoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Transport not opened yet
    Offline,
    /// Device announced a reset, handshake restarts on the next control frame
    Reset,
    ProdIdRequested,
    VersIdRequested,
    Ready,
    /// Handshake completed but audio could not be written
    Warning,
    /// A handshake request could not be sent
    Error,
}

/// Receiver of audio coming back from the vocoder
pub trait VocoderSink {
    /// Encoded bytes produced by the hardware encoder
    fn encoded_samples(&mut self, data: &[u8]);

    /// PCM produced by the hardware decoder, normalised to [-1, 1]
    fn decoded_samples(&mut self, samples: &[f32]);
}

/// Session counters
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub frames_received: u64,
    pub resyncs: u64,
    pub unknown_frames: u64,
}

/// One vocoder behind one transport
pub struct Dv3kSession {
    transport: Box<dyn Transport>,
    profile: Box<dyn HardwareProfile>,
    reassembler: Reassembler,
    state: HandshakeState,
    product_id: Option<String>,
    version: Option<String>,
    stats: SessionStats,
}

impl Dv3kSession {
    /// Wrap a transport without talking to the device yet
    pub fn new(transport: Box<dyn Transport>, profile: Box<dyn HardwareProfile>) -> Self {
        Self {
            transport,
            profile,
            reassembler: Reassembler::new(),
            state: HandshakeState::Offline,
            product_id: None,
            version: None,
            stats: SessionStats::default(),
        }
    }

    /// Wrap a transport and start the handshake
    pub fn open(
        transport: Box<dyn Transport>,
        profile: Box<dyn HardwareProfile>,
    ) -> Result<Self, TransportError> {
        let mut session = Self::new(transport, profile);
        session.start()?;
        Ok(session)
    }

    /// Send the product id request that opens the handshake
    pub fn start(&mut self) -> Result<(), TransportError> {
        tracing::info!("Opening vocoder on {}", self.transport.describe());
        self.reassembler.reset();
        self.request(control::PRODID, HandshakeState::ProdIdRequested)
    }

    /// Swap in a freshly opened transport and restart the handshake
    pub fn reopen(&mut self, transport: Box<dyn Transport>) -> Result<(), TransportError> {
        self.transport.close();
        self.transport = transport;
        self.state = HandshakeState::Reset;
        self.product_id = None;
        self.version = None;
        self.start()
    }

    /// Handle one chunk as delivered by the transport
    pub fn on_bytes_received(
        &mut self,
        chunk: &[u8],
        sink: &mut dyn VocoderSink,
    ) -> Result<(), TransportError> {
        if chunk.len() < HEADER_LEN {
            tracing::warn!(
                "Vocoder frame too short ({} bytes), re-requesting product id",
                chunk.len()
            );
            self.resync()?;
            // the partial frame survives, a short chunk may still finish it
            if !self.reassembler.has_pending() {
                return Ok(());
            }
        }

        let frames = match self.reassembler.push(chunk) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!("Dropping corrupt vocoder data: {}", e);
                return self.resync();
            }
        };

        for frame in frames {
            self.dispatch(frame, sink)?;
        }
        Ok(())
    }

    /// Drain everything the transport has received. Returns the number
    /// of chunks handled.
    pub fn poll(&mut self, sink: &mut dyn VocoderSink) -> Result<usize, TransportError> {
        let mut chunks = 0;
        while let Some(chunk) = self.transport.poll_received()? {
            self.on_bytes_received(&chunk, sink)?;
            chunks += 1;
        }
        Ok(chunks)
    }

    /// Send one encoded superframe to the hardware decoder
    pub fn write_encoded_samples(&mut self, superframe: &[u8]) -> Result<(), Error> {
        let packed = self
            .profile
            .pack_for_decoding(Bytes::copy_from_slice(superframe));
        for subframe in packetize_superframe(&packed)? {
            self.send_data(&subframe)?;
        }
        Ok(())
    }

    /// Send PCM to the hardware encoder. Returns the samples consumed.
    pub fn write_samples(&mut self, samples: &[f32]) -> Result<usize, Error> {
        let frame = self.profile.pack_for_encoding(samples)?;
        self.send_data(&frame)?;
        Ok(samples.len())
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    /// Product id reported by the device
    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }

    /// Version string reported by the device
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// Close the transport. The session can be reopened later.
    pub fn close(&mut self) {
        self.transport.close();
        self.reassembler.reset();
        self.state = HandshakeState::Offline;
    }

    fn dispatch(
        &mut self,
        frame: Frame,
        sink: &mut dyn VocoderSink,
    ) -> Result<(), TransportError> {
        self.stats.frames_received += 1;

        match frame.frame_type() {
            FrameType::Control => self.handle_control(frame.payload()),
            FrameType::Ambe => {
                match self.profile.unpack_encoded(frame.payload()) {
                    Ok(encoded) => sink.encoded_samples(&encoded),
                    Err(e) => tracing::warn!("Bad AMBE frame from vocoder: {}", e),
                }
                Ok(())
            }
            FrameType::Audio => {
                let payload = self
                    .profile
                    .unpack_decoded(frame.as_bytes().slice(HEADER_LEN..));
                match pcm_from_payload(&payload) {
                    Ok(pcm) => {
                        let samples: Vec<f32> =
                            pcm.iter().map(|&s| s as f32 / 32768.0).collect();
                        sink.decoded_samples(&samples);
                    }
                    Err(e) => tracing::warn!("Bad audio frame from vocoder: {}", e),
                }
                Ok(())
            }
            FrameType::Unknown(t) => {
                self.stats.unknown_frames += 1;
                tracing::warn!("Received unknown vocoder frame type 0x{:02x}", t);
                Ok(())
            }
        }
    }

    fn handle_control(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let field = payload.first().copied();

        match (self.state, field) {
            (HandshakeState::Offline | HandshakeState::Reset, _) => {
                tracing::info!("Vocoder reset ok");
                self.request(control::PRODID, HandshakeState::ProdIdRequested)
            }
            (HandshakeState::ProdIdRequested, Some(control::PRODID)) => {
                let product_id = text_field(&payload[1..]);
                tracing::info!("Vocoder product id: {}", product_id);
                self.product_id = Some(product_id);
                self.request(control::VERSTRING, HandshakeState::VersIdRequested)
            }
            (HandshakeState::VersIdRequested, Some(control::VERSTRING)) => {
                let version = text_field(&payload[1..]);
                tracing::info!("Vocoder version: {}", version);
                self.version = Some(version);
                self.state = HandshakeState::Ready;
                Ok(())
            }
            (
                HandshakeState::Ready | HandshakeState::Warning | HandshakeState::Error,
                Some(control::READY),
            ) => {
                tracing::info!("Vocoder announced a restart, repeating handshake");
                self.state = HandshakeState::Reset;
                self.request(control::PRODID, HandshakeState::ProdIdRequested)
            }
            (state, field) => {
                tracing::debug!("Ignoring control field {:?} in state {:?}", field, state);
                Ok(())
            }
        }
    }

    fn request(
        &mut self,
        field: u8,
        next: HandshakeState,
    ) -> Result<(), TransportError> {
        if let Err(e) = self.transport.send(&control_request(field)) {
            self.state = HandshakeState::Error;
            return Err(e);
        }
        self.state = next;
        Ok(())
    }

    /// Re-issue the product id request without touching the state
    fn resync(&mut self) -> Result<(), TransportError> {
        self.stats.resyncs += 1;
        self.transport.send(&control_request(control::PRODID))
    }

    fn send_data(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let result = self.transport.send(bytes);
        if result.is_err() && self.state == HandshakeState::Ready {
            self.state = HandshakeState::Warning;
        }
        result
    }
}

impl Drop for Dv3kSession {
    fn drop(&mut self) {
        self.transport.close();
    }
}

/// NUL terminated text inside a control response
fn text_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}
