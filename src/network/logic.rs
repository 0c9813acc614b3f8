//! USRP streaming logic
//!
//! `UsrpLogic` sits between the local audio pipeline and one USRP peer.
//! It owns no sockets and no clocks: the host feeds it datagrams, local
//! samples and the current time, and drains outbound datagrams from its
//! outbox. State changes are reported through the injected [`EventSink`].
//!
//! ```text
//! local audio -> [preamp] -> [decimate] -> [filter] -> encoder -> 160 sample frames -> outbox
//! datagrams   -> decoder -> [jitter fifo] -> [filter] -> [net preamp] -> [interpolate] -> sink
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use super::message::{
    pack_mode_switch, pack_station_info, pack_stop, pack_voice, StationInfo, UsrpMessage,
};
use super::metadata::{classify, Metadata};
use crate::audio::{
    AudioSink, Decimator, FilterBank, Gain, Interpolator, JitterFifo, Pipeline, StreamState,
    StreamStateDetector,
};
use crate::codec::{self, AudioDecoder, AudioEncoder};
use crate::config::LogicConfig;
use crate::constants::{
    FLUSH_TIMEOUT, INTERNAL_SAMPLE_RATE, JITTER_FIFO_CAPACITY, NETWORK_SAMPLE_RATE,
    TALKER_TIMEOUT, TIMER_TICK, USRP_AUDIO_FRAME_LEN,
};
use crate::error::{CodecError, Error, NetworkError};
use crate::event::{EventSink, LogicEvent};
use crate::framing::{SampleAccumulator, SequenceCounter};
use crate::timer::{OneShotTimer, PeriodicTimer};

/// Digital modes a peer can be asked to switch to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitalMode {
    Dmr,
    Ysf,
    Nxdn,
    P25,
}

impl DigitalMode {
    pub const ALL: [DigitalMode; 4] = [
        DigitalMode::Dmr,
        DigitalMode::Ysf,
        DigitalMode::Nxdn,
        DigitalMode::P25,
    ];

    /// Mode by its index in [`DigitalMode::ALL`]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DigitalMode::Dmr => "DMR",
            DigitalMode::Ysf => "YSF",
            DigitalMode::Nxdn => "NXDN",
            DigitalMode::P25 => "P25",
        }
    }
}

impl fmt::Display for DigitalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigitalMode {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| NetworkError::InvalidPacket(format!("unknown mode {}", s)))
    }
}

/// Traffic counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogicStats {
    pub datagrams_received: u64,
    pub malformed_datagrams: u64,
    pub voice_frames_received: u64,
    pub voice_frames_sent: u64,
    pub messages_sent: u64,
}

/// One USRP streaming endpoint
pub struct UsrpLogic {
    name: String,
    usrp_host: String,
    tx_port: u16,
    rx_port: u16,
    identity: StationInfo,
    codec_name: String,

    seq: SequenceCounter,
    accumulator: SampleAccumulator,
    identified: bool,
    outbox: VecDeque<Bytes>,

    last_talker: Option<Instant>,
    last_tg: u32,
    last_call: String,
    last_dmr_id: u32,

    to_network: Pipeline,
    from_network: Pipeline,
    encoder: Box<dyn AudioEncoder>,
    decoder: Box<dyn AudioDecoder>,
    output: Box<dyn AudioSink>,

    in_state: StreamStateDetector,
    out_state: StreamStateDetector,
    idle: bool,
    flush_timer: OneShotTimer,
    tick: PeriodicTimer,

    events: Box<dyn EventSink>,
    stats: LogicStats,
}

impl UsrpLogic {
    /// Build a logic from validated configuration.
    ///
    /// Decoded network audio is written to `output`. Fails only on
    /// configuration errors.
    pub fn new(
        config: &LogicConfig,
        events: Box<dyn EventSink>,
        output: Box<dyn AudioSink>,
        now: Instant,
    ) -> Result<Self, Error> {
        config.validate()?;

        let usrp_host = config.usrp_host.clone().unwrap_or_default();
        let callsign = config.callsign.clone().unwrap_or_default();
        let identity = StationInfo {
            dmr_id: config.dmr_id.unwrap_or_default(),
            rpt_id: config.rpt_id,
            tg: config.default_tg,
            ts: config.default_ts,
            cc: config.default_cc,
            callsign,
        };

        let mut to_network = Pipeline::new();
        if config.preamp != 0.0 {
            to_network.push(Box::new(Gain::from_db(config.preamp)));
        }
        if INTERNAL_SAMPLE_RATE == 2 * NETWORK_SAMPLE_RATE {
            to_network.push(Box::new(Decimator::new()));
        }
        if let Some(profile) = &config.filter_to_usrp {
            to_network.push(Box::new(FilterBank::from_profile(
                profile,
                NETWORK_SAMPLE_RATE,
            )?));
        }

        let mut from_network = Pipeline::new();
        from_network.push(Box::new(JitterFifo::with_delay_ms(
            JITTER_FIFO_CAPACITY,
            config.jitter_buffer_delay,
            NETWORK_SAMPLE_RATE,
        )));
        if let Some(profile) = &config.filter_from_usrp {
            from_network.push(Box::new(FilterBank::from_profile(
                profile,
                NETWORK_SAMPLE_RATE,
            )?));
        }
        if config.net_preamp != 0.0 {
            from_network.push(Box::new(Gain::from_db(config.net_preamp)));
        }
        if INTERNAL_SAMPLE_RATE == 2 * NETWORK_SAMPLE_RATE {
            from_network.push(Box::new(Interpolator::new()));
        }

        let encoder = codec::create_encoder(&config.codec)?;
        let decoder = codec::create_decoder(&config.codec)?;

        let logic = Self {
            name: config.name.clone(),
            usrp_host,
            tx_port: config.usrp_tx_port,
            rx_port: config.usrp_rx_port,
            identity,
            codec_name: config.codec.to_ascii_uppercase(),
            seq: SequenceCounter::new(),
            accumulator: SampleAccumulator::new(USRP_AUDIO_FRAME_LEN, 2 * USRP_AUDIO_FRAME_LEN),
            identified: false,
            outbox: VecDeque::new(),
            last_talker: None,
            last_tg: config.default_tg,
            last_call: String::new(),
            last_dmr_id: 0,
            to_network,
            from_network,
            encoder,
            decoder,
            output,
            in_state: StreamStateDetector::new(),
            out_state: StreamStateDetector::new(),
            idle: true,
            flush_timer: OneShotTimer::new(FLUSH_TIMEOUT),
            tick: PeriodicTimer::new(TIMER_TICK, now),
            events,
            stats: LogicStats::default(),
        };

        info!(
            "{}: USRP peer {}:{}, listening on {}, pipeline out {:?}, in {:?}",
            logic.name,
            logic.usrp_host,
            logic.tx_port,
            logic.rx_port,
            logic.to_network.stage_names(),
            logic.from_network.stage_names()
        );
        info!("{}: {}", logic.name, logic.info_json());
        Ok(logic)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host outbound datagrams are addressed to
    pub fn usrp_host(&self) -> &str {
        &self.usrp_host
    }

    pub fn tx_port(&self) -> u16 {
        self.tx_port
    }

    pub fn rx_port(&self) -> u16 {
        self.rx_port
    }

    pub fn identity(&self) -> &StationInfo {
        &self.identity
    }

    /// True once metadata went out for the current transmission
    pub fn is_identified(&self) -> bool {
        self.identified
    }

    /// Both directions idle
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn stats(&self) -> &LogicStats {
        &self.stats
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    /// Last talker seen on the network: callsign, talkgroup, DMR id
    pub fn last_talker(&self) -> (&str, u32, u32) {
        (&self.last_call, self.last_tg, self.last_dmr_id)
    }

    /// Select the talkgroup announced in outgoing metadata
    pub fn set_talkgroup(&mut self, tg: u32) {
        self.identity.tg = tg;
    }

    /// Datagrams waiting to be sent, oldest first
    pub fn drain_outbound(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.outbox.drain(..)
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbox.len()
    }

    /// Earliest instant at which [`UsrpLogic::poll`] has work to do
    pub fn next_deadline(&self) -> Instant {
        let tick = self.tick.next_deadline();
        match self.flush_timer.deadline() {
            Some(flush) => flush.min(tick),
            None => tick,
        }
    }

    /// Run timers that are due
    pub fn poll(&mut self, now: Instant) {
        if self.flush_timer.expired(now) {
            debug!("{}: Encoder flush timed out", self.name);
            self.complete_flush();
        }
        if self.tick.poll(now) {
            self.on_timer_tick(now);
        }
    }

    /// Talker watchdog: flush the decoder when voice stopped without a
    /// stop message
    pub fn on_timer_tick(&mut self, now: Instant) {
        if let Some(last) = self.last_talker {
            if now.saturating_duration_since(last) > TALKER_TIMEOUT {
                info!("{}: Last talker audio timeout", self.name);
                self.flush_decoder();
                self.last_talker = None;
            }
        }
    }

    /// Handle one datagram from the peer. Malformed input is logged and
    /// dropped.
    pub fn on_datagram(&mut self, datagram: &[u8], now: Instant) {
        self.stats.datagrams_received += 1;

        let message = match UsrpMessage::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed_datagrams += 1;
                warn!("{}: Unpacking failed: {}", self.name, e);
                return;
            }
        };

        match message {
            UsrpMessage::VoiceStop { .. } => self.handle_stream_stop(),
            UsrpMessage::Voice { samples, .. } => self.handle_voice(&samples, now),
            UsrpMessage::Text { body, .. } => self.handle_text(&body),
            UsrpMessage::Dtmf { tg, .. } => {
                self.emit(LogicEvent::TuneTgReceived { tg });
            }
            UsrpMessage::Ping { .. } => trace!("{}: Ping", self.name),
            UsrpMessage::Other { header } => {
                warn!(
                    "{}: Unknown message type received: {}",
                    self.name, header.msg_type
                );
            }
        }
    }

    /// Local audio headed for the network
    pub fn write_samples(&mut self, samples: &[f32]) -> usize {
        if let Some(state) = self.in_state.on_write() {
            self.on_in_state_changed(state);
        }
        let processed = self.to_network.process(samples);
        if !processed.is_empty() {
            let encoded = self.encoder.encode(&processed);
            self.write_encoded_audio(&encoded);
        }
        samples.len()
    }

    /// End of a local transmission.
    ///
    /// The stop message goes out once the encoder has flushed, either
    /// right away or after [`UsrpLogic::encoder_flushed`] or the flush
    /// timeout.
    pub fn flush_samples(&mut self, now: Instant) {
        if let Some(state) = self.in_state.on_flush() {
            self.on_in_state_changed(state);
        }

        let tail = self.to_network.flush();
        if !tail.is_empty() {
            let encoded = self.encoder.encode(&tail);
            self.write_encoded_audio(&encoded);
        }

        let flush = self.encoder.flush();
        if !flush.data.is_empty() {
            self.write_encoded_audio(&flush.data);
        }
        if flush.complete {
            self.complete_flush();
        } else {
            self.flush_timer.enable(now);
        }
    }

    /// Encoded 16-bit little endian audio to be framed and sent
    pub fn write_encoded_audio(&mut self, data: &[u8]) {
        if !self.identified {
            self.send_meta_msg();
        }
        self.flush_timer.disable();

        if data.len() % 2 != 0 {
            warn!(
                "{}: Dropping odd trailing byte of {} byte encoded block",
                self.name,
                data.len()
            );
        }
        let samples: Vec<i16> = data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let mut rest = samples.as_slice();
        while !rest.is_empty() {
            let taken = self.accumulator.push_partial(rest);
            rest = &rest[taken..];
            while let Some(frame) = self.accumulator.pop_frame() {
                self.send_audio_msg(&frame);
            }
            if taken == 0 {
                error!("{}: Sample accumulator stalled", self.name);
                break;
            }
        }
    }

    /// An encoder that reported an incomplete flush has finished
    pub fn encoder_flushed(&mut self) {
        self.flush_timer.disable();
        self.complete_flush();
    }

    /// The audio sink finished a flush it could not complete synchronously
    pub fn output_flushed(&mut self) {
        if self.out_state.on_flushed().is_some() {
            self.check_idle();
        }
    }

    /// Ask the peer to switch digital mode
    pub fn switch_mode(&mut self, mode: DigitalMode) -> Result<(), NetworkError> {
        let seq = self.seq.next();
        let msg = pack_mode_switch(seq, mode.as_str())?;
        self.push_outbound(msg);
        self.emit(LogicEvent::SwitchToMode(mode.as_str().to_string()));
        Ok(())
    }

    /// Replace the codec pair by name. The old pair is drained into the
    /// same downstream paths first.
    pub fn set_audio_codec(&mut self, name: &str) -> Result<(), CodecError> {
        let encoder = codec::create_encoder(name)?;
        let decoder = codec::create_decoder(name)?;
        self.replace_codecs(encoder, decoder);
        self.codec_name = name.to_ascii_uppercase();
        info!("{}: Using audio codec {}", self.name, self.codec_name);
        Ok(())
    }

    pub fn replace_codecs(
        &mut self,
        encoder: Box<dyn AudioEncoder>,
        decoder: Box<dyn AudioDecoder>,
    ) {
        let mut old_decoder = std::mem::replace(&mut self.decoder, decoder);
        let tail = old_decoder.flush();
        if !tail.is_empty() {
            self.deliver_decoded(&tail);
        }

        let mut old_encoder = std::mem::replace(&mut self.encoder, encoder);
        let flush = old_encoder.flush();
        if !flush.data.is_empty() {
            self.write_encoded_audio(&flush.data);
        }
    }

    /// Identity document announced to monitoring tools
    pub fn info_json(&self) -> String {
        let doc = serde_json::json!({
            "ab": {
                "version": format!("digivoice-bridge,{}", env!("CARGO_PKG_VERSION")),
            },
            "digital": {
                "gw": self.identity.dmr_id,
                "rpt": self.identity.rpt_id,
                "tg": self.identity.tg,
                "ts": self.identity.ts,
                "cc": self.identity.cc,
                "call": self.identity.callsign,
            },
        });
        doc.to_string()
    }

    fn handle_voice(&mut self, samples: &[i16], now: Instant) {
        self.stats.voice_frames_received += 1;
        self.last_talker = Some(now);

        let encoded: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        match self.decoder.decode(&encoded) {
            Ok(decoded) => self.deliver_decoded(&decoded),
            Err(e) => warn!("{}: Dropping voice frame: {}", self.name, e),
        }
    }

    fn handle_stream_stop(&mut self) {
        self.flush_decoder();
        self.check_idle();
        self.complete_flush();
        self.last_talker = None;
        self.emit(LogicEvent::TalkerStop {
            tg: self.last_tg,
            callsign: self.last_call.clone(),
        });
    }

    fn handle_text(&mut self, body: &[u8]) {
        match classify(body) {
            Ok(Metadata::Talker(talker)) => {
                self.last_call = talker.callsign;
                self.last_tg = talker.tg;
                self.last_dmr_id = talker.dmr_id;
            }
            Ok(Metadata::Settings(value)) => {
                self.emit(LogicEvent::SettingMode(value));
                return;
            }
            Ok(Metadata::Info) => return,
            Ok(Metadata::Unrecognized) => {
                debug!("{}: Unrecognised text message", self.name);
            }
            Err(e) => {
                warn!("{}: Unpacking failed: {}", self.name, e);
                return;
            }
        }

        self.emit(LogicEvent::StationDataReceived {
            callsign: self.last_call.clone(),
            tg: self.last_tg,
            dmr_id: self.last_dmr_id,
        });
    }

    fn deliver_decoded(&mut self, samples: &[f32]) {
        let out = self.from_network.process(samples);
        self.write_output(&out);
    }

    fn write_output(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        if self.out_state.on_write().is_some() {
            self.check_idle();
        }
        self.output.write_samples(samples);
    }

    fn flush_decoder(&mut self) {
        let tail = self.decoder.flush();
        let mut out = if tail.is_empty() {
            Vec::new()
        } else {
            self.from_network.process(&tail)
        };
        out.extend(self.from_network.flush());
        self.write_output(&out);

        if self.out_state.on_flush().is_some() {
            self.check_idle();
            if self.output.flush_samples() {
                self.output_flushed();
            }
        }
    }

    fn complete_flush(&mut self) {
        if let Some(state) = self.in_state.on_flushed() {
            self.on_in_state_changed(state);
        }
    }

    fn on_in_state_changed(&mut self, state: StreamState) {
        self.check_idle();
        if state == StreamState::Idle {
            self.send_stop_msg();
        }
    }

    fn check_idle(&mut self) {
        let idle = self.in_state.is_idle() && self.out_state.is_idle();
        if idle != self.idle {
            self.idle = idle;
            debug!(
                "{}: Logic is now {}",
                self.name,
                if idle { "idle" } else { "active" }
            );
        }
    }

    fn send_meta_msg(&mut self) {
        let seq = self.seq.next();
        match pack_station_info(seq, &self.identity) {
            Ok(msg) => {
                debug!(
                    "{}: Sending identity {} tg {} seq {}",
                    self.name, self.identity.callsign, self.identity.tg, seq
                );
                self.push_outbound(msg);
                self.identified = true;
                self.emit(LogicEvent::TransmissionStart {
                    tg: self.identity.tg,
                });
            }
            Err(e) => error!("{}: Packing metadata failed: {}", self.name, e),
        }
    }

    fn send_audio_msg(&mut self, frame: &[i16]) {
        let seq = self.seq.next();
        match pack_voice(seq, frame) {
            Ok(msg) => {
                self.stats.voice_frames_sent += 1;
                self.push_outbound(msg);
            }
            Err(e) => error!("{}: Packing audio failed: {}", self.name, e),
        }
    }

    fn send_stop_msg(&mut self) {
        let seq = self.seq.next();
        self.push_outbound(pack_stop(seq));
        self.identified = false;
        self.emit(LogicEvent::TransmissionStop {
            tg: self.identity.tg,
        });
    }

    fn push_outbound(&mut self, msg: Bytes) {
        self.stats.messages_sent += 1;
        self.outbox.push_back(msg);
    }

    fn emit(&mut self, event: LogicEvent) {
        let command = format!("{}::{}", self.name, event);
        debug!("{}: Event {}", self.name, command);
        self.events.process_event(&command);
        self.check_idle();
    }
}

impl fmt::Debug for UsrpLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsrpLogic")
            .field("name", &self.name)
            .field("usrp_host", &self.usrp_host)
            .field("tx_port", &self.tx_port)
            .field("rx_port", &self.rx_port)
            .field("identified", &self.identified)
            .field("idle", &self.idle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EncoderFlush, EncoderStats, S16Decoder};
    use crate::network::message::{tlv, MessageType, UsrpHeader, USRP_MAGIC};
    use crossbeam_channel::Receiver;
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::event::ChannelEventSink;

    #[derive(Default)]
    struct Captured {
        samples: Vec<f32>,
        flushes: usize,
    }

    struct CaptureSink {
        captured: Arc<Mutex<Captured>>,
        sync_flush: bool,
    }

    impl AudioSink for CaptureSink {
        fn write_samples(&mut self, samples: &[f32]) -> usize {
            self.captured.lock().samples.extend_from_slice(samples);
            samples.len()
        }

        fn flush_samples(&mut self) -> bool {
            self.captured.lock().flushes += 1;
            self.sync_flush
        }
    }

    /// Encoder whose flush completes later
    struct SlowEncoder;

    impl AudioEncoder for SlowEncoder {
        fn name(&self) -> &'static str {
            "SLOW"
        }

        fn encode(&mut self, samples: &[f32]) -> Bytes {
            samples
                .iter()
                .flat_map(|s| ((s * 32767.0) as i16).to_le_bytes())
                .collect::<Vec<u8>>()
                .into()
        }

        fn flush(&mut self) -> EncoderFlush {
            EncoderFlush {
                data: Bytes::new(),
                complete: false,
            }
        }

        fn stats(&self) -> EncoderStats {
            EncoderStats::default()
        }
    }

    struct Harness {
        logic: UsrpLogic,
        events: Receiver<String>,
        captured: Arc<Mutex<Captured>>,
        start: Instant,
    }

    impl Harness {
        fn events(&self) -> Vec<String> {
            self.events.try_iter().collect()
        }

        fn sent(&mut self) -> Vec<Bytes> {
            self.logic.drain_outbound().collect()
        }
    }

    fn config() -> LogicConfig {
        LogicConfig {
            usrp_host: Some("127.0.0.1".to_string()),
            callsign: Some("W1AW".to_string()),
            dmr_id: Some(3_100_001),
            default_tg: 91,
            event_handler: Some("events.tcl".to_string()),
            ..LogicConfig::default()
        }
    }

    fn harness_with(config: LogicConfig, sync_flush: bool) -> Harness {
        let (sink, events) = ChannelEventSink::new();
        let captured = Arc::new(Mutex::new(Captured::default()));
        let output = CaptureSink {
            captured: captured.clone(),
            sync_flush,
        };
        let start = Instant::now();
        let logic = UsrpLogic::new(&config, Box::new(sink), Box::new(output), start).unwrap();
        Harness {
            logic,
            events,
            captured,
            start,
        }
    }

    fn harness() -> Harness {
        harness_with(config(), true)
    }

    fn header_bytes(msg_type: MessageType, seq: u32, keyup: bool) -> Vec<u8> {
        let mut header = UsrpHeader::new(msg_type, seq);
        header.keyup = keyup;
        let mut buf = bytes::BytesMut::new();
        header.write_to(&mut buf);
        buf.to_vec()
    }

    fn voice_datagram(value: i16) -> Vec<u8> {
        let mut buf = header_bytes(MessageType::Voice, 1, true);
        for _ in 0..USRP_AUDIO_FRAME_LEN {
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf
    }

    fn text_datagram(body: &[u8]) -> Vec<u8> {
        let mut buf = header_bytes(MessageType::Text, 1, false);
        buf.extend_from_slice(body);
        buf.resize(buf.len() + 320 - body.len(), 0);
        buf
    }

    fn seq_of(msg: &[u8]) -> u32 {
        UsrpHeader::parse(msg).unwrap().seq
    }

    fn encoded(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let (sink, _events) = ChannelEventSink::new();
        let mut config = config();
        config.callsign = None;
        let output = Box::new(crate::audio::NullSink::new());
        let result = UsrpLogic::new(&config, Box::new(sink), output, Instant::now());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_first_audio_sends_metadata_then_frames() {
        let mut h = harness();
        let samples: Vec<i16> = (0..USRP_AUDIO_FRAME_LEN as i16).collect();
        h.logic.write_encoded_audio(&encoded(&samples));

        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[0][..4], USRP_MAGIC);
        match UsrpMessage::decode(&sent[0]).unwrap() {
            UsrpMessage::Text { body, .. } => assert_eq!(body[0], tlv::SET_INFO),
            other => panic!("expected metadata, got {:?}", other),
        }
        match UsrpMessage::decode(&sent[1]).unwrap() {
            UsrpMessage::Voice { samples: got, .. } => assert_eq!(got, samples),
            other => panic!("expected voice, got {:?}", other),
        }
        assert_eq!(seq_of(&sent[0]), 1);
        assert_eq!(seq_of(&sent[1]), 2);
        assert!(h.logic.is_identified());
        assert_eq!(h.events(), vec!["UsrpLogic::transmission_start 91"]);
    }

    #[test]
    fn test_partial_frames_are_held() {
        let mut h = harness();
        h.logic.write_encoded_audio(&encoded(&[1; 100]));
        assert_eq!(h.sent().len(), 1);
        h.logic.write_encoded_audio(&encoded(&[1; 100]));
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(seq_of(&sent[0]), 2);
    }

    #[test]
    fn test_flush_sends_stop_and_goes_idle() {
        let mut h = harness();
        h.logic.write_samples(&[0.1; 320]);
        assert!(!h.logic.is_idle());
        let sent = h.sent();
        assert_eq!(sent.len(), 2);

        h.logic.flush_samples(h.start);
        assert!(h.logic.is_idle());
        assert!(!h.logic.is_identified());
        let sent = h.sent();
        let stop = sent.last().unwrap();
        assert!(matches!(
            UsrpMessage::decode(stop).unwrap(),
            UsrpMessage::VoiceStop { .. }
        ));
        assert_eq!(
            h.events(),
            vec![
                "UsrpLogic::transmission_start 91",
                "UsrpLogic::transmission_stop 91"
            ]
        );
    }

    #[test]
    fn test_flush_while_idle_sends_nothing() {
        let mut h = harness();
        h.logic.flush_samples(h.start);
        assert!(h.sent().is_empty());
        assert!(h.events().is_empty());
        assert!(h.logic.is_idle());
    }

    #[test]
    fn test_flush_timeout_completes_slow_encoder() {
        let mut h = harness();
        h.logic
            .replace_codecs(Box::new(SlowEncoder), Box::new(S16Decoder::new()));
        h.logic.write_samples(&[0.1; 320]);
        h.sent();
        h.logic.flush_samples(h.start);
        assert!(h.sent().is_empty());
        assert!(!h.logic.is_idle());
        assert!(h.logic.next_deadline() <= h.start + FLUSH_TIMEOUT);

        h.logic.poll(h.start + Duration::from_millis(2999));
        assert!(h.sent().is_empty());

        h.logic.poll(h.start + FLUSH_TIMEOUT);
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert!(h.logic.is_idle());
        assert!(h
            .events()
            .contains(&"UsrpLogic::transmission_stop 91".to_string()));
    }

    #[test]
    fn test_encoder_flushed_cancels_timer() {
        let mut h = harness();
        h.logic
            .replace_codecs(Box::new(SlowEncoder), Box::new(S16Decoder::new()));
        h.logic.write_samples(&[0.1; 320]);
        h.logic.flush_samples(h.start);
        h.sent();

        h.logic.encoder_flushed();
        assert_eq!(h.sent().len(), 1);
        h.logic.poll(h.start + FLUSH_TIMEOUT);
        assert!(h.sent().is_empty());
    }

    #[test]
    fn test_inbound_voice_reaches_sink() {
        let mut h = harness();
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        assert_eq!(h.captured.lock().samples.len(), 2 * USRP_AUDIO_FRAME_LEN);
        assert!(!h.logic.is_idle());
        assert_eq!(h.logic.stats().voice_frames_received, 1);
    }

    #[test]
    fn test_stream_stop_flushes_and_reports_talker() {
        let mut h = harness();
        let json = br#"INFO:{"digital":{"call":"K1ABC","tg":3100,"rpt":1234567}}"#;
        h.logic.on_datagram(&text_datagram(json), h.start);
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        h.logic
            .on_datagram(&header_bytes(MessageType::Voice, 2, false), h.start);

        assert_eq!(h.captured.lock().flushes, 1);
        assert!(h.logic.is_idle());
        assert_eq!(
            h.events(),
            vec![
                "UsrpLogic::usrp_stationdata_received K1ABC 3100 1234567",
                "UsrpLogic::talker_stop 3100 K1ABC"
            ]
        );
    }

    #[test]
    fn test_async_output_flush() {
        let mut h = harness_with(config(), false);
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        h.logic
            .on_datagram(&header_bytes(MessageType::Voice, 2, false), h.start);
        assert!(!h.logic.is_idle());
        h.logic.output_flushed();
        assert!(h.logic.is_idle());
    }

    #[test]
    fn test_talker_watchdog() {
        let mut h = harness();
        h.logic.on_datagram(&voice_datagram(1000), h.start);

        h.logic.on_timer_tick(h.start + Duration::from_secs(2));
        assert_eq!(h.captured.lock().flushes, 0);

        h.logic.on_timer_tick(h.start + Duration::from_secs(4));
        assert_eq!(h.captured.lock().flushes, 1);
        assert!(h.logic.is_idle());

        h.logic.on_timer_tick(h.start + Duration::from_secs(8));
        assert_eq!(h.captured.lock().flushes, 1);
    }

    #[test]
    fn test_idle_requires_both_directions() {
        let mut h = harness();
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        h.logic.write_samples(&[0.1; 320]);
        h.logic.flush_samples(h.start);

        // outbound finished, inbound talker still active
        let sent = h.sent();
        assert!(matches!(
            UsrpMessage::decode(sent.last().unwrap()).unwrap(),
            UsrpMessage::VoiceStop { .. }
        ));
        assert!(!h.logic.is_idle());

        h.logic.on_timer_tick(h.start + Duration::from_secs(4));
        assert!(h.logic.is_idle());

        // and the other way round
        h.logic.write_samples(&[0.1; 320]);
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        h.logic.on_timer_tick(h.start + Duration::from_secs(4));
        assert!(!h.logic.is_idle());

        h.logic.flush_samples(h.start);
        assert!(h.logic.is_idle());
    }

    #[test]
    fn test_watchdog_runs_from_poll() {
        let mut h = harness();
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        h.logic.poll(h.start + Duration::from_secs(5));
        assert_eq!(h.captured.lock().flushes, 1);
    }

    #[test]
    fn test_malformed_datagram_is_dropped() {
        let mut h = harness();
        h.logic.on_datagram(b"USRP", h.start);
        h.logic.on_datagram(&[0u8; 40], h.start);
        assert_eq!(h.logic.stats().malformed_datagrams, 2);
        assert!(h.events().is_empty());

        h.logic.on_datagram(&voice_datagram(5), h.start);
        assert!(!h.captured.lock().samples.is_empty());
    }

    #[test]
    fn test_tlv_metadata_event() {
        let mut h = harness();
        let mut body = vec![
            tlv::SET_INFO,
            19,
            0x2F,
            0x4D,
            0x61,
            0,
            0,
            0,
            0,
            0,
            0x0C,
            0x1C,
            1,
            1,
        ];
        body.extend_from_slice(b"N0CALL\0");
        h.logic.on_datagram(&text_datagram(&body), h.start);
        assert_eq!(
            h.events(),
            vec!["UsrpLogic::usrp_stationdata_received N0CALL 3100 3100001"]
        );
        assert_eq!(h.logic.last_talker(), ("N0CALL", 3100, 3_100_001));
    }

    #[test]
    fn test_settings_and_info_text() {
        let mut h = harness();
        h.logic
            .on_datagram(&text_datagram(b"INFO:MSG:Mode changed to DMR"), h.start);
        h.logic
            .on_datagram(&text_datagram(b"INFO:status ok"), h.start);
        assert_eq!(h.events(), vec!["UsrpLogic::setting_mode DMR"]);
    }

    #[test]
    fn test_unrecognised_text_repeats_last_station() {
        let mut h = harness();
        h.logic.on_datagram(&text_datagram(b"hello"), h.start);
        assert_eq!(
            h.events(),
            vec!["UsrpLogic::usrp_stationdata_received  91 0"]
        );
    }

    #[test]
    fn test_dtmf_tunes_talkgroup() {
        let mut h = harness();
        let mut datagram = header_bytes(MessageType::Dtmf, 1, false);
        datagram.extend_from_slice(b"3100\0");
        h.logic.on_datagram(&datagram, h.start);
        assert_eq!(h.events(), vec!["UsrpLogic::usrp_tunetg_received 3100"]);
    }

    #[test]
    fn test_switch_mode() {
        let mut h = harness();
        h.logic.switch_mode(DigitalMode::Ysf).unwrap();
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(seq_of(&sent[0]), 1);
        assert_eq!(&sent[0][32 + 2..32 + 5], b"YSF");
        assert_eq!(h.events(), vec!["UsrpLogic::switch_to_mode YSF"]);
        assert_eq!("nxdn".parse::<DigitalMode>().unwrap(), DigitalMode::Nxdn);
        assert_eq!(DigitalMode::from_index(3), Some(DigitalMode::P25));
        assert_eq!(DigitalMode::from_index(4), None);
    }

    #[test]
    fn test_codec_switch_keeps_output_chain() {
        let mut h = harness();
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        assert!(h.logic.set_audio_codec("bogus").is_err());
        h.logic.set_audio_codec("s16").unwrap();
        assert_eq!(h.logic.codec_name(), "S16");
        h.logic.on_datagram(&voice_datagram(1000), h.start);
        assert_eq!(h.captured.lock().samples.len(), 4 * USRP_AUDIO_FRAME_LEN);
    }

    #[test]
    fn test_info_json() {
        let h = harness();
        let doc: serde_json::Value = serde_json::from_str(&h.logic.info_json()).unwrap();
        assert_eq!(doc["digital"]["call"], "W1AW");
        assert_eq!(doc["digital"]["tg"], 91);
        assert_eq!(doc["digital"]["gw"], 3_100_001);
        assert!(doc["ab"]["version"]
            .as_str()
            .unwrap()
            .starts_with("digivoice-bridge,"));
    }

    proptest! {
        #[test]
        fn test_repacking_preserves_order(chunks in proptest::collection::vec(1usize..400, 1..20)) {
            let mut h = harness();
            let total: usize = chunks.iter().sum();
            let all: Vec<i16> = (0..total).map(|i| (i % 30000) as i16).collect();

            let mut offset = 0;
            for len in &chunks {
                h.logic.write_encoded_audio(&encoded(&all[offset..offset + len]));
                offset += len;
            }

            let sent = h.sent();
            let mut voice = Vec::new();
            let mut expected_seq = 1;
            for msg in &sent {
                prop_assert_eq!(seq_of(msg), expected_seq);
                expected_seq += 1;
                if let UsrpMessage::Voice { samples, .. } = UsrpMessage::decode(msg).unwrap() {
                    voice.extend(samples);
                }
            }
            prop_assert_eq!(sent.len(), 1 + total / USRP_AUDIO_FRAME_LEN);
            let whole = voice.len();
            prop_assert_eq!(&voice[..], &all[..whole]);
        }
    }
}
