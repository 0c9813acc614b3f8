//! Events reported to the host application
//!
//! The network engine reports state changes as plain string commands of
//! the form `<logic name>::<event> <args>`. Where those strings end up
//! is up to the [`EventSink`] the host injects.

use std::fmt;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// State change of a logic instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicEvent {
    /// Local transmission started, metadata sent
    TransmissionStart { tg: u32 },
    /// Local transmission ended, stop message sent
    TransmissionStop { tg: u32 },
    /// Remote talker finished
    TalkerStop { tg: u32, callsign: String },
    StationDataReceived { callsign: String, tg: u32, dmr_id: u32 },
    /// Peer asked to tune to a talkgroup
    TuneTgReceived { tg: u32 },
    /// Operator settings string from the peer
    SettingMode(String),
    SwitchToMode(String),
}

impl LogicEvent {
    /// Command name as seen by event handlers
    pub fn name(&self) -> &'static str {
        match self {
            LogicEvent::TransmissionStart { .. } => "transmission_start",
            LogicEvent::TransmissionStop { .. } => "transmission_stop",
            LogicEvent::TalkerStop { .. } => "talker_stop",
            LogicEvent::StationDataReceived { .. } => "usrp_stationdata_received",
            LogicEvent::TuneTgReceived { .. } => "usrp_tunetg_received",
            LogicEvent::SettingMode(_) => "setting_mode",
            LogicEvent::SwitchToMode(_) => "switch_to_mode",
        }
    }
}

impl fmt::Display for LogicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            LogicEvent::TransmissionStart { tg }
            | LogicEvent::TransmissionStop { tg }
            | LogicEvent::TuneTgReceived { tg } => write!(f, "{} {}", name, tg),
            LogicEvent::TalkerStop { tg, callsign } => write!(f, "{} {} {}", name, tg, callsign),
            LogicEvent::StationDataReceived {
                callsign,
                tg,
                dmr_id,
            } => write!(f, "{} {} {} {}", name, callsign, tg, dmr_id),
            LogicEvent::SettingMode(value) | LogicEvent::SwitchToMode(value) => {
                write!(f, "{} {}", name, value)
            }
        }
    }
}

/// Receiver of event command strings
pub trait EventSink: Send {
    fn process_event(&mut self, event: &str);
}

/// Logs every event, tagged with the configured handler
#[derive(Debug, Clone)]
pub struct TracingEventSink {
    handler: String,
}

impl TracingEventSink {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
        }
    }
}

impl EventSink for TracingEventSink {
    fn process_event(&mut self, event: &str) {
        tracing::info!(handler = %self.handler, "{}", event);
    }
}

/// Forwards events to another thread or task
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: Sender<String>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn process_event(&mut self, event: &str) {
        if self.tx.send(event.to_string()).is_err() {
            tracing::debug!("Event receiver gone, dropping {}", event);
        }
    }
}

impl EventSink for Vec<String> {
    fn process_event(&mut self, event: &str) {
        self.push(event.to_string());
    }
}
