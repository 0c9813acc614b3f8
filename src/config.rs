//! Configuration
//!
//! Loaded from a TOML file. Missing optional keys take the documented
//! defaults; required keys are checked by [`LogicConfig::validate`] so
//! that a bad configuration stops the logic before anything is opened.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::audio::FilterBank;
use crate::codec;
use crate::constants::{
    DEFAULT_USRP_RX_PORT, DEFAULT_USRP_TX_PORT, MAX_CALLSIGN_LEN, NETWORK_SAMPLE_RATE,
};
use crate::device::{SessionKey, TransportConfig};
use crate::error::ConfigError;

/// Whole application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub logic: LogicConfig,
    /// Vocoder session options, if a vocoder is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambe: Option<SessionKey>,
}

impl AppConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logic.validate()?;
        if let Some(key) = &self.ambe {
            TransportConfig::from_key(key)?;
        }
        Ok(())
    }

    /// Per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "digivoice", "digivoice-bridge")
            .map(|dirs| dirs.config_dir().join("bridge.toml"))
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Network streaming engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicConfig {
    /// Prefix of every emitted event
    pub name: String,
    pub usrp_host: Option<String>,
    pub usrp_tx_port: u16,
    pub usrp_rx_port: u16,
    pub callsign: Option<String>,
    pub dmr_id: Option<u32>,
    pub rpt_id: u32,
    pub default_tg: u32,
    pub default_cc: u8,
    pub default_ts: u8,
    /// Gain towards the network in dB, 0 disables the stage
    pub preamp: f32,
    /// Gain from the network in dB, 0 disables the stage
    pub net_preamp: f32,
    pub filter_to_usrp: Option<String>,
    pub filter_from_usrp: Option<String>,
    /// Jitter FIFO pre-buffer in milliseconds
    pub jitter_buffer_delay: u32,
    pub event_handler: Option<String>,
    pub codec: String,
}

impl Default for LogicConfig {
    fn default() -> Self {
        Self {
            name: "UsrpLogic".to_string(),
            usrp_host: None,
            usrp_tx_port: DEFAULT_USRP_TX_PORT,
            usrp_rx_port: DEFAULT_USRP_RX_PORT,
            callsign: None,
            dmr_id: None,
            rpt_id: 0,
            default_tg: 0,
            default_cc: 1,
            default_ts: 1,
            preamp: 0.0,
            net_preamp: 0.0,
            filter_to_usrp: None,
            filter_from_usrp: None,
            jitter_buffer_delay: 0,
            event_handler: None,
            codec: "S16".to_string(),
        }
    }
}

impl LogicConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.usrp_host.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing(format!("{}/usrp_host", self.name)));
        }

        let callsign = self
            .callsign
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConfigError::Missing(format!("{}/callsign", self.name)))?;
        if callsign.len() > MAX_CALLSIGN_LEN {
            return Err(ConfigError::invalid(
                "callsign",
                format!(
                    "{} is too long, at most {} characters",
                    callsign, MAX_CALLSIGN_LEN
                ),
            ));
        }

        if self.event_handler.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing(format!("{}/event_handler", self.name)));
        }

        if self.dmr_id.is_none() {
            tracing::warn!("{}: dmr_id not set, using 0", self.name);
        }
        if self.dmr_id.unwrap_or(0) > 0xFF_FFFF {
            return Err(ConfigError::invalid("dmr_id", "must fit in 24 bits"));
        }
        if self.default_tg > 0xFF_FFFF {
            return Err(ConfigError::invalid("default_tg", "must fit in 24 bits"));
        }

        for filter in [&self.filter_to_usrp, &self.filter_from_usrp]
            .into_iter()
            .flatten()
        {
            FilterBank::from_profile(filter, NETWORK_SAMPLE_RATE)
                .map_err(|e| ConfigError::invalid("filter", e.to_string()))?;
        }

        codec::create_encoder(&self.codec)
            .map_err(|e| ConfigError::invalid("codec", e.to_string()))?;

        Ok(())
    }
}
