//! Explicit registry of vocoder sessions
//!
//! Sessions are keyed by their full option set. The registry is owned by
//! the application and creates at most one session per distinct key.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::profile::Dv3kUsbProfile;
use super::session::{Dv3kSession, VocoderSink};
use super::transport::{open_transport, Transport, TransportConfig};
use crate::error::{Error, TransportError};

/// Ordered option map identifying one vocoder
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionKey(BTreeMap<String, String>);

/// Option values may be written as strings, numbers or booleans
#[derive(Deserialize)]
#[serde(untagged)]
enum OptionValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, OptionValue>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    OptionValue::Text(s) => s,
                    OptionValue::Integer(i) => i.to_string(),
                    OptionValue::Flag(b) => b.to_string(),
                };
                (k, v)
            })
            .collect())
    }
}

impl SessionKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SessionKey {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        Ok(())
    }
}

/// Owner of every live vocoder session
#[derive(Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionKey, Dv3kSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `key`, opening its transport on first use
    pub fn get_or_create(&mut self, key: &SessionKey) -> Result<&mut Dv3kSession, Error> {
        self.get_or_create_with(key, open_transport)
    }

    /// Like [`get_or_create`](Self::get_or_create) with a custom opener
    pub fn get_or_create_with<F>(
        &mut self,
        key: &SessionKey,
        opener: F,
    ) -> Result<&mut Dv3kSession, Error>
    where
        F: FnOnce(&TransportConfig) -> Result<Box<dyn Transport>, TransportError>,
    {
        match self.sessions.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let config = TransportConfig::from_key(key)?;
                let transport = opener(&config)?;
                let session = Dv3kSession::open(transport, Box::new(Dv3kUsbProfile))?;
                tracing::info!("Created vocoder session {}", key);
                Ok(entry.insert(session))
            }
        }
    }

    pub fn get(&self, key: &SessionKey) -> Option<&Dv3kSession> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut Dv3kSession> {
        self.sessions.get_mut(key)
    }

    /// Close and release one session. Returns false if none existed.
    pub fn destroy(&mut self, key: &SessionKey) -> bool {
        match self.sessions.remove(key) {
            Some(mut session) => {
                session.close();
                tracing::info!("Destroyed vocoder session {}", key);
                true
            }
            None => false,
        }
    }

    /// Close and release every session
    pub fn destroy_all(&mut self) {
        for (key, mut session) in std::mem::take(&mut self.sessions) {
            session.close();
            tracing::debug!("Destroyed vocoder session {}", key);
        }
    }

    /// Poll every session once. Transport errors are logged per session.
    pub fn poll_all(&mut self, sink: &mut dyn VocoderSink) -> usize {
        let mut chunks = 0;
        for (key, session) in self.sessions.iter_mut() {
            match session.poll(sink) {
                Ok(n) => chunks += n,
                Err(e) => tracing::warn!("Vocoder session {} failed: {}", key, e),
            }
        }
        chunks
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
