//! In-memory transport for tests and dry runs

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::Transport;
use crate::error::TransportError;

#[derive(Debug, Default)]
struct MockState {
    sent: Vec<Bytes>,
    inbound: VecDeque<Bytes>,
    closed: bool,
}

/// Transport that records sent bytes and replays queued chunks
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Inspection handle that stays valid after the transport is boxed
#[derive(Debug, Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let transport = Self::default();
        let handle = MockHandle {
            state: transport.state.clone(),
        };
        (transport, handle)
    }
}

impl Transport for MockTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.sent.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    fn poll_received(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.state.lock().inbound.pop_front())
    }

    fn close(&mut self) {
        self.state.lock().closed = true;
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

impl MockHandle {
    /// Queue a chunk to be returned by `poll_received`
    pub fn inject(&self, chunk: &[u8]) {
        self.state
            .lock()
            .inbound
            .push_back(Bytes::copy_from_slice(chunk));
    }

    /// Take everything sent so far
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut self.state.lock().sent)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
