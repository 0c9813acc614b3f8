//! Idle/active tracking at the ends of a pipeline

/// State of one audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Active,
    /// Upstream flushed, waiting for the flush to complete
    Flushing,
}

/// Tracks writes and flushes passing one point of a pipeline.
///
/// Each method returns the new state when it changed, so the owner can
/// react to transitions only.
#[derive(Debug, Clone)]
pub struct StreamStateDetector {
    state: StreamState,
}

impl StreamStateDetector {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == StreamState::Idle
    }

    pub fn is_active(&self) -> bool {
        self.state == StreamState::Active
    }

    pub fn is_flushing(&self) -> bool {
        self.state == StreamState::Flushing
    }

    /// Samples were written
    pub fn on_write(&mut self) -> Option<StreamState> {
        self.transition(StreamState::Active)
    }

    /// Upstream requested a flush. Ignored while idle.
    pub fn on_flush(&mut self) -> Option<StreamState> {
        match self.state {
            StreamState::Active => self.transition(StreamState::Flushing),
            _ => None,
        }
    }

    /// The flush completed. Only a flushing stream becomes idle.
    pub fn on_flushed(&mut self) -> Option<StreamState> {
        match self.state {
            StreamState::Flushing => self.transition(StreamState::Idle),
            _ => None,
        }
    }

    fn transition(&mut self, next: StreamState) -> Option<StreamState> {
        if self.state == next {
            return None;
        }
        tracing::trace!("Stream state {:?} -> {:?}", self.state, next);
        self.state = next;
        Some(next)
    }
}

impl Default for StreamStateDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut det = StreamStateDetector::new();
        assert!(det.is_idle());

        assert_eq!(det.on_write(), Some(StreamState::Active));
        assert_eq!(det.on_write(), None);
        assert_eq!(det.on_flush(), Some(StreamState::Flushing));
        assert_eq!(det.on_flushed(), Some(StreamState::Idle));
    }

    #[test]
    fn test_spurious_signals_are_ignored() {
        let mut det = StreamStateDetector::new();
        assert_eq!(det.on_flush(), None);
        assert_eq!(det.on_flushed(), None);

        det.on_write();
        // completion without a flush request
        assert_eq!(det.on_flushed(), None);
        assert!(det.is_active());

        det.on_flush();
        assert_eq!(det.on_write(), Some(StreamState::Active));
    }
}
