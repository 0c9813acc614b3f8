//! Playout FIFO for decoded network audio
//!
//! Samples are held until the pre-buffer level is reached at the start
//! of each talk spurt, then passed through as they arrive. A flush
//! drains the FIFO and re-arms the pre-buffer for the next spurt.

use std::collections::VecDeque;

use super::pipeline::Stage;

/// Jitter FIFO with a configurable pre-buffer
#[derive(Debug)]
pub struct JitterFifo {
    samples: VecDeque<f32>,
    /// Maximum samples held
    capacity: usize,
    /// Samples collected before playout starts
    prebuf_samples: usize,
    /// True while collecting the pre-buffer
    prebuffering: bool,
    /// Samples received
    received: u64,
    /// Oldest samples dropped because the FIFO was full
    dropped: u64,
    /// Spurts that reached the pre-buffer level
    prebuffer_fills: u64,
}

impl JitterFifo {
    pub fn new(capacity: usize, prebuf_samples: usize) -> Self {
        let prebuf_samples = prebuf_samples.min(capacity);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            prebuf_samples,
            prebuffering: prebuf_samples > 0,
            received: 0,
            dropped: 0,
            prebuffer_fills: 0,
        }
    }

    /// Pre-buffer from a delay in milliseconds at `sample_rate`
    pub fn with_delay_ms(capacity: usize, delay_ms: u32, sample_rate: u32) -> Self {
        let prebuf = delay_ms as usize * sample_rate as usize / 1000;
        Self::new(capacity, prebuf)
    }

    pub fn prebuf_samples(&self) -> usize {
        self.prebuf_samples
    }

    pub fn is_prebuffering(&self) -> bool {
        self.prebuffering
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> JitterStats {
        JitterStats {
            level: self.samples.len(),
            capacity: self.capacity,
            received: self.received,
            dropped: self.dropped,
            prebuffer_fills: self.prebuffer_fills,
        }
    }

    fn drain(&mut self) -> Vec<f32> {
        self.samples.drain(..).collect()
    }
}

impl Stage for JitterFifo {
    fn name(&self) -> &'static str {
        "jitter_fifo"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        self.received += input.len() as u64;

        // a block larger than the FIFO keeps only its newest samples
        let skipped = input.len().saturating_sub(self.capacity);
        let input = &input[skipped..];
        let overflow = (self.samples.len() + input.len()).saturating_sub(self.capacity);
        if skipped + overflow > 0 {
            self.samples.drain(..overflow);
            self.dropped += (skipped + overflow) as u64;
            tracing::debug!("Jitter FIFO overflow, dropped {} samples", skipped + overflow);
        }
        self.samples.extend(input);

        if self.prebuffering {
            if self.samples.len() < self.prebuf_samples {
                return Vec::new();
            }
            self.prebuffering = false;
            self.prebuffer_fills += 1;
        }
        self.drain()
    }

    fn flush(&mut self) -> Vec<f32> {
        self.prebuffering = self.prebuf_samples > 0;
        self.drain()
    }
}

/// Jitter FIFO statistics
#[derive(Debug, Clone)]
pub struct JitterStats {
    pub level: usize,
    pub capacity: usize,
    pub received: u64,
    pub dropped: u64,
    pub prebuffer_fills: u64,
}

impl JitterStats {
    pub fn drop_rate(&self) -> f32 {
        if self.received == 0 {
            0.0
        } else {
            self.dropped as f32 / self.received as f32
        }
    }
}
