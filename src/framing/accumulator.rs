//! Fixed-capacity sample accumulator
//!
//! Collects 16-bit samples arriving in arbitrary chunk sizes and hands
//! them out in fixed-size frames. Appends are capacity checked: a push
//! that does not fit is rejected with [`AudioError::BufferOverflow`]
//! and leaves the buffer untouched.

use crate::error::AudioError;

/// Accumulates samples until a full frame is available
#[derive(Debug, Clone)]
pub struct SampleAccumulator {
    samples: Vec<i16>,
    capacity: usize,
    frame_len: usize,
}

impl SampleAccumulator {
    /// Create an accumulator emitting frames of `frame_len` samples and
    /// holding at most `capacity` samples.
    ///
    /// `capacity` is raised to `frame_len` if it is smaller.
    pub fn new(frame_len: usize, capacity: usize) -> Self {
        let capacity = capacity.max(frame_len);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            frame_len,
        }
    }

    /// Append samples. Fails without modifying the buffer if they do not fit.
    pub fn push(&mut self, samples: &[i16]) -> Result<(), AudioError> {
        if samples.len() > self.free() {
            return Err(AudioError::BufferOverflow {
                requested: samples.len(),
                available: self.free(),
            });
        }
        self.samples.extend_from_slice(samples);
        Ok(())
    }

    /// Append as many samples as fit and return how many were taken
    pub fn push_partial(&mut self, samples: &[i16]) -> usize {
        let take = samples.len().min(self.free());
        self.samples.extend_from_slice(&samples[..take]);
        take
    }

    /// Remove and return the oldest full frame, keeping any remainder
    pub fn pop_frame(&mut self) -> Option<Vec<i16>> {
        if self.samples.len() < self.frame_len {
            return None;
        }
        Some(self.samples.drain(..self.frame_len).collect())
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn free(&self) -> usize {
        self.capacity - self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Drop any partial frame
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_extraction_keeps_remainder() {
        let mut acc = SampleAccumulator::new(4, 8);
        acc.push(&[1, 2, 3]).unwrap();
        assert!(acc.pop_frame().is_none());

        acc.push(&[4, 5, 6]).unwrap();
        assert_eq!(acc.pop_frame(), Some(vec![1, 2, 3, 4]));
        assert_eq!(acc.len(), 2);
        assert!(acc.pop_frame().is_none());

        acc.push(&[7, 8]).unwrap();
        assert_eq!(acc.pop_frame(), Some(vec![5, 6, 7, 8]));
        assert!(acc.is_empty());
    }

    #[test]
    fn test_overflow_is_rejected() {
        let mut acc = SampleAccumulator::new(4, 8);
        acc.push(&[0; 6]).unwrap();

        let err = acc.push(&[0; 3]).unwrap_err();
        assert_eq!(
            err,
            AudioError::BufferOverflow {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(acc.len(), 6);
    }

    #[test]
    fn test_push_partial() {
        let mut acc = SampleAccumulator::new(4, 8);
        assert_eq!(acc.push_partial(&[1; 10]), 8);
        assert_eq!(acc.free(), 0);
        assert_eq!(acc.pop_frame(), Some(vec![1; 4]));
        assert_eq!(acc.push_partial(&[2; 2]), 2);
        assert_eq!(acc.len(), 6);
    }
}
