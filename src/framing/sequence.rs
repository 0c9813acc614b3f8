//! Wrapping message sequence counter

/// Sequence numbers wrap at this value back to zero
pub const SEQUENCE_MODULUS: u32 = 0x8000;

/// Monotonically increasing sequence counter, modulo [`SEQUENCE_MODULUS`].
///
/// Every outbound message on a session consumes exactly one value,
/// regardless of its kind. The counter is incremented before use, so the
/// first message of a fresh session carries sequence number 1.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter {
    current: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter and return the new value
    pub fn next(&mut self) -> u32 {
        self.current = (self.current + 1) % SEQUENCE_MODULUS;
        self.current
    }

    /// Last value handed out
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_is_one() {
        let mut seq = SequenceCounter::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[test]
    fn test_wraparound_without_skips() {
        let mut seq = SequenceCounter::new();
        let mut prev = seq.current();
        let mut wraps = 0;

        for _ in 0..0x8001 {
            let value = seq.next();
            assert!(value < SEQUENCE_MODULUS);
            if value == 0 {
                assert_eq!(prev, 0x7fff);
                wraps += 1;
            } else {
                assert_eq!(value, prev + 1);
            }
            prev = value;
        }

        assert_eq!(wraps, 1);
        assert_eq!(seq.current(), 1);
    }
}
