//! Factor-of-two sample rate conversion between the internal rate and
//! the network rate.
//!
//! Placeholder stages: pair averaging down, sample-and-hold up. They keep
//! the rate contract of the pipeline; real anti-aliasing belongs to the
//! host's DSP.

use super::pipeline::Stage;

/// Average each pair of samples into one
#[derive(Debug, Clone, Default)]
pub struct Decimator {
    /// First half of a pair split across blocks
    carry: Option<f32>,
}

impl Decimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for Decimator {
    fn name(&self) -> &'static str {
        "decimator"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len() / 2 + 1);
        for &s in input {
            match self.carry.take() {
                Some(first) => out.push((first + s) / 2.0),
                None => self.carry = Some(s),
            }
        }
        out
    }
}

/// Repeat every sample twice
#[derive(Debug, Clone, Default)]
pub struct Interpolator;

impl Interpolator {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for Interpolator {
    fn name(&self) -> &'static str {
        "interpolator"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        input.iter().flat_map(|&s| [s, s]).collect()
    }
}
