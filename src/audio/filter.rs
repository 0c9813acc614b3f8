//! Named filter profiles
//!
//! Each profile is a short chain of one-pole sections. They only need to
//! shape the band roughly; the pipeline treats them as opaque stages.

use std::f32::consts::PI;

use super::pipeline::Stage;
use crate::error::AudioError;

/// Profile names accepted by [`FilterBank::from_profile`]
pub const PROFILES: &[&str] = &["highpass300", "lowpass3000", "voice"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Lowpass,
    Highpass,
}

/// One-pole low-pass, or its complement as a high-pass
#[derive(Debug, Clone)]
pub struct OnePole {
    kind: Kind,
    /// Smoothing coefficient in (0, 1]
    alpha: f32,
    state: f32,
}

impl OnePole {
    pub fn lowpass(sample_rate: u32, cutoff: f32) -> Self {
        Self::new(Kind::Lowpass, sample_rate, cutoff)
    }

    pub fn highpass(sample_rate: u32, cutoff: f32) -> Self {
        Self::new(Kind::Highpass, sample_rate, cutoff)
    }

    fn new(kind: Kind, sample_rate: u32, cutoff: f32) -> Self {
        let alpha = 1.0 - (-2.0 * PI * cutoff / sample_rate as f32).exp();
        Self {
            kind,
            alpha,
            state: 0.0,
        }
    }

    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.state += self.alpha * (x - self.state);
        match self.kind {
            Kind::Lowpass => self.state,
            Kind::Highpass => x - self.state,
        }
    }
}

/// Cascade of sections selected by profile name
#[derive(Debug, Clone)]
pub struct FilterBank {
    profile: String,
    sections: Vec<OnePole>,
}

impl FilterBank {
    pub fn from_profile(profile: &str, sample_rate: u32) -> Result<Self, AudioError> {
        let sections = match profile {
            "highpass300" => vec![OnePole::highpass(sample_rate, 300.0)],
            "lowpass3000" => vec![OnePole::lowpass(sample_rate, 3000.0)],
            "voice" => vec![
                OnePole::highpass(sample_rate, 300.0),
                OnePole::lowpass(sample_rate, 3000.0),
            ],
            other => return Err(AudioError::UnknownFilter(other.to_string())),
        };
        Ok(Self {
            profile: profile.to_string(),
            sections,
        })
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

impl Stage for FilterBank {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        input
            .iter()
            .map(|&x| {
                self.sections
                    .iter_mut()
                    .fold(x, |acc, section| section.process_sample(acc))
            })
            .collect()
    }
}
