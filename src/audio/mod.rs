//! Audio pipeline stages
//!
//! Stages are plain sample transforms owned by a [`Pipeline`]. The
//! network engine builds one pipeline per direction at initialization
//! and feeds it from its encoder/decoder pair.

pub mod filter;
pub mod jitter;
pub mod pipeline;
pub mod resample;
pub mod stream_state;

pub use filter::{FilterBank, OnePole};
pub use jitter::{JitterFifo, JitterStats};
pub use pipeline::{AudioSink, Gain, NullSink, Pipeline, Stage};
pub use resample::{Decimator, Interpolator};
pub use stream_state::{StreamState, StreamStateDetector};
