//! Buffers and counters shared by the device and network engines
//!
//! Both engines receive audio or bytes at a cadence that does not match
//! the fixed frame size of their protocol. Everything that must wait for
//! more data is kept here as retained state, never as a blocking read.

pub mod accumulator;
pub mod sequence;

pub use accumulator::SampleAccumulator;
pub use sequence::SequenceCounter;
