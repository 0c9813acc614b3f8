//! Inbound chunk reassembly
//!
//! Neither the serial line nor the UDP adapter preserves write
//! boundaries, so a frame may arrive split over several chunks and one
//! chunk may carry several frames. The reassembler keeps the partial
//! frame as retained state between calls.
//!
//! Rules, per chunk:
//!
//! 1. No partial frame pending and the chunk does not begin with the
//!    start byte: the chunk is noise and is discarded.
//! 2. Otherwise the chunk is appended to the pending buffer and complete
//!    frames (`HEADER_LEN + declared length` bytes) are cut from its front.
//! 3. Bytes left after a frame are kept as the start of the next frame if
//!    they begin with the start byte and dropped otherwise.
//! 4. A partial frame is pending but the chunk is, on its own, exactly one
//!    complete frame (start byte, declared length matching the chunk) and
//!    does not exactly finish the partial: the partial is stale, left over
//!    from a device reset. It is dropped and the chunk handled alone.
//!
//! Rule 4 trades a small ambiguity for recovery: a continuation chunk
//! whose first bytes happen to look like a header of exactly its own
//! length is taken as a new frame.
//!
//! A declared length above the configured maximum is rejected before any
//! payload is buffered, so the buffer never grows past one maximal frame
//! plus the chunk being processed.

use bytes::BytesMut;

use super::frame::{declared_payload_len, Frame, HEADER_LEN, MAX_PAYLOAD_LEN, START_BYTE};
use crate::error::DeviceError;

/// Frame reassembly buffer
#[derive(Debug)]
pub struct Reassembler {
    /// Bytes of the frame currently being assembled
    pending: BytesMut,
    /// Payload length of the pending frame, 0 when none is pending or its
    /// header is still incomplete
    expected_len: usize,
    max_payload_len: usize,
    /// Chunks dropped as noise
    discarded: u64,
    /// Partial frames dropped by a following complete frame
    stale: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_LEN)
    }

    pub fn with_max_payload(max_payload_len: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(HEADER_LEN + max_payload_len),
            expected_len: 0,
            max_payload_len,
            discarded: 0,
            stale: 0,
        }
    }

    /// Feed one received chunk and return every frame it completes, in order.
    ///
    /// On [`DeviceError::PayloadTooLarge`] the pending state is cleared;
    /// frames completed earlier in the same chunk are lost with it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, DeviceError> {
        let mut frames = Vec::new();

        if chunk.is_empty() {
            return Ok(frames);
        }

        if self.pending.is_empty() && chunk[0] != START_BYTE {
            self.discarded += 1;
            tracing::trace!("Discarding {} byte chunk without start byte", chunk.len());
            return Ok(frames);
        }

        if !self.pending.is_empty() && self.replaces_partial(chunk) {
            tracing::warn!(
                "Dropping stale {} byte partial frame, next chunk is a complete frame",
                self.pending.len()
            );
            self.stale += 1;
            self.reset();
        }

        self.pending.extend_from_slice(chunk);

        loop {
            if self.pending.is_empty() {
                self.expected_len = 0;
                break;
            }

            if self.pending[0] != START_BYTE {
                tracing::trace!(
                    "Dropping {} trailing bytes without start byte",
                    self.pending.len()
                );
                self.reset();
                break;
            }

            let Some(declared) = declared_payload_len(&self.pending) else {
                // header itself is split across chunks
                self.expected_len = 0;
                break;
            };

            if declared > self.max_payload_len {
                self.reset();
                return Err(DeviceError::PayloadTooLarge {
                    declared,
                    max: self.max_payload_len,
                });
            }

            let total = HEADER_LEN + declared;
            if self.pending.len() < total {
                self.expected_len = declared;
                break;
            }

            let bytes = self.pending.split_to(total).freeze();
            self.expected_len = 0;
            frames.push(Frame::parse(bytes)?);
        }

        Ok(frames)
    }

    /// Rule 4: `chunk` is exactly one complete frame and does not finish
    /// the pending partial
    fn replaces_partial(&self, chunk: &[u8]) -> bool {
        if chunk[0] != START_BYTE {
            return false;
        }
        let Some(declared) = declared_payload_len(chunk) else {
            return false;
        };
        if declared > self.max_payload_len || chunk.len() != HEADER_LEN + declared {
            return false;
        }
        let completes_partial = self.expected_len > 0
            && self.pending.len() + chunk.len() == HEADER_LEN + self.expected_len;
        !completes_partial
    }

    /// True while a partial frame is waiting for more bytes
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Payload length of the partial frame, 0 if none
    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn discarded_chunks(&self) -> u64 {
        self.discarded
    }

    pub fn stale_partials(&self) -> u64 {
        self.stale
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.pending.clear();
        self.expected_len = 0;
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
