//! Frame reassembly
//!
//! The stimulator speaks length-delimited frames over a byte stream that
//! is allowed to carry garbage between them (power-on chatter, coil-swap
//! glitches). The reassembler buffers arriving bytes, extracts frames as
//! they complete, and resynchronizes one byte at a time on anything that
//! does not validate. Dropped bytes are surfaced as garbage runs instead
//! of being silently discarded.

use tracing::trace;

use super::crc;
use super::{END_FLAG, START_FLAG};

/// One unit extracted from the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembled {
    /// A validated frame.
    Frame {
        /// The full frame as it appeared on the wire, flags included.
        raw: Vec<u8>,
        /// The frame body (between length byte and CRC).
        body: Vec<u8>,
    },
    /// Bytes dropped while hunting for the next valid frame.
    Garbage {
        /// The dropped bytes in arrival order.
        raw: Vec<u8>,
    },
}

/// Incremental reassembler over an unreliable byte stream.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: Vec<u8>,
}

impl FrameReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently buffered waiting for a frame to complete.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed newly arrived bytes and drain every frame that completes.
    ///
    /// A frame shorter than its declared length stays buffered until more
    /// data arrives; the chunking of the input never changes what comes
    /// out. A candidate that fails the end-flag or CRC check loses only
    /// its first byte, since the start flag may itself be misaligned
    /// payload data.
    pub fn extend(&mut self, bytes: &[u8]) -> Vec<Reassembled> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        let mut dropped = Vec::new();
        let mut pos = 0;
        loop {
            let rest = &self.buffer[pos..];
            if rest.len() < 4 {
                break;
            }
            if rest[0] != START_FLAG {
                dropped.push(rest[0]);
                pos += 1;
                continue;
            }
            let length = rest[1] as usize;
            let total = length + 4;
            if rest.len() < total {
                break;
            }
            let body = &rest[2..2 + length];
            let end = rest[3 + length];
            let checksum = rest[2 + length];
            if end != END_FLAG || !crc::validate(body, checksum) {
                trace!(length, "discarding corrupt frame candidate, resyncing");
                dropped.push(rest[0]);
                pos += 1;
                continue;
            }
            if !dropped.is_empty() {
                out.push(Reassembled::Garbage {
                    raw: std::mem::take(&mut dropped),
                });
            }
            out.push(Reassembled::Frame {
                raw: rest[..total].to_vec(),
                body: body.to_vec(),
            });
            pos += total;
        }
        if !dropped.is_empty() {
            out.push(Reassembled::Garbage { raw: dropped });
        }
        self.buffer.drain(..pos);
        out
    }
}
