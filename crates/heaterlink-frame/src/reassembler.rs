use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{try_decode, Frame};
use crate::header::FRAME_LEN;

/// Extracts frames from an unaligned inbound byte stream.
///
/// The scanner slides an eight-byte window over buffered input and emits the
/// leftmost window that decodes as a frame. Bytes in front of a match are
/// dropped; there is no retransmission, so resync is best effort. Every start
/// offset is examined once: after a call returns, fewer than [`FRAME_LEN`]
/// bytes remain buffered, waiting for the rest of a possible frame.
#[derive(Debug, Default)]
pub struct Reassembler {
    buf: BytesMut,
    discarded: u64,
    emitted: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4 * FRAME_LEN),
            discarded: 0,
            emitted: 0,
        }
    }

    /// Feed one inbound chunk; returns the frames it completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut offset = 0usize;

        while self.buf.len() - offset >= FRAME_LEN {
            match try_decode(&self.buf[offset..offset + FRAME_LEN]) {
                Some(frame) => {
                    self.skip(offset);
                    self.buf.advance(FRAME_LEN);
                    offset = 0;
                    trace!(header = frame.header().name(), "frame extracted");
                    frames.push(frame);
                }
                None => offset += 1,
            }
        }

        // Offsets before `offset` cannot start a frame.
        self.skip(offset);
        self.emitted += frames.len() as u64;
        frames
    }

    fn skip(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        debug!(count, "discarding unframed bytes");
        self.buf.advance(count);
        self.discarded += count as u64;
    }

    /// Bytes currently held back waiting for more input.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes dropped during resync.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Total frames emitted.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
