use bytes::{Bytes, BytesMut};

/// Default frame capacity in bytes
pub const DEFAULT_FRAME_CAPACITY: usize = 2048;

/// A contiguous slice of a session's byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position of this frame in the session (0-indexed, contiguous)
    pub sequence: u64,
    /// Stream offset of the first byte in `data`
    pub offset: u64,
    /// Frame bytes; exactly the assembler capacity unless this is the final flush
    pub data: Bytes,
}

impl Frame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Accumulates byte ranges and cuts them into fixed-size frames.
///
/// Bytes leave in the order they arrived. Every byte pushed in eventually
/// leaves as part of some frame: full frames from `push()`, the remainder
/// from `flush()`.
pub struct FrameAssembler {
    capacity: usize,
    buffer: BytesMut,
    next_sequence: u64,
    next_offset: u64,
}

impl FrameAssembler {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buffer: BytesMut::with_capacity(capacity * 2),
            next_sequence: 0,
            next_offset: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes waiting for a full frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Append a byte range and return every frame it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::with_capacity(self.buffer.len() / self.capacity);
        while self.buffer.len() >= self.capacity {
            let data = self.buffer.split_to(self.capacity).freeze();
            frames.push(self.emit(data));
        }

        frames
    }

    /// Emit the remainder as a short final frame, if there is one.
    pub fn flush(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }

        let data = self.buffer.split().freeze();
        Some(self.emit(data))
    }

    fn emit(&mut self, data: Bytes) -> Frame {
        let frame = Frame {
            sequence: self.next_sequence,
            offset: self.next_offset,
            data,
        };
        self.next_sequence += 1;
        self.next_offset += frame.data.len() as u64;
        frame
    }
}
