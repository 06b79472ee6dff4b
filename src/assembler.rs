//! Frame reassembly
//!
//! Chunks arrive unordered across transfers and some never arrive at all. The assembler keeps
//! just enough state to place every chunk of the current frame into the buffer at the queue
//! head and to decide when that buffer is finished.

use crate::buffer::{Flags, FrameBuffer, Metadata, State};
use crate::chunk::{Chunk, Chunks, HALF_WORDS, WORD_SIZE};
use crate::norm::Geometry;
use crate::queue::BufferQueue;
use crate::{FieldOrder, Parity, Timestamp};

/// Why a chunk was not stored
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Discard {
    /// Chunk index beyond the active norm
    OutOfRange,
    /// Chunk belongs to a frame that was superseded (or never started)
    Stale,
    /// No consumer buffer queued
    NoBuffer,
    /// Head buffer smaller than the placement requires
    OutOfBounds,
}

/// Result of feeding one chunk
#[derive(Debug)]
pub enum Step {
    Dropped(Discard),
    Stored,
    /// The chunk closed the frame, the buffer left the queue
    Finished(FrameBuffer),
}

/// Word offsets of the two payload halves of a chunk in the deinterlaced frame
///
/// Three half chunks make up one line of a field. Lines of the even field go to odd rows of the
/// frame and vice versa, so the fields end up interleaved.
///
/// # Example
///
/// ```
/// use usbtv::assembler::placement;
/// use usbtv::Parity;
///
/// // first chunk of the odd field covers the first two thirds of the top row
/// assert_eq!(placement(0, Parity::Odd), [0, 120]);
/// // first chunk of the even field covers the same columns one row below
/// assert_eq!(placement(0, Parity::Even), [360, 480]);
/// ```
pub fn placement(chunk_no: u16, parity: Parity) -> [usize; 2] {
    let mut offsets = [0; 2];
    for (half, offset) in offsets.iter_mut().enumerate() {
        let part_no = chunk_no as usize * 2 + half;
        let line = part_no / 3;
        let row_index = (line * 2 + parity.is_even() as usize) * 3 + part_no % 3;
        *offset = row_index * HALF_WORDS;
    }
    offsets
}

/// Frame reassembly state machine
#[derive(Debug)]
pub struct Assembler {
    geometry: Geometry,
    frame_id: Option<u8>,
    chunks_done: u32,
    sequence: u32,
}

impl Assembler {
    pub fn new(geometry: Geometry) -> Self {
        Assembler {
            geometry,
            frame_id: None,
            chunks_done: 0,
            sequence: 0,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Switches the geometry, dropping the current frame context
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.frame_id = None;
        self.chunks_done = 0;
    }

    /// Forgets the current frame and restarts sequence numbering at zero
    pub fn reset(&mut self) {
        self.frame_id = None;
        self.chunks_done = 0;
        self.sequence = 0;
    }

    /// Frame id of the frame being assembled
    pub fn frame_id(&self) -> Option<u8> {
        self.frame_id
    }

    /// Chunks stored since the current frame started
    pub fn chunks_done(&self) -> u32 {
        self.chunks_done
    }

    /// Sequence number the next finished buffer receives
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Stores one chunk, finishing the head buffer when the chunk closes the frame
    pub fn push(&mut self, chunk: &Chunk<'_>, queue: &BufferQueue) -> Step {
        let chunk_no = chunk.chunk_no() as u32;
        if chunk_no >= self.geometry.n_chunks {
            return Step::Dropped(Discard::OutOfRange);
        }

        // The even field is sent first and opens the frame. The odd field only opens one when its
        // even half was lost entirely, otherwise it continues the count.
        if chunk_no == 0
            && (chunk.parity().is_even() || self.frame_id != Some(chunk.frame_id()))
        {
            self.frame_id = Some(chunk.frame_id());
            self.chunks_done = 0;
        }

        if self.frame_id != Some(chunk.frame_id()) {
            return Step::Dropped(Discard::Stale);
        }

        let mut head = queue.lock();
        let buf = match head.peek_head() {
            Some(buf) => buf,
            None => return Step::Dropped(Discard::NoBuffer),
        };

        let stored = store(buf, chunk);
        if stored {
            self.chunks_done += 1;
        }

        // the last odd chunk closes the frame even when it did not fit, so an undersized head
        // cannot hold up the queue
        if chunk.parity().is_odd() && chunk_no == self.geometry.n_chunks - 1 {
            let state = if self.chunks_done == self.geometry.frame_chunks() {
                State::Done
            } else {
                State::Error
            };
            let meta = Metadata {
                bytesused: self.geometry.frame_size() as u32,
                flags: Flags::TIMESTAMP_MONOTONIC,
                field: FieldOrder::Interlaced,
                timestamp: Timestamp::now(),
                sequence: self.sequence,
            };
            self.sequence = self.sequence.wrapping_add(1);

            if let Some(mut buf) = head.remove_head() {
                buf.finish(state, meta);
                return Step::Finished(buf);
            }
        }

        if stored {
            Step::Stored
        } else {
            Step::Dropped(Discard::OutOfBounds)
        }
    }

    /// Feeds every valid chunk of a received byte range
    ///
    /// `finished` is called for each buffer closed by the range, after the queue lock was
    /// released.
    pub fn feed<F>(&mut self, bytes: &[u8], queue: &BufferQueue, mut finished: F)
    where
        F: FnMut(FrameBuffer),
    {
        for chunk in Chunks::new(bytes) {
            match self.push(&chunk, queue) {
                Step::Finished(buf) => {
                    tracing::debug!(
                        sequence = buf.meta().sequence,
                        state = %buf.state(),
                        chunks = self.chunks_done,
                        "frame finished"
                    );
                    finished(buf)
                }
                Step::Stored => {}
                Step::Dropped(reason) => {
                    tracing::trace!(?reason, chunk = ?chunk, "chunk dropped");
                }
            }
        }
    }
}

/// Copies both payload halves to their place, `false` if the buffer is too small
fn store(buf: &mut FrameBuffer, chunk: &Chunk<'_>) -> bool {
    const HALF_SIZE: usize = HALF_WORDS * WORD_SIZE;

    let offsets = placement(chunk.chunk_no(), chunk.parity());
    let end = offsets[1] * WORD_SIZE + HALF_SIZE;
    if end > buf.len() {
        return false;
    }

    let src = chunk.payload();
    for (half, offset) in offsets.iter().enumerate() {
        let dst = match buf.window_mut(offset * WORD_SIZE, HALF_SIZE) {
            Some(dst) => dst,
            None => return false,
        };
        dst.copy_from_slice(&src[half * HALF_SIZE..(half + 1) * HALF_SIZE]);
    }
    true
}
