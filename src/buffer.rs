use bitflags::bitflags;
use std::fmt;

use crate::{FieldOrder, Timestamp};

/// Lifecycle of a consumer buffer
///
/// Transitions only move forward: Free, Queued, Filling and finally Done or Error. The consumer
/// recycles a finished buffer by handing it back, which starts over at Queued.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Owned by the consumer, not known to the pipeline
    Free,
    /// Waiting in the buffer queue
    Queued,
    /// Head of the queue, receiving chunk data
    Filling,
    /// Every chunk of the frame arrived
    Done,
    /// Delivered with missing data, or flushed when streaming stopped
    Error,
}

impl State {
    /// Whether the buffer has left the pipeline for good
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Error)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Free => write!(f, "free"),
            State::Queued => write!(f, "queued"),
            State::Filling => write!(f, "filling"),
            State::Done => write!(f, "done"),
            State::Error => write!(f, "error"),
        }
    }
}

bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct Flags: u32 {
        /// Buffer is queued for processing
        const QUEUED                = 0x00000002;
        /// Buffer is ready
        const DONE                  = 0x00000004;
        /// Buffer is ready, but the data contained within is corrupted
        const ERROR                 = 0x00000040;
        /// Timestamp taken from the monotonic clock
        const TIMESTAMP_MONOTONIC   = 0x00002000;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Buffer metadata, mostly used not to convolute the main buffer structs
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Number of bytes occupied by the frame
    pub bytesused: u32,
    /// Buffer flags
    pub flags: Flags,
    /// Interlacing layout of the stored frame
    pub field: FieldOrder,
    /// Time of capture, end of the second field
    pub timestamp: Timestamp,
    /// Sequence number, counting the frames
    pub sequence: u32,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            bytesused: 0,
            flags: Flags::empty(),
            field: FieldOrder::Any,
            timestamp: Timestamp::default(),
            sequence: 0,
        }
    }
}

/// Output buffer receiving one deinterlaced frame
///
/// The backing memory belongs to the consumer. Ownership moves into the pipeline on enqueue and
/// back to the consumer once the buffer reaches a terminal state.
pub struct FrameBuffer {
    index: usize,
    data: Vec<u8>,
    state: State,
    meta: Metadata,
}

impl FrameBuffer {
    /// Returns a zeroed buffer of `len` bytes
    ///
    /// # Arguments
    ///
    /// * `index` - Consumer chosen identifier, reported back untouched
    /// * `len` - Size of the backing memory
    ///
    /// # Example
    ///
    /// ```
    /// use usbtv::{FrameBuffer, Norm};
    ///
    /// let buf = FrameBuffer::new(0, Norm::Ntsc.geometry().frame_size());
    /// ```
    pub fn new(index: usize, len: usize) -> Self {
        Self::from_vec(index, vec![0u8; len])
    }

    /// Wraps existing memory, which keeps its contents until chunks overwrite it
    pub fn from_vec(index: usize, data: Vec<u8>) -> Self {
        FrameBuffer {
            index,
            data,
            state: State::Free,
            meta: Metadata::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Slice of frame data, `bytesused` long once the buffer finished
    pub fn data(&self) -> &[u8] {
        match self.meta.bytesused as usize {
            0 => &self.data,
            used => &self.data[..used.min(self.data.len())],
        }
    }

    /// Size of the backing memory region
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gives the backing memory back
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Marks the buffer as waiting in the queue and clears the last frame's metadata
    pub(crate) fn mark_queued(&mut self) {
        self.state = State::Queued;
        self.meta = Metadata {
            flags: Flags::QUEUED,
            ..Metadata::default()
        };
    }

    /// Mutable view on `len` bytes at `offset`, `None` when the range exceeds the buffer
    ///
    /// The first write turns a queued buffer into the one being filled.
    pub(crate) fn window_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        let window = self.data.get_mut(offset..end)?;
        if self.state == State::Queued {
            self.state = State::Filling;
        }
        Some(window)
    }

    /// Moves the buffer into a terminal state
    pub(crate) fn finish(&mut self, state: State, meta: Metadata) {
        debug_assert!(state.is_terminal());
        let flag = match state {
            State::Done => Flags::DONE,
            _ => Flags::ERROR,
        };
        self.state = state;
        self.meta = Metadata {
            flags: meta.flags | flag,
            ..meta
        };
    }

    /// Error out a buffer the pipeline gives up on, keeping whatever was filled in
    pub(crate) fn abort(&mut self) {
        self.state = State::Error;
        self.meta.flags.remove(Flags::QUEUED);
        self.meta.flags.insert(Flags::ERROR);
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .field("state", &self.state)
            .field("meta", &self.meta)
            .finish()
    }
}
