use std::collections::VecDeque;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::buffer::{FrameBuffer, State};
use crate::error::{Error, Result};

struct Inner {
    bufs: VecDeque<FrameBuffer>,
    frame_size: usize,
}

/// FIFO of buffers waiting to be filled
///
/// Shared between the completion path, which fills and removes the head, and the control path,
/// which enqueues consumer buffers and flushes the queue on stop. Every operation holds the lock
/// for a bounded amount of work and never blocks on anything but the lock itself.
pub struct BufferQueue {
    inner: Mutex<Inner>,
}

impl BufferQueue {
    /// Returns an empty queue accepting buffers of at least `frame_size` bytes
    pub fn new(frame_size: usize) -> Self {
        BufferQueue {
            inner: Mutex::new(Inner {
                bufs: VecDeque::new(),
                frame_size,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // every critical section leaves the queue consistent, so a panic elsewhere does not
        // invalidate it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a buffer at the tail
    ///
    /// Buffers too small for one frame at the active norm are rejected.
    pub fn enqueue(&self, mut buf: FrameBuffer) -> Result<()> {
        let mut inner = self.inner();
        if buf.len() < inner.frame_size {
            return Err(Error::BufferTooSmall {
                len: buf.len(),
                required: inner.frame_size,
            });
        }

        buf.mark_queued();
        inner.bufs.push_back(buf);
        Ok(())
    }

    /// Locks the queue for head access
    pub fn lock(&self) -> QueueGuard<'_> {
        QueueGuard(self.inner())
    }

    /// Removes the buffer at the head, if any
    pub fn remove_head(&self) -> Option<FrameBuffer> {
        self.lock().remove_head()
    }

    /// Empties the queue, forcing every buffer into the terminal `state`
    ///
    /// Returns the buffers in queue order so they can be delivered to the consumer outside the
    /// lock.
    pub fn drain_all(&self, state: State) -> Vec<FrameBuffer> {
        debug_assert!(state.is_terminal());
        let bufs = mem::take(&mut self.inner().bufs);

        bufs.into_iter()
            .map(|mut buf| {
                match state {
                    State::Done => buf.finish(State::Done, *buf.meta()),
                    _ => buf.abort(),
                }
                buf
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner().bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().bufs.is_empty()
    }

    /// Minimum buffer size accepted by `enqueue`
    pub fn frame_size(&self) -> usize {
        self.inner().frame_size
    }

    /// Changes the accepted size
    ///
    /// Queued buffers too small for the new size are removed and returned as errored, the others
    /// keep their order.
    pub(crate) fn set_frame_size(&self, frame_size: usize) -> Vec<FrameBuffer> {
        let mut inner = self.inner();
        inner.frame_size = frame_size;

        let (keep, undersized): (VecDeque<_>, VecDeque<_>) = mem::take(&mut inner.bufs)
            .into_iter()
            .partition(|buf| buf.len() >= frame_size);
        inner.bufs = keep;

        undersized
            .into_iter()
            .map(|mut buf| {
                buf.abort();
                buf
            })
            .collect()
    }
}

/// Exclusive access to the queue head
pub struct QueueGuard<'a>(MutexGuard<'a, Inner>);

impl QueueGuard<'_> {
    /// The buffer currently being filled, without removing it
    pub fn peek_head(&mut self) -> Option<&mut FrameBuffer> {
        self.0.bufs.front_mut()
    }

    pub fn remove_head(&mut self) -> Option<FrameBuffer> {
        self.0.bufs.pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.bufs.is_empty()
    }
}
