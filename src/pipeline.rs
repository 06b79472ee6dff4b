use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::assembler::Assembler;
use crate::buffer::State;
use crate::norm::Geometry;
use crate::queue::BufferQueue;
use crate::sink::Sink;
use crate::transport::Transfer;

/// Data path state shared by the completion context and the control path
///
/// Lock order is assembler before queue. Buffers are handed to the sink once both locks are
/// released.
pub(crate) struct Pipeline {
    pub(crate) queue: BufferQueue,
    assembler: Mutex<Assembler>,
    sink: Box<dyn Sink>,
    disconnected: AtomicBool,
}

impl Pipeline {
    pub(crate) fn new(geometry: Geometry, sink: Box<dyn Sink>) -> Self {
        Pipeline {
            queue: BufferQueue::new(geometry.frame_size()),
            assembler: Mutex::new(Assembler::new(geometry)),
            sink,
            disconnected: AtomicBool::new(false),
        }
    }

    pub(crate) fn assembler(&self) -> MutexGuard<'_, Assembler> {
        self.assembler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs every packet of a finished transfer through the assembler
    pub(crate) fn process(&self, transfer: &Transfer) {
        let mut finished = Vec::new();
        {
            let mut assembler = self.assembler();
            for bytes in transfer.received() {
                assembler.feed(bytes, &self.queue, |buf| finished.push(buf));
            }
        }

        for buf in finished {
            self.sink.deliver(buf);
        }
    }

    /// Hands every queued buffer back to the consumer as errored
    pub(crate) fn flush(&self) -> usize {
        let bufs = self.queue.drain_all(State::Error);
        let n = bufs.len();
        for buf in bufs {
            self.sink.deliver(buf);
        }
        n
    }

    /// Records the loss of the device and flushes the queue
    pub(crate) fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::AcqRel) {
            let flushed = self.flush();
            tracing::error!(flushed, "device disconnected, capture session terminated");
        }
    }

    pub(crate) fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Switches the geometry, delivering queued buffers too small for it as errored
    pub(crate) fn set_geometry(&self, geometry: Geometry) -> usize {
        self.assembler().set_geometry(geometry);
        let undersized = self.queue.set_frame_size(geometry.frame_size());

        let n = undersized.len();
        for buf in undersized {
            self.sink.deliver(buf);
        }
        n
    }
}
