//! Transfer scheduling
//!
//! Keeps a fixed pool of receive requests in flight. Every finished request is drained into the
//! pipeline and immediately resubmitted, so the device always has somewhere to put the next
//! packets. Stopping cancels the pool and waits for every request to come back.

use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::pipeline::Pipeline;
use crate::transport::{Completion, Status, Transfer, Transport};

/// Shape of the request pool
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pool {
    /// Requests in flight
    pub transfers: usize,
    /// Packets per request
    pub packets: usize,
    /// Maximum bytes per packet
    pub packet_size: usize,
}

#[derive(Default)]
struct Slots {
    /// Requests currently owned by the transport
    outstanding: usize,
    /// No resubmission once set
    stopping: bool,
    /// Requests that came back for good
    retired: Vec<Transfer>,
}

struct Inner<T: Transport> {
    transport: Arc<T>,
    pipeline: Arc<Pipeline>,
    slots: Mutex<Slots>,
    idle: Condvar,
}

impl<T: Transport> Inner<T> {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retire(&self, mut slots: MutexGuard<'_, Slots>, transfer: Transfer) {
        slots.outstanding = slots.outstanding.saturating_sub(1);
        slots.retired.push(transfer);
        if slots.outstanding == 0 {
            self.idle.notify_all();
        }
    }

    fn resubmit(self: Arc<Self>, mut transfer: Transfer) {
        // held across submit so stop() cannot slip between the check and the hand over
        let slots = self.slots();
        if slots.stopping {
            return self.retire(slots, transfer);
        }

        transfer.reset();
        let completion: Arc<dyn Completion> = self.clone();
        if let Err(e) = self.transport.submit(transfer, completion) {
            tracing::warn!(slot = e.transfer.index(), error = %e.error, "could not resubmit transfer");
            self.retire(slots, e.transfer);
        }
    }
}

impl<T: Transport> Completion for Inner<T> {
    fn complete(self: Arc<Self>, transfer: Transfer, status: Status) {
        match status {
            Status::Ok => self.pipeline.process(&transfer),
            Status::Error(kind) => {
                tracing::warn!(slot = transfer.index(), ?kind, "bad response for transfer");
            }
            Status::Cancelled => {
                let slots = self.slots();
                return self.retire(slots, transfer);
            }
            Status::DeviceGone => {
                self.pipeline.disconnect();
                let slots = self.slots();
                return self.retire(slots, transfer);
            }
        }

        self.resubmit(transfer);
    }
}

/// Pool of receive requests feeding the pipeline
pub struct Scheduler<T: Transport> {
    inner: Arc<Inner<T>>,
    pool: Pool,
}

impl<T: Transport> Scheduler<T> {
    pub(crate) fn new(transport: Arc<T>, pipeline: Arc<Pipeline>, pool: Pool) -> Self {
        Scheduler {
            inner: Arc::new(Inner {
                transport,
                pipeline,
                slots: Mutex::new(Slots::default()),
                idle: Condvar::new(),
            }),
            pool,
        }
    }

    pub fn pool(&self) -> Pool {
        self.pool
    }

    /// Number of requests currently owned by the transport
    pub fn outstanding(&self) -> usize {
        self.inner.slots().outstanding
    }

    /// Enables streaming and submits the whole pool
    ///
    /// On failure every request submitted so far is cancelled and waited for, and streaming is
    /// disabled again before the error is returned.
    pub fn start(&self) -> std::io::Result<()> {
        *self.inner.slots() = Slots::default();
        self.inner.transport.set_streaming(true)?;

        for index in 0..self.pool.transfers {
            let transfer = Transfer::new(index, self.pool.packets, self.pool.packet_size);
            let completion: Arc<dyn Completion> = self.inner.clone();

            let mut slots = self.inner.slots();
            match self.inner.transport.submit(transfer, completion) {
                Ok(()) => slots.outstanding += 1,
                Err(e) => {
                    drop(slots);
                    tracing::error!(slot = index, error = %e.error, "cannot submit transfer");
                    self.cancel_and_join();
                    if let Err(e) = self.inner.transport.set_streaming(false) {
                        tracing::warn!(error = %e, "cannot leave streaming mode");
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Cancels the pool, waits for it and flushes the buffer queue
    ///
    /// Returns once no completion is executing anymore. Every buffer still queued is delivered
    /// as errored.
    pub fn stop(&self) {
        let released = self.cancel_and_join();

        // the device may be gone already, nothing left to do about it
        if let Err(e) = self.inner.transport.set_streaming(false) {
            tracing::warn!(error = %e, "cannot leave streaming mode");
        }

        let flushed = self.inner.pipeline.flush();
        tracing::debug!(released, flushed, "transfers released, queue flushed");
    }

    fn cancel_and_join(&self) -> usize {
        self.inner.slots().stopping = true;

        // cancel may complete synchronously, so no lock is held here
        for index in 0..self.pool.transfers {
            self.inner.transport.cancel(index);
        }

        let mut slots = self.inner.slots();
        while slots.outstanding > 0 {
            slots = self
                .inner
                .idle
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }

        mem::take(&mut slots.retired).len()
    }
}
