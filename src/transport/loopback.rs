//! In-process transport
//!
//! Completes submitted transfers from a pool of worker threads with data produced by a
//! [`Source`]. Useful to exercise the pipeline without hardware: the workers play the role of the
//! host controller, [`TestPattern`] the role of the grabber.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use std::io;

use crate::chunk::{write_chunk, Header, CHUNK_SIZE, PAYLOAD_WORDS, WORD_SIZE};
use crate::norm::Geometry;
use crate::transport::{Completion, Status, SubmitError, Transfer, Transport};
use crate::Parity;

/// Producer of packet payloads
pub trait Source: Send {
    /// Fills one packet and returns the number of bytes the device sent
    fn fill(&mut self, packet: &mut [u8]) -> usize;
}

impl<F> Source for F
where
    F: FnMut(&mut [u8]) -> usize + Send,
{
    fn fill(&mut self, packet: &mut [u8]) -> usize {
        self(packet)
    }
}

/// Endless stream of well formed frames
///
/// Every frame is sent as the even field followed by the odd field, chunks in ascending order.
/// Each payload byte carries the frame id, so consecutive frames are easy to tell apart.
#[derive(Debug, Clone)]
pub struct TestPattern {
    geometry: Geometry,
    frame_id: u8,
    parity: Parity,
    chunk_no: u16,
    frames: u64,
    skip_every: Option<u64>,
}

impl TestPattern {
    pub fn new(geometry: Geometry) -> Self {
        TestPattern {
            geometry,
            frame_id: 0,
            parity: Parity::Even,
            chunk_no: 0,
            frames: 0,
            skip_every: None,
        }
    }

    /// Builder: leave out one chunk of the odd field of every `n`th frame
    pub fn skip_every(mut self, n: u64) -> Self {
        self.skip_every = if n == 0 { None } else { Some(n) };
        self
    }

    /// Frames fully emitted so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn skipping(&self) -> bool {
        match self.skip_every {
            Some(n) => {
                self.frames % n == n - 1 && self.parity.is_odd() && self.chunk_no == 1
            }
            None => false,
        }
    }

    fn advance(&mut self) {
        self.chunk_no += 1;
        if self.chunk_no as u32 == self.geometry.n_chunks {
            self.chunk_no = 0;
            match self.parity {
                Parity::Even => self.parity = Parity::Odd,
                Parity::Odd => {
                    self.parity = Parity::Even;
                    self.frame_id = self.frame_id.wrapping_add(1);
                    self.frames += 1;
                }
            }
        }
    }

    fn next_chunk(&mut self, out: &mut [u8]) {
        while self.skipping() {
            self.advance();
        }

        let header = Header {
            frame_id: self.frame_id,
            parity: self.parity,
            chunk_no: self.chunk_no,
        };
        write_chunk(out, header, &[self.frame_id; PAYLOAD_WORDS * WORD_SIZE]);
        self.advance();
    }
}

impl Source for TestPattern {
    fn fill(&mut self, packet: &mut [u8]) -> usize {
        if self.geometry.n_chunks == 0 {
            return 0;
        }

        let mut len = 0;
        for stride in packet.chunks_exact_mut(CHUNK_SIZE) {
            self.next_chunk(stride);
            len += CHUNK_SIZE;
        }
        len
    }
}

struct Pending {
    transfer: Transfer,
    completion: Arc<dyn Completion>,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Pending>,
    streaming: bool,
    unplugged: bool,
    shutdown: bool,
    registers: Vec<(u16, u16)>,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
    source: Mutex<Box<dyn Source>>,
    interval: Option<Duration>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn work(&self) {
        loop {
            let (mut pending, unplugged) = {
                let mut state = self.state();
                loop {
                    if state.shutdown {
                        return;
                    }
                    if let Some(pending) = state.pending.pop_front() {
                        break (pending, state.unplugged);
                    }
                    state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            };

            if let Some(interval) = self.interval {
                thread::sleep(interval);
            }

            let status = if unplugged {
                Status::DeviceGone
            } else {
                let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
                for i in 0..pending.transfer.packets().len() {
                    pending.transfer.fill_with(i, |packet| source.fill(packet));
                }
                Status::Ok
            };

            pending.completion.complete(pending.transfer, status);
        }
    }
}

/// Transport completing transfers from worker threads
pub struct Loopback {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Loopback {
    /// Returns a transport with a single worker, completions are strictly ordered
    pub fn new<S: Source + 'static>(source: S) -> Self {
        Self::with_workers(source, 1, None)
    }

    /// Returns a transport with `workers` threads, sleeping `interval` before each completion
    ///
    /// With more than one worker completions may reach the pipeline out of order, much like
    /// requests finishing on different cores.
    pub fn with_workers<S: Source + 'static>(
        source: S,
        workers: usize,
        interval: Option<Duration>,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
            source: Mutex::new(Box::new(source)),
            interval,
        });

        let workers = (0..workers.max(1))
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || shared.work())
            })
            .collect();

        Loopback { shared, workers }
    }

    /// Simulates unplugging the device
    ///
    /// Every transfer completing from now on reports [`Status::DeviceGone`] and submissions are
    /// refused.
    pub fn unplug(&self) {
        self.shared.state().unplugged = true;
        self.shared.wake.notify_all();
    }

    /// Register writes received so far
    pub fn registers(&self) -> Vec<(u16, u16)> {
        self.shared.state().registers.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.state().streaming
    }

    /// Transfers waiting for a worker
    pub fn pending(&self) -> usize {
        self.shared.state().pending.len()
    }
}

impl Transport for Loopback {
    fn write_register(&self, reg: u16, value: u16) -> io::Result<()> {
        let mut state = self.shared.state();
        if state.unplugged {
            return Err(io::ErrorKind::NotConnected.into());
        }
        state.registers.push((reg, value));
        Ok(())
    }

    fn set_streaming(&self, enable: bool) -> io::Result<()> {
        let mut state = self.shared.state();
        if state.unplugged {
            return Err(io::ErrorKind::NotConnected.into());
        }
        state.streaming = enable;
        Ok(())
    }

    fn submit(
        &self,
        transfer: Transfer,
        completion: Arc<dyn Completion>,
    ) -> Result<(), SubmitError> {
        let mut state = self.shared.state();
        if state.unplugged {
            return Err(SubmitError {
                transfer,
                error: io::ErrorKind::NotConnected.into(),
            });
        }

        state.pending.push_back(Pending {
            transfer,
            completion,
        });
        drop(state);
        self.shared.wake.notify_one();
        Ok(())
    }

    fn cancel(&self, index: usize) {
        let cancelled = {
            let mut state = self.shared.state();
            match state
                .pending
                .iter()
                .position(|p| p.transfer.index() == index)
            {
                Some(pos) => state.pending.remove(pos),
                None => None,
            }
        };

        if let Some(pending) = cancelled {
            pending
                .completion
                .complete(pending.transfer, Status::Cancelled);
        }
    }
}

impl Drop for Loopback {
    fn drop(&mut self) {
        let orphans = {
            let mut state = self.shared.state();
            state.shutdown = true;
            std::mem::take(&mut state.pending)
        };
        self.shared.wake.notify_all();

        for pending in orphans {
            pending
                .completion
                .complete(pending.transfer, Status::Cancelled);
        }

        let me = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() != me {
                let _ = worker.join();
            }
        }
    }
}
