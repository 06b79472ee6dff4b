#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use usbtv::chunk::{write_chunk, Header, CHUNK_SIZE};
use usbtv::norm::Geometry;
use usbtv::transport::{Completion, Status, SubmitError, Transfer, Transport};
use usbtv::Parity;

struct Pending {
    transfer: Transfer,
    completion: Arc<dyn Completion>,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Pending>,
    streaming: bool,
    submitted: usize,
    refuse_after: Option<usize>,
    registers: Vec<(u16, u16)>,
}

/// Transport whose transfers only complete when the test says so
#[derive(Default)]
pub struct Manual {
    state: Mutex<State>,
}

impl Manual {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuses every submission after the first `n`
    pub fn refuse_after(&self, n: usize) {
        self.state.lock().unwrap().refuse_after = Some(n);
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn submitted(&self) -> usize {
        self.state.lock().unwrap().submitted
    }

    pub fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    pub fn registers(&self) -> Vec<(u16, u16)> {
        self.state.lock().unwrap().registers.clone()
    }

    /// Completes the oldest pending transfer, packet `i` carrying `packets[i]`
    ///
    /// Returns the slot index that completed.
    pub fn complete(&self, packets: &[Vec<u8>], status: Status) -> usize {
        let mut pending = self
            .state
            .lock()
            .unwrap()
            .pending
            .pop_front()
            .expect("no transfer pending");

        for (i, bytes) in packets.iter().enumerate() {
            pending.transfer.fill(i, bytes);
        }

        let index = pending.transfer.index();
        pending.completion.complete(pending.transfer, status);
        index
    }

    /// Delivers `chunks` one per packet, using as many transfers as needed
    pub fn stream(&self, chunks: &[Vec<u8>], packets_per_transfer: usize) {
        for batch in chunks.chunks(packets_per_transfer) {
            self.complete(batch, Status::Ok);
        }
    }
}

impl Transport for Manual {
    fn write_register(&self, reg: u16, value: u16) -> io::Result<()> {
        self.state.lock().unwrap().registers.push((reg, value));
        Ok(())
    }

    fn set_streaming(&self, enable: bool) -> io::Result<()> {
        self.state.lock().unwrap().streaming = enable;
        Ok(())
    }

    fn submit(
        &self,
        transfer: Transfer,
        completion: Arc<dyn Completion>,
    ) -> Result<(), SubmitError> {
        let mut state = self.state.lock().unwrap();
        if let Some(limit) = state.refuse_after {
            if state.submitted >= limit {
                return Err(SubmitError {
                    transfer,
                    error: io::ErrorKind::Other.into(),
                });
            }
        }

        state.submitted += 1;
        state.pending.push_back(Pending {
            transfer,
            completion,
        });
        Ok(())
    }

    fn cancel(&self, index: usize) {
        let cancelled = {
            let mut state = self.state.lock().unwrap();
            let pos = state
                .pending
                .iter()
                .position(|p| p.transfer.index() == index);
            pos.and_then(|pos| state.pending.remove(pos))
        };

        if let Some(pending) = cancelled {
            pending
                .completion
                .complete(pending.transfer, Status::Cancelled);
        }
    }
}

/// One chunk stride filled with `fill`
pub fn chunk(frame_id: u8, chunk_no: u16, parity: Parity, fill: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; CHUNK_SIZE];
    let header = Header {
        frame_id,
        parity,
        chunk_no,
    };
    write_chunk(&mut bytes, header, &[fill; 960]);
    bytes
}

/// Every chunk of one frame, even field first
pub fn frame(frame_id: u8, geometry: Geometry) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    for parity in [Parity::Even, Parity::Odd] {
        for no in 0..geometry.n_chunks as u16 {
            chunks.push(chunk(frame_id, no, parity, frame_id));
        }
    }
    chunks
}
