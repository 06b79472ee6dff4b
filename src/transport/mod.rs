//! Transport contract
//!
//! The pipeline talks to the device through a [`Transport`]: a control channel for opaque
//! register writes, a switch for the streaming mode, and an asynchronous receive queue. Receive
//! requests ([`Transfer`]s) are handed to the transport by value and come back through
//! [`Completion::complete`] once the hardware filled them, were cancelled, or failed.

use std::{fmt, io, sync::Arc};

pub mod loopback;

/// Outcome of a finished transfer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// Packets carry data, see [`Packet::actual_length`]
    Ok,
    /// The transfer was cancelled on request
    Cancelled,
    /// The device is gone, the transfer must not be resubmitted
    DeviceGone,
    /// Any other failure, the transfer may be resubmitted
    Error(io::ErrorKind),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "ok"),
            Status::Cancelled => write!(f, "cancelled"),
            Status::DeviceGone => write!(f, "device gone"),
            Status::Error(kind) => write!(f, "error ({:?})", kind),
        }
    }
}

/// Packet descriptor inside a transfer buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Start of the packet in the transfer buffer
    pub offset: usize,
    /// Space reserved for the packet
    pub length: usize,
    /// Bytes the device actually sent
    pub actual_length: usize,
}

/// Receive request batching a fixed number of packets
pub struct Transfer {
    index: usize,
    data: Vec<u8>,
    packets: Vec<Packet>,
}

impl Transfer {
    /// Returns a transfer with `packets` slots of `packet_size` bytes each
    ///
    /// # Arguments
    ///
    /// * `index` - Slot index, stable across resubmissions
    /// * `packets` - Number of packets batched in one request
    /// * `packet_size` - Maximum size of a single packet
    pub fn new(index: usize, packets: usize, packet_size: usize) -> Self {
        let packets = (0..packets)
            .map(|i| Packet {
                offset: i * packet_size,
                length: packet_size,
                actual_length: 0,
            })
            .collect::<Vec<_>>();

        Transfer {
            index,
            data: vec![0u8; packets.len() * packet_size],
            packets,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Size of the transfer buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Received byte range of every packet, in packet order
    pub fn received(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.packets.iter().filter_map(move |p| {
            let len = p.actual_length.min(p.length);
            self.data.get(p.offset..p.offset + len)
        })
    }

    /// Stores the bytes of packet `packet` as received from the device
    ///
    /// Bytes beyond the packet length are cut off, the stored amount is returned.
    pub fn fill(&mut self, packet: usize, bytes: &[u8]) -> usize {
        let desc = match self.packets.get_mut(packet) {
            Some(desc) => desc,
            None => return 0,
        };

        let n = bytes.len().min(desc.length);
        self.data[desc.offset..desc.offset + n].copy_from_slice(&bytes[..n]);
        desc.actual_length = n;
        n
    }

    /// Lets the device write packet `packet` in place, `write` returns the length it produced
    pub fn fill_with<F>(&mut self, packet: usize, write: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let desc = match self.packets.get_mut(packet) {
            Some(desc) => desc,
            None => return 0,
        };

        let n = write(&mut self.data[desc.offset..desc.offset + desc.length]).min(desc.length);
        desc.actual_length = n;
        n
    }

    /// Forgets the lengths of the previous round before resubmission
    pub fn reset(&mut self) {
        for desc in &mut self.packets {
            desc.actual_length = 0;
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .field("packets", &self.packets.len())
            .finish()
    }
}

/// A transfer the transport refused to queue
#[derive(Debug)]
pub struct SubmitError {
    pub transfer: Transfer,
    pub error: io::Error,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submitting transfer {}: {}", self.transfer.index, self.error)
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<SubmitError> for io::Error {
    fn from(err: SubmitError) -> Self {
        err.error
    }
}

/// Receiver of finished transfers
///
/// Called from the transport's completion context. Implementations must not block.
pub trait Completion: Send + Sync {
    fn complete(self: Arc<Self>, transfer: Transfer, status: Status);
}

/// Device side of the pipeline
///
/// Contract for implementors:
///
/// * `submit` and `cancel` must not block on the device.
/// * `submit` must never invoke the completion itself; `cancel` may, on the calling thread.
/// * Every accepted transfer is completed exactly once.
pub trait Transport: Send + Sync + 'static {
    /// Writes an opaque value to a device register
    fn write_register(&self, reg: u16, value: u16) -> io::Result<()>;

    /// Enables or disables the streaming mode of the receive endpoint
    fn set_streaming(&self, enable: bool) -> io::Result<()>;

    /// Queues a transfer for reception
    fn submit(
        &self,
        transfer: Transfer,
        completion: Arc<dyn Completion>,
    ) -> Result<(), SubmitError>;

    /// Cancels the transfer in slot `index` if it is still queued
    ///
    /// A cancelled transfer completes with [`Status::Cancelled`]. A transfer that is already
    /// completing is not affected.
    fn cancel(&self, index: usize);
}

impl<T: Transport> Transport for Arc<T> {
    fn write_register(&self, reg: u16, value: u16) -> io::Result<()> {
        (**self).write_register(reg, value)
    }

    fn set_streaming(&self, enable: bool) -> io::Result<()> {
        (**self).set_streaming(enable)
    }

    fn submit(
        &self,
        transfer: Transfer,
        completion: Arc<dyn Completion>,
    ) -> Result<(), SubmitError> {
        (**self).submit(transfer, completion)
    }

    fn cancel(&self, index: usize) {
        (**self).cancel(index)
    }
}
