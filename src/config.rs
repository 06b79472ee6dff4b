use crate::chunk::CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::scheduler::Pool;
use crate::Norm;

/// Capture session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Receive requests kept in flight
    pub transfers: usize,
    /// Packets batched per request
    pub packets: usize,
    /// Maximum packet size of the streaming endpoint in bytes
    pub max_packet_size: usize,
    /// Television standard captured after start
    pub norm: Norm,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfers: 16,
            packets: 8,
            max_packet_size: 3 * CHUNK_SIZE,
            norm: Norm::Ntsc,
        }
    }
}

impl Config {
    /// Builder: set the number of requests in flight
    pub fn transfers(mut self, transfers: usize) -> Self {
        self.transfers = transfers;
        self
    }

    /// Builder: set the number of packets per request
    pub fn packets(mut self, packets: usize) -> Self {
        self.packets = packets;
        self
    }

    /// Builder: set the maximum packet size
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Builder: set the television standard
    pub fn norm(mut self, norm: Norm) -> Self {
        self.norm = norm;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfers == 0 {
            return Err(Error::InvalidConfig("at least one transfer is required"));
        }
        if self.packets == 0 {
            return Err(Error::InvalidConfig("transfers need at least one packet"));
        }
        if self.max_packet_size < CHUNK_SIZE {
            return Err(Error::InvalidConfig("packets must hold at least one chunk"));
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> Pool {
        Pool {
            transfers: self.transfers,
            packets: self.packets,
            packet_size: self.max_packet_size,
        }
    }
}
