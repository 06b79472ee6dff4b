//! Chunk demultiplexing
//!
//! The grabber streams video as a sequence of fixed size chunks. Each chunk starts with a
//! big-endian header word followed by 240 words of YUYV payload, a word being four bytes (two
//! pixels). Packets carry any number of whole chunks; there is no retransmission, so a chunk
//! whose header is damaged is simply skipped.

use std::fmt;

use crate::Parity;

/// Size of one word in bytes
pub const WORD_SIZE: usize = 4;
/// Stride of a chunk in the packet stream, in words
pub const CHUNK_WORDS: usize = 256;
/// Stride of a chunk in the packet stream, in bytes
pub const CHUNK_SIZE: usize = CHUNK_WORDS * WORD_SIZE;
/// Payload words following the header
pub const PAYLOAD_WORDS: usize = 240;
/// Each chunk is placed as two halves of this many words
pub const HALF_WORDS: usize = PAYLOAD_WORDS / 2;

/// Top byte every valid header carries
pub const MAGIC: u8 = 0x88;

const MAGIC_MASK: u32 = 0xff00_0000;
const FRAME_ID_MASK: u32 = 0x00ff_0000;
const ODD_MASK: u32 = 0x0000_f000;
const CHUNK_NO_MASK: u32 = 0x0000_0fff;

/// Decoded chunk header
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub frame_id: u8,
    pub parity: Parity,
    pub chunk_no: u16,
}

impl Header {
    /// Decodes a raw header word, `None` on a magic mismatch
    ///
    /// # Example
    ///
    /// ```
    /// use usbtv::chunk::Header;
    /// use usbtv::Parity;
    ///
    /// let hdr = Header::decode(0x8805_8012).unwrap();
    /// assert_eq!(hdr.frame_id, 5);
    /// assert_eq!(hdr.parity, Parity::Odd);
    /// assert_eq!(hdr.chunk_no, 0x12);
    /// ```
    pub fn decode(word: u32) -> Option<Self> {
        if (word & MAGIC_MASK) >> 24 != MAGIC as u32 {
            return None;
        }

        // The parity field is four bits wide but only its top bit survives the shift. Hardware
        // that sets any of the lower three bits alone still reads as even.
        let parity = match (word & ODD_MASK) >> 15 {
            0 => Parity::Even,
            _ => Parity::Odd,
        };

        Some(Header {
            frame_id: ((word & FRAME_ID_MASK) >> 16) as u8,
            parity,
            chunk_no: (word & CHUNK_NO_MASK) as u16,
        })
    }

    /// Encodes the header as the device would send it
    pub fn encode(&self) -> u32 {
        let odd = match self.parity {
            Parity::Odd => 0x8000,
            Parity::Even => 0,
        };
        (MAGIC as u32) << 24
            | (self.frame_id as u32) << 16
            | odd
            | (self.chunk_no as u32 & CHUNK_NO_MASK)
    }
}

/// A validated chunk borrowing its payload from the transfer buffer
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub header: Header,
    payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Decodes one chunk stride
    ///
    /// Returns `None` when `bytes` is shorter than a chunk or the magic does not match.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < CHUNK_SIZE {
            return None;
        }

        let word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let header = Header::decode(word)?;
        let payload = &bytes[WORD_SIZE..WORD_SIZE + PAYLOAD_WORDS * WORD_SIZE];
        Some(Chunk { header, payload })
    }

    pub fn frame_id(&self) -> u8 {
        self.header.frame_id
    }

    pub fn parity(&self) -> Parity {
        self.header.parity
    }

    pub fn chunk_no(&self) -> u16 {
        self.header.chunk_no
    }

    /// The 240 payload words, in wire byte order
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("frame_id", &self.header.frame_id)
            .field("parity", &self.header.parity)
            .field("chunk_no", &self.header.chunk_no)
            .finish()
    }
}

/// Iterate through the valid chunks of a received byte range
///
/// The range is walked in whole chunk strides. A trailing partial stride is ignored, strides
/// with a bad magic are skipped without notice.
pub struct Chunks<'a> {
    strides: std::slice::ChunksExact<'a, u8>,
}

impl<'a> Chunks<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Chunks {
            strides: bytes.chunks_exact(CHUNK_SIZE),
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for stride in self.strides.by_ref() {
            match Chunk::parse(stride) {
                Some(chunk) => return Some(chunk),
                None => tracing::trace!("dropping chunk with bad magic"),
            }
        }
        None
    }
}

/// Writes a chunk stride into `out`, which must be at least `CHUNK_SIZE` long
///
/// Used by synthetic sources to produce a device compatible stream. `payload` is truncated or
/// zero padded to 240 words.
pub fn write_chunk(out: &mut [u8], header: Header, payload: &[u8]) {
    let out = &mut out[..CHUNK_SIZE];
    out[..WORD_SIZE].copy_from_slice(&header.encode().to_be_bytes());

    let body = &mut out[WORD_SIZE..WORD_SIZE + PAYLOAD_WORDS * WORD_SIZE];
    let n = payload.len().min(body.len());
    body[..n].copy_from_slice(&payload[..n]);
    body[n..].fill(0);

    out[WORD_SIZE + PAYLOAD_WORDS * WORD_SIZE..].fill(0);
}
