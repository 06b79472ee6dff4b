use std::fmt;

use crate::chunk::HALF_WORDS;
use crate::Fraction;

/// Active picture width, identical for every norm
///
/// A line is assembled from three half chunks of 120 words, a word carrying two YUYV pixels.
pub const WIDTH: u32 = (3 * HALF_WORDS * 2) as u32;

/// Analog television standard
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Norm {
    /// 525 lines at 60 fields per second (NTSC-M, PAL-M, PAL-60)
    Ntsc,
    /// 625 lines at 50 fields per second (PAL-B/G/D/K/I, SECAM)
    Pal,
}

impl Norm {
    /// Returns the frame geometry of this standard
    pub const fn geometry(self) -> Geometry {
        match self {
            Norm::Ntsc => Geometry::new(480),
            Norm::Pal => Geometry::new(576),
        }
    }

    /// Nominal time between two frames
    pub fn frame_interval(self) -> Fraction {
        match self {
            Norm::Ntsc => Fraction::new(1001, 30000),
            Norm::Pal => Fraction::new(1, 25),
        }
    }
}

impl Default for Norm {
    fn default() -> Self {
        Norm::Ntsc
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Norm::Ntsc => write!(f, "NTSC"),
            Norm::Pal => write!(f, "PAL"),
        }
    }
}

/// Frame geometry derived from the number of active lines
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// width in pixels
    pub width: u32,
    /// height in lines, both fields
    pub height: u32,
    /// number of chunks carrying one field
    pub n_chunks: u32,
}

impl Geometry {
    /// Returns the geometry of a frame with `height` active lines
    ///
    /// `height` should be a multiple of four so that each field splits into whole chunks.
    ///
    /// # Example
    ///
    /// ```
    /// use usbtv::norm::Geometry;
    ///
    /// let geom = Geometry::new(480);
    /// assert_eq!(geom.n_chunks, 360);
    /// assert_eq!(geom.frame_size(), 720 * 480 * 2);
    /// ```
    pub const fn new(height: u32) -> Self {
        Geometry {
            width: WIDTH,
            height,
            n_chunks: WIDTH * height / 4 / (2 * HALF_WORDS as u32),
        }
    }

    /// Number of chunks making up both fields of a frame
    pub const fn frame_chunks(&self) -> u32 {
        self.n_chunks * 2
    }

    /// Bytes per line
    pub const fn stride(&self) -> u32 {
        self.width * 2
    }

    /// Bytes needed to store a full deinterlaced frame
    pub const fn frame_size(&self) -> usize {
        (self.stride() * self.height) as usize
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} ({} chunks per field)",
            self.width, self.height, self.n_chunks
        )
    }
}
