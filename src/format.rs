use std::fmt;

use crate::norm::{Geometry, Norm};
use crate::{FieldOrder, FourCC, Fraction};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Capture format produced by the pipeline
pub struct Format {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
    /// pixelformat code
    pub fourcc: FourCC,
    /// field order for interlacing
    pub field_order: FieldOrder,

    /// bytes per line
    pub stride: u32,
    /// number of bytes required to store an image
    pub size: u32,

    /// nominal frame interval of the active norm
    pub interval: Fraction,
}

impl Format {
    /// Returns the format delivered while capturing `norm`
    ///
    /// # Example
    ///
    /// ```
    /// use usbtv::{Format, Norm};
    ///
    /// let fmt = Format::for_norm(Norm::Pal);
    /// assert_eq!(fmt.height, 576);
    /// ```
    pub fn for_norm(norm: Norm) -> Self {
        let geom: Geometry = norm.geometry();
        Format {
            width: geom.width,
            height: geom.height,
            fourcc: FourCC::YUYV,
            field_order: FieldOrder::Interlaced,
            stride: geom.stride(),
            size: geom.frame_size() as u32,
            interval: norm.frame_interval(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "width          : {}", self.width)?;
        writeln!(f, "height         : {}", self.height)?;
        writeln!(f, "fourcc         : {}", self.fourcc)?;
        writeln!(f, "field          : {}", self.field_order)?;
        writeln!(f, "stride         : {}", self.stride)?;
        writeln!(f, "size           : {}", self.size)?;
        writeln!(f, "interval       : {}", self.interval)?;
        Ok(())
    }
}
