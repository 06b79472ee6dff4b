use std::{fmt, str};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
/// Four character code representing a pixelformat
pub struct FourCC {
    pub repr: [u8; 4],
}

impl FourCC {
    /// Packed 4:2:2, the only layout the grabber produces
    pub const YUYV: FourCC = FourCC { repr: *b"YUYV" };

    #[allow(clippy::trivially_copy_pass_by_ref)]
    /// Returns a pixelformat as four character code
    ///
    /// # Arguments
    ///
    /// * `repr` - Four characters as raw bytes
    ///
    /// # Example
    ///
    /// ```
    /// use usbtv::FourCC;
    /// let fourcc = FourCC::new(b"YUYV");
    /// assert_eq!(fourcc, FourCC::YUYV);
    /// ```
    pub fn new(repr: &[u8; 4]) -> FourCC {
        FourCC { repr: *repr }
    }

    /// Returns the string representation of a four character code
    pub fn str(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.repr)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(string) = self.str() {
            write!(f, "{}", string)?;
        }
        Ok(())
    }
}
