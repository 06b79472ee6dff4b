use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Represents how fields are interlaced (if they are)
pub enum FieldOrder {
    /// Field order not known yet, e.g. a buffer that was never filled
    Any,
    /// both fields interlaced
    Interlaced,
}

impl fmt::Display for FieldOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Interlaced => write!(f, "interlaced"),
        }
    }
}

/// Field a chunk belongs to
///
/// The odd field carries the top line of the interlaced picture. The even field is transmitted
/// first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

impl Parity {
    pub fn is_even(self) -> bool {
        self == Parity::Even
    }

    pub fn is_odd(self) -> bool {
        self == Parity::Odd
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Odd => write!(f, "odd"),
            Self::Even => write!(f, "even"),
        }
    }
}
