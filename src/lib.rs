//! Capture pipeline for USBTV007 class video grabbers
//!
//! The grabber streams interlaced video as fixed size chunks over an isochronous endpoint. This
//! crate keeps a pool of receive requests in flight, decodes the chunks and reassembles them into
//! deinterlaced YUYV frames, which are handed to the consumer through a buffer queue.
//!
//! The device itself is reached through the [`transport::Transport`] trait, the consumer through
//! [`Sink`]. A [`Session`] ties both together and owns all mutable state.

pub mod assembler;
pub mod buffer;
pub mod chunk;
pub mod config;
pub mod error;
pub mod norm;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod transport;

mod field;
pub use field::{FieldOrder, Parity};

mod format;
pub use format::Format;

mod fourcc;
pub use fourcc::FourCC;

mod fraction;
pub use fraction::Fraction;

mod pipeline;

mod timestamp;
pub use timestamp::Timestamp;

pub use buffer::FrameBuffer;
pub use config::Config;
pub use error::{Error, Result};
pub use norm::Norm;
pub use session::Session;
pub use sink::Sink;

pub mod prelude {
    pub use crate::buffer::{FrameBuffer, State};
    pub use crate::config::Config;
    pub use crate::norm::{Geometry, Norm};
    pub use crate::session::Session;
    pub use crate::sink::Sink;
    pub use crate::transport::loopback::{Loopback, TestPattern};
    pub use crate::transport::Transport;
}
