use std::io;

use thiserror::Error;

/// Errors surfaced on the control path
///
/// Data path problems (corrupt or stale chunks, missing buffers, short frames) are never
/// reported through this type. They are absorbed by the pipeline and at most show up as an
/// errored buffer.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or register access failed
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),

    /// Streaming is active and the requested operation needs an idle session
    #[error("session is streaming")]
    Busy,

    /// The session is idle and the requested operation needs an active stream
    #[error("session is not streaming")]
    NotStreaming,

    /// The device went away, only `stop()` is meaningful afterwards
    #[error("device disconnected")]
    Disconnected,

    /// A consumer buffer cannot hold one frame at the active norm
    #[error("buffer holds {len} bytes, frame needs {required}")]
    BufferTooSmall { len: usize, required: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
