use std::sync::{mpsc, Arc};

use crate::FrameBuffer;

/// Consumer side of the pipeline
///
/// Receives every buffer leaving the queue, finished or flushed. `deliver` runs in the
/// completion context and must return without blocking.
pub trait Sink: Send + Sync {
    fn deliver(&self, buf: FrameBuffer);
}

impl Sink for mpsc::Sender<FrameBuffer> {
    fn deliver(&self, buf: FrameBuffer) {
        if let Err(mpsc::SendError(buf)) = self.send(buf) {
            tracing::trace!(index = buf.index(), "consumer gone, dropping buffer");
        }
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn deliver(&self, buf: FrameBuffer) {
        (**self).deliver(buf)
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn deliver(&self, buf: FrameBuffer) {
        (**self).deliver(buf)
    }
}
