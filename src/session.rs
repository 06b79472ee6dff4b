use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::norm::{Geometry, Norm};
use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use crate::sink::Sink;
use crate::transport::Transport;
use crate::{Format, FrameBuffer};

struct Control {
    norm: Norm,
    streaming: bool,
}

/// Capture session owning all state of one device
///
/// Control operations (start, stop, norm changes, register writes) are serialized by a session
/// wide lock. Buffers may be enqueued at any time, including while frames are being assembled.
///
/// # Example
///
/// ```
/// use std::sync::mpsc;
/// use usbtv::transport::loopback::{Loopback, TestPattern};
/// use usbtv::{FrameBuffer, Norm, Session};
///
/// let geometry = Norm::Ntsc.geometry();
/// let transport = Loopback::new(TestPattern::new(geometry));
/// let (tx, rx) = mpsc::channel();
/// let session = Session::new(transport, tx).unwrap();
///
/// for i in 0..4 {
///     session.enqueue(FrameBuffer::new(i, geometry.frame_size())).unwrap();
/// }
/// session.start().unwrap();
/// let buf = rx.recv().unwrap();
/// session.stop().unwrap();
/// session.enqueue(buf).unwrap();
/// ```
pub struct Session<T: Transport> {
    control: Mutex<Control>,
    transport: Arc<T>,
    pipeline: Arc<Pipeline>,
    scheduler: Scheduler<T>,
}

impl<T: Transport> Session<T> {
    /// Returns a session with the default configuration
    ///
    /// # Arguments
    ///
    /// * `transport` - Device transport
    /// * `sink` - Receives every buffer leaving the queue
    pub fn new<S: Sink + 'static>(transport: T, sink: S) -> Result<Self> {
        Self::with_config(transport, sink, Config::default())
    }

    pub fn with_config<S: Sink + 'static>(transport: T, sink: S, config: Config) -> Result<Self> {
        config.validate()?;

        let transport = Arc::new(transport);
        let pipeline = Arc::new(Pipeline::new(config.norm.geometry(), Box::new(sink)));
        let scheduler = Scheduler::new(transport.clone(), pipeline.clone(), config.pool());

        Ok(Session {
            control: Mutex::new(Control {
                norm: config.norm,
                streaming: false,
            }),
            transport,
            pipeline,
            scheduler,
        })
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &Scheduler<T> {
        &self.scheduler
    }

    /// Starts streaming
    ///
    /// Sequence numbering restarts at zero. Buffers queued beforehand are kept and filled first.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control();
        if control.streaming {
            return Err(Error::Busy);
        }
        if self.pipeline.is_disconnected() {
            return Err(Error::Disconnected);
        }

        self.pipeline.assembler().reset();
        self.scheduler.start()?;
        control.streaming = true;

        let pool = self.scheduler.pool();
        tracing::info!(
            norm = %control.norm,
            transfers = pool.transfers,
            packets = pool.packets,
            "streaming started"
        );
        Ok(())
    }

    /// Stops streaming
    ///
    /// Blocks until no completion is running anymore. Every buffer still queued, including the
    /// one being filled, is delivered as errored. Also required after the device went away.
    pub fn stop(&self) -> Result<()> {
        let mut control = self.control();
        if !control.streaming {
            return Err(Error::NotStreaming);
        }

        self.scheduler.stop();
        control.streaming = false;
        tracing::info!("streaming stopped");
        Ok(())
    }

    /// Hands a buffer to the pipeline
    ///
    /// The buffer must hold one frame at the active norm.
    pub fn enqueue(&self, buf: FrameBuffer) -> Result<()> {
        if self.pipeline.is_disconnected() {
            return Err(Error::Disconnected);
        }
        self.pipeline.queue.enqueue(buf)
    }

    /// Number of buffers waiting in the queue
    pub fn queued(&self) -> usize {
        self.pipeline.queue.len()
    }

    /// Switches the television standard, only possible while idle
    ///
    /// Queued buffers too small for the new norm are handed back as errored.
    pub fn set_norm(&self, norm: Norm) -> Result<()> {
        let mut control = self.control();
        if control.streaming {
            return Err(Error::Busy);
        }

        let rejected = self.pipeline.set_geometry(norm.geometry());
        control.norm = norm;
        tracing::info!(%norm, geometry = %norm.geometry(), rejected, "norm selected");
        Ok(())
    }

    pub fn norm(&self) -> Norm {
        self.control().norm
    }

    /// Geometry of the active norm
    pub fn geometry(&self) -> Geometry {
        self.norm().geometry()
    }

    /// Format delivered at the active norm
    pub fn format(&self) -> Format {
        Format::for_norm(self.norm())
    }

    /// Writes a sequence of opaque register values
    ///
    /// Stops at the first failing write.
    pub fn write_registers(&self, regs: &[(u16, u16)]) -> Result<()> {
        let _control = self.control();
        if self.pipeline.is_disconnected() {
            return Err(Error::Disconnected);
        }

        for &(reg, value) in regs {
            self.transport.write_register(reg, value)?;
        }
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.control().streaming
    }

    /// Whether the device reported its removal
    pub fn is_disconnected(&self) -> bool {
        self.pipeline.is_disconnected()
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.is_streaming() {
            // stop() only fails when idle
            let _ = self.stop();
        }
    }
}
