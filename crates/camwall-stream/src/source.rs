//! Stream source abstraction: one trait per seam, one concrete type per backend.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cancel::CancelSignal;
use crate::config::StreamTimeouts;
use crate::error::{OpenResult, ReadResult};
use crate::types::{Frame, StreamUrl};

/// Releases the OS resources behind a stream handle.
///
/// Must be idempotent and callable from any thread, including while another
/// thread is blocked in [`StreamHandle::read`] on the same stream.
pub trait Release: Send + Sync {
    fn release(&self);
}

/// An open decode session.
pub trait StreamHandle: Send {
    /// Next frame, bounded by the read timeout the handle was opened with.
    fn read(&mut self) -> ReadResult<Frame>;

    /// A handle to this stream's release, usable from other threads.
    fn releaser(&self) -> Arc<dyn Release>;
}

/// Opens network video streams.
pub trait StreamSource: Send + Sync {
    /// Open `url`, waiting no longer than `timeouts.open` for the stream to
    /// become readable. Returns [`OpenError::Cancelled`](crate::error::OpenError::Cancelled)
    /// early if `cancel` fires while waiting.
    fn open(
        &self,
        url: &StreamUrl,
        timeouts: &StreamTimeouts,
        cancel: &CancelSignal,
    ) -> OpenResult<Box<dyn StreamHandle>>;
}

/// Where a worker publishes the releaser of its currently open stream, so
/// `stop()` can force-release it while the loop is blocked in a read.
#[derive(Default)]
pub struct ReleaseSlot {
    current: Mutex<Option<Arc<dyn Release>>>,
}

impl ReleaseSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn Release>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, releaser: Arc<dyn Release>) {
        *self.lock() = Some(releaser);
    }

    fn clear(&self) {
        self.lock().take();
    }

    /// Release the published stream, if any. Safe when nothing is open.
    pub fn release_now(&self) -> bool {
        let releaser = self.lock().take();
        match releaser {
            Some(releaser) => {
                releaser.release();
                true
            }
            None => false,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }
}

/// Scoped ownership of an open stream: released on every exit path, unwinding included.
pub struct OpenStream<'a> {
    handle: Box<dyn StreamHandle>,
    releaser: Arc<dyn Release>,
    slot: &'a ReleaseSlot,
}

impl<'a> OpenStream<'a> {
    pub fn new(handle: Box<dyn StreamHandle>, slot: &'a ReleaseSlot) -> Self {
        let releaser = handle.releaser();
        slot.publish(releaser.clone());
        Self {
            handle,
            releaser,
            slot,
        }
    }

    pub fn read(&mut self) -> ReadResult<Frame> {
        self.handle.read()
    }
}

impl Drop for OpenStream<'_> {
    fn drop(&mut self) {
        self.slot.clear();
        self.releaser.release();
    }
}
