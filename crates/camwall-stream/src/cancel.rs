//! Cooperative cancellation with interruptible sleeps.
//!
//! Cancelling drops the only sender of a zero-capacity channel, which wakes every
//! receiver blocked in `recv_timeout` at once.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

pub struct CancelSignal {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration` unless cancelled first. Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        match self.rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
            // Nothing is ever sent; treat it as a spurious wake.
            Ok(()) => self.is_cancelled(),
        }
    }

    /// A receiver that becomes disconnected on cancel, for use in `select!`.
    pub fn receiver(&self) -> Receiver<()> {
        self.rx.clone()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
