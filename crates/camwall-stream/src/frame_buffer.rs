//! Bounded drop-oldest frame queue between a worker's read loop and the UI poll.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::DEFAULT_FRAME_BUFFER_CAPACITY;
use crate::types::Frame;

/// Result of [`FrameBuffer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    /// Inserted after evicting the oldest frame.
    Evicted,
    /// The buffer was closed by `stop()`; the frame was discarded.
    Closed,
}

struct Inner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Fixed-capacity FIFO. Neither `push` nor `pop` ever waits for the other side.
pub struct FrameBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl FrameBuffer {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking producer leaves the queue structurally valid.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `frame`, evicting the oldest entry first if the buffer is full.
    pub fn push(&self, frame: Frame) -> PushOutcome {
        let mut inner = self.lock();
        if inner.closed {
            return PushOutcome::Closed;
        }
        let evicted = if inner.frames.len() >= self.capacity {
            inner.frames.pop_front();
            true
        } else {
            false
        };
        inner.frames.push_back(frame);
        if evicted {
            PushOutcome::Evicted
        } else {
            PushOutcome::Inserted
        }
    }

    /// Remove and return the oldest frame, or `None` when empty.
    pub fn pop(&self) -> Option<Frame> {
        self.lock().frames.pop_front()
    }

    /// Discard every buffered frame. Returns how many were dropped.
    pub fn drain(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.frames.len();
        inner.frames.clear();
        dropped
    }

    /// Drain and refuse all further pushes.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.frames.clear();
        inner.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_BUFFER_CAPACITY)
    }
}
