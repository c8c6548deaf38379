//! Scripted fakes shared by the worker, registry and probe tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::cancel::CancelSignal;
use crate::config::StreamTimeouts;
use crate::error::{OpenError, OpenResult, ReadError, ReadResult, ResolveError};
use crate::events::{CameraEventHandler, FailureEvent, FailureKind};
use crate::resolver::StreamUriResolver;
use crate::source::{Release, StreamHandle, StreamSource};
use crate::types::{CameraDescriptor, CameraId, ConnectionState, Frame, PixelFormat, StreamUrl};

/// Poll `cond` every few milliseconds until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

pub(crate) fn test_frame() -> Frame {
    Frame::new(vec![0; 4 * 2 * 3], 4, 2, PixelFormat::Rgb24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadStep {
    Frame,
    Empty,
    Terminate,
    /// Block until the stream is released.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OpenStep {
    Fail,
    /// Open a stream that plays these reads, then frames forever.
    Open(Vec<ReadStep>),
    BlockUntilCancelled,
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    releases: AtomicUsize,
    blocked_reads: AtomicUsize,
}

/// Plays one [`OpenStep`] per `open()` call; fails once the script runs out.
pub(crate) struct ScriptedSource {
    steps: Mutex<VecDeque<OpenStep>>,
    counters: Arc<Counters>,
}

impl ScriptedSource {
    pub(crate) fn new(steps: Vec<OpenStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            counters: Arc::default(),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn blocked_reads(&self) -> usize {
        self.counters.blocked_reads.load(Ordering::SeqCst)
    }
}

impl StreamSource for ScriptedSource {
    fn open(
        &self,
        url: &StreamUrl,
        _timeouts: &StreamTimeouts,
        cancel: &CancelSignal,
    ) -> OpenResult<Box<dyn StreamHandle>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(OpenStep::Fail);
        match step {
            OpenStep::Fail => Err(OpenError::Rejected(format!("{} refused", url.as_str()))),
            OpenStep::BlockUntilCancelled => {
                cancel.sleep(Duration::from_secs(60));
                Err(OpenError::Cancelled)
            }
            OpenStep::Open(reads) => {
                let (tx, rx) = bounded(0);
                Ok(Box::new(ScriptedHandle {
                    reads: reads.into(),
                    released: rx,
                    releaser: Arc::new(ScriptedRelease {
                        tx: Mutex::new(Some(tx)),
                        counters: self.counters.clone(),
                    }),
                    counters: self.counters.clone(),
                }))
            }
        }
    }
}

struct ScriptedRelease {
    tx: Mutex<Option<Sender<()>>>,
    counters: Arc<Counters>,
}

impl Release for ScriptedRelease {
    fn release(&self) {
        if self.tx.lock().unwrap().take().is_some() {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ScriptedHandle {
    reads: VecDeque<ReadStep>,
    released: Receiver<()>,
    releaser: Arc<ScriptedRelease>,
    counters: Arc<Counters>,
}

impl StreamHandle for ScriptedHandle {
    fn read(&mut self) -> ReadResult<Frame> {
        match self.reads.pop_front().unwrap_or(ReadStep::Frame) {
            ReadStep::Frame => Ok(test_frame()),
            ReadStep::Empty => Err(ReadError::Empty),
            ReadStep::Terminate => Err(ReadError::Terminated),
            ReadStep::Block => {
                self.counters.blocked_reads.fetch_add(1, Ordering::SeqCst);
                let _ = self.released.recv_timeout(Duration::from_secs(60));
                Err(ReadError::Terminated)
            }
        }
    }

    fn releaser(&self) -> Arc<dyn Release> {
        self.releaser.clone()
    }
}

/// Always fails with the same error, recording when it was called.
pub(crate) struct FailingResolver {
    error: ResolveError,
    calls: Mutex<Vec<Instant>>,
}

impl FailingResolver {
    pub(crate) fn new(error: ResolveError) -> Self {
        Self {
            error,
            calls: Mutex::default(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

impl StreamUriResolver for FailingResolver {
    fn resolve(&self, _descriptor: &CameraDescriptor) -> Result<StreamUrl, ResolveError> {
        self.calls.lock().unwrap().push(Instant::now());
        Err(self.error.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordedEvent {
    State(ConnectionState),
    Failure(FailureKind, u32),
    GaveUp(u32),
    Stopped,
}

#[derive(Default)]
pub(crate) struct RecordingEvents {
    events: Mutex<Vec<(CameraId, RecordedEvent)>>,
    failures: Mutex<Vec<FailureEvent>>,
}

impl RecordingEvents {
    pub(crate) fn contains(&self, event: &RecordedEvent) -> bool {
        self.events.lock().unwrap().iter().any(|(_, e)| e == event)
    }

    pub(crate) fn count(&self, pred: impl Fn(&RecordedEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|(_, e)| pred(e)).count()
    }

    pub(crate) fn failures(&self) -> Vec<FailureEvent> {
        self.failures.lock().unwrap().clone()
    }

    pub(crate) fn cameras(&self) -> Vec<CameraId> {
        self.events.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    fn record(&self, camera: CameraId, event: RecordedEvent) {
        self.events.lock().unwrap().push((camera, event));
    }
}

impl CameraEventHandler for RecordingEvents {
    fn on_state_change(&self, camera: CameraId, state: ConnectionState) {
        self.record(camera, RecordedEvent::State(state));
    }

    fn on_failure(&self, camera: CameraId, failure: &FailureEvent) {
        self.failures.lock().unwrap().push(failure.clone());
        self.record(camera, RecordedEvent::Failure(failure.kind, failure.attempt));
    }

    fn on_give_up(&self, camera: CameraId, attempts: u32) {
        self.record(camera, RecordedEvent::GaveUp(attempts));
    }

    fn on_stopped(&self, camera: CameraId) {
        self.record(camera, RecordedEvent::Stopped);
    }
}
