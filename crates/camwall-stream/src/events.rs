//! Observer interface injected into the registry and every worker.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::types::{CameraId, ConnectionState};

/// Which step of the connect/read cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Resolve,
    Open,
    Read,
    StreamTerminated,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Resolve => "resolve",
            FailureKind::Open => "open",
            FailureKind::Read => "read",
            FailureKind::StreamTerminated => "stream_terminated",
        }
    }
}

/// One failure, ready for logging. `detail` and `url` are already masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEvent {
    pub kind: FailureKind,
    pub detail: String,
    pub url: Option<String>,
    /// Consecutive failures of this class so far.
    pub attempt: u32,
    /// Delay before the next try, if one is scheduled.
    pub retry_in: Option<Duration>,
}

/// Receives worker lifecycle events. Called from worker threads.
pub trait CameraEventHandler: Send + Sync + 'static {
    /// The camera's connection state changed.
    fn on_state_change(&self, camera: CameraId, state: ConnectionState);

    /// A connect or read step failed. Never carries a cleartext password.
    fn on_failure(&self, camera: CameraId, failure: &FailureEvent);

    /// Retries are exhausted after `attempts` consecutive connect failures.
    fn on_give_up(&self, camera: CameraId, attempts: u32);

    /// The worker finished stopping.
    fn on_stopped(&self, camera: CameraId) {
        let _ = camera;
    }
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

impl CameraEventHandler for TracingEventHandler {
    fn on_state_change(&self, camera: CameraId, state: ConnectionState) {
        info!(camera = %camera, ?state, "Camera state changed");
    }

    fn on_failure(&self, camera: CameraId, failure: &FailureEvent) {
        match failure.kind {
            FailureKind::Read => debug!(
                camera = %camera,
                kind = failure.kind.label(),
                attempt = failure.attempt,
                detail = %failure.detail,
                "Frame read failed"
            ),
            _ => warn!(
                camera = %camera,
                kind = failure.kind.label(),
                attempt = failure.attempt,
                url = failure.url.as_deref().unwrap_or("-"),
                retry_in_ms = failure.retry_in.map(|d| d.as_millis() as u64),
                detail = %failure.detail,
                "Camera connection failure"
            ),
        }
    }

    fn on_give_up(&self, camera: CameraId, attempts: u32) {
        error!(camera = %camera, attempts, "Max retries reached, giving up");
    }

    fn on_stopped(&self, camera: CameraId) {
        info!(camera = %camera, "Camera worker stopped");
    }
}
