//! The camera wall: one worker per descriptor behind a single coarse lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Span};

use crate::config::EngineConfig;
use crate::events::CameraEventHandler;
use crate::resolver::StreamUriResolver;
use crate::source::StreamSource;
use crate::types::{CameraDescriptor, CameraId, ConnectionState, Frame, WorkerState, WorkerStats};
use crate::worker::{CameraWorker, WorkerOptions};

/// One camera as seen by a UI poll tick.
#[derive(Debug, Clone, Serialize)]
pub struct CameraSnapshot {
    pub id: CameraId,
    pub label: String,
    pub state: ConnectionState,
    pub worker_state: WorkerState,
    #[serde(skip)]
    pub frame: Option<Frame>,
    pub stats: WorkerStats,
}

pub struct CameraRegistry {
    /// Workers in the order they were added, which is the wall layout order.
    workers: Mutex<Vec<Arc<CameraWorker>>>,
    options: WorkerOptions,
    resolver: Arc<dyn StreamUriResolver>,
    source: Arc<dyn StreamSource>,
    events: Arc<dyn CameraEventHandler>,
}

impl CameraRegistry {
    pub fn new(
        config: EngineConfig,
        resolver: Arc<dyn StreamUriResolver>,
        source: Arc<dyn StreamSource>,
        events: Arc<dyn CameraEventHandler>,
    ) -> Self {
        let options = WorkerOptions::new(config).parent_span(info_span!("camera_registry"));
        Self {
            workers: Mutex::new(Vec::new()),
            options,
            resolver,
            source,
            events,
        }
    }

    /// Override the backoff unit handed to every worker created from now on.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.options.backoff_unit = unit;
        self
    }

    pub fn with_parent_span(mut self, span: Span) -> Self {
        self.options.parent_span = span;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<CameraWorker>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn build_worker(&self, id: CameraId, descriptor: CameraDescriptor) -> Arc<CameraWorker> {
        Arc::new(CameraWorker::new(
            id,
            descriptor,
            self.resolver.clone(),
            self.source.clone(),
            self.events.clone(),
            self.options.clone(),
        ))
    }

    /// Construct and start a worker for `descriptor`.
    pub fn add(&self, descriptor: CameraDescriptor) -> CameraId {
        let id = CameraId::new();
        let label = descriptor.label();
        let worker = self.build_worker(id, descriptor);
        if !worker.start() {
            warn!(camera = %id, host = %label, "Camera worker failed to start");
        }
        self.lock().push(worker);
        info!(camera = %id, host = %label, "Camera added");
        id
    }

    /// Stop and discard a worker. Returns `false` for an unknown id.
    pub fn remove(&self, id: CameraId) -> bool {
        let removed = {
            let mut workers = self.lock();
            workers
                .iter()
                .position(|w| w.id() == id)
                .map(|index| workers.remove(index))
        };
        match removed {
            Some(worker) => {
                worker.stop();
                info!(camera = %id, "Camera removed");
                true
            }
            None => false,
        }
    }

    /// Stop the worker for `id` and start a fresh one for `descriptor` in the
    /// same wall position. Returns the new id, or `None` for an unknown id.
    pub fn replace(&self, id: CameraId, descriptor: CameraDescriptor) -> Option<CameraId> {
        let new_id = CameraId::new();
        let (old, worker) = {
            let mut workers = self.lock();
            let slot = workers.iter_mut().find(|w| w.id() == id)?;
            let worker = self.build_worker(new_id, descriptor);
            (std::mem::replace(slot, worker.clone()), worker)
        };
        old.stop();
        if !worker.start() {
            warn!(camera = %new_id, "Replacement camera worker failed to start");
        }
        info!(old = %id, camera = %new_id, "Camera replaced");
        Some(new_id)
    }

    pub fn get(&self, id: CameraId) -> Option<Arc<CameraWorker>> {
        self.lock().iter().find(|w| w.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<CameraId> {
        self.lock().iter().map(|w| w.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stop every worker concurrently and empty the registry.
    ///
    /// Each stop is bounded by `stopJoinTimeoutMs`, and all of them run at
    /// once, so the whole call is bounded by roughly one join timeout.
    pub fn stop_all(&self) -> usize {
        let workers = std::mem::take(&mut *self.lock());
        let count = workers.len();
        if count == 0 {
            return 0;
        }
        debug!(count, "Stopping all cameras");

        thread::scope(|scope| {
            for worker in &workers {
                let spawned = thread::Builder::new()
                    .name("camera-stop".into())
                    .spawn_scoped(scope, move || worker.stop());
                if let Err(e) = spawned {
                    warn!("Failed to spawn stop thread, stopping inline: {e}");
                    worker.stop();
                }
            }
        });

        info!(count, "All cameras stopped");
        count
    }

    /// One non-blocking read per worker: state, stats and the next buffered frame.
    pub fn snapshot(&self) -> Vec<CameraSnapshot> {
        let workers = self.lock().clone();
        workers
            .iter()
            .map(|worker| CameraSnapshot {
                id: worker.id(),
                label: worker.descriptor().label(),
                state: worker.connection_state(),
                worker_state: worker.worker_state(),
                frame: worker.get_latest_frame(),
                stats: worker.stats(),
            })
            .collect()
    }
}

impl Drop for CameraRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
