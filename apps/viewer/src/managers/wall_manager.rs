//! Camera wall presentation state.
//!
//! Turns registry snapshots into one status overlay per cell. The "No signal"
//! overlay is presentation only: it never touches worker state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use camwall_stream::{
    CameraEventHandler, CameraId, CameraSnapshot, ConnectionState, FailureEvent,
    TracingEventHandler,
};

/// Coarse per-cell status. Raw error details stay in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    /// Frames are arriving; no overlay is drawn.
    Live,
    Connecting,
    Disconnected,
    Failed,
    /// Connected, but nothing arrived for `staleAfterEmptyPolls` ticks.
    NoSignal,
}

impl Overlay {
    pub fn text(self) -> Option<&'static str> {
        match self {
            Overlay::Live => None,
            Overlay::Connecting => Some("Connecting…"),
            Overlay::Disconnected => Some("Disconnected"),
            Overlay::Failed => Some("Failed"),
            Overlay::NoSignal => Some("No signal"),
        }
    }
}

/// Last frame drawn in a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShownFrame {
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub id: CameraId,
    pub label: String,
    pub state: ConnectionState,
    pub overlay: Overlay,
    pub empty_polls: u32,
    pub frames_shown: u64,
    pub last_frame: Option<ShownFrame>,
}

/// A cell whose overlay changed on this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayChange {
    pub id: CameraId,
    pub label: String,
    pub overlay: Overlay,
}

/// Events forwarded from worker threads to the wall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WallEvent {
    StateChanged {
        camera: CameraId,
        state: ConnectionState,
    },
    GaveUp {
        camera: CameraId,
        attempts: u32,
    },
    Stopped {
        camera: CameraId,
    },
}

fn overlay_for(state: ConnectionState, empty_polls: u32, stale_after: u32) -> Overlay {
    match state {
        ConnectionState::Connecting => Overlay::Connecting,
        ConnectionState::Disconnected => Overlay::Disconnected,
        ConnectionState::Failed => Overlay::Failed,
        ConnectionState::Connected if empty_polls >= stale_after => Overlay::NoSignal,
        ConnectionState::Connected => Overlay::Live,
    }
}

pub struct WallManager {
    cells: Vec<Cell>,
    stale_after: u32,
}

impl WallManager {
    pub fn new(stale_after_empty_polls: u32) -> Self {
        Self {
            cells: Vec::new(),
            stale_after: stale_after_empty_polls.max(1),
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, id: CameraId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    /// Apply one poll tick. Cells follow the snapshot order; cameras missing
    /// from the snapshot are dropped.
    pub fn apply(&mut self, snapshots: &[CameraSnapshot]) -> Vec<OverlayChange> {
        let mut previous = std::mem::take(&mut self.cells);
        let mut changes = Vec::new();

        for snapshot in snapshots {
            let existing = previous
                .iter()
                .position(|c| c.id == snapshot.id)
                .map(|i| previous.swap_remove(i));
            let is_new = existing.is_none();
            let mut cell = existing.unwrap_or_else(|| Cell {
                id: snapshot.id,
                label: snapshot.label.clone(),
                state: snapshot.state,
                overlay: Overlay::Connecting,
                empty_polls: 0,
                frames_shown: 0,
                last_frame: None,
            });

            match &snapshot.frame {
                Some(frame) => {
                    cell.empty_polls = 0;
                    cell.frames_shown += 1;
                    cell.last_frame = Some(ShownFrame {
                        width: frame.width,
                        height: frame.height,
                        captured_at: frame.captured_at,
                    });
                }
                None => cell.empty_polls = cell.empty_polls.saturating_add(1),
            }
            cell.state = snapshot.state;

            let overlay = overlay_for(cell.state, cell.empty_polls, self.stale_after);
            if is_new || overlay != cell.overlay {
                cell.overlay = overlay;
                changes.push(OverlayChange {
                    id: cell.id,
                    label: cell.label.clone(),
                    overlay,
                });
            }
            self.cells.push(cell);
        }

        for gone in previous {
            debug!(camera = %gone.id, "Cell removed from wall");
        }
        changes
    }

    /// Reflect a worker event before the next poll tick.
    pub fn handle_event(&mut self, event: &WallEvent) -> Option<OverlayChange> {
        let (camera, state) = match *event {
            WallEvent::StateChanged { camera, state } => (camera, state),
            WallEvent::GaveUp { camera, .. } => (camera, ConnectionState::Failed),
            WallEvent::Stopped { camera } => (camera, ConnectionState::Disconnected),
        };
        let stale_after = self.stale_after;
        let cell = self.cells.iter_mut().find(|c| c.id == camera)?;
        cell.state = state;
        if state != ConnectionState::Connected {
            cell.empty_polls = 0;
        }
        let overlay = overlay_for(state, cell.empty_polls, stale_after);
        if overlay == cell.overlay {
            return None;
        }
        cell.overlay = overlay;
        Some(OverlayChange {
            id: cell.id,
            label: cell.label.clone(),
            overlay,
        })
    }
}

/// Logs every event and forwards the coarse ones to the wall.
pub struct ViewerEventHandler {
    tx: mpsc::UnboundedSender<WallEvent>,
    log: TracingEventHandler,
}

impl ViewerEventHandler {
    pub fn new(tx: mpsc::UnboundedSender<WallEvent>) -> Self {
        Self {
            tx,
            log: TracingEventHandler,
        }
    }

    fn forward(&self, event: WallEvent) {
        // The wall is gone during shutdown; events after that are only logged.
        let _ = self.tx.send(event);
    }
}

impl CameraEventHandler for ViewerEventHandler {
    fn on_state_change(&self, camera: CameraId, state: ConnectionState) {
        self.log.on_state_change(camera, state);
        self.forward(WallEvent::StateChanged { camera, state });
    }

    fn on_failure(&self, camera: CameraId, failure: &FailureEvent) {
        self.log.on_failure(camera, failure);
    }

    fn on_give_up(&self, camera: CameraId, attempts: u32) {
        self.log.on_give_up(camera, attempts);
        self.forward(WallEvent::GaveUp { camera, attempts });
    }

    fn on_stopped(&self, camera: CameraId) {
        self.log.on_stopped(camera);
        self.forward(WallEvent::Stopped { camera });
    }
}
