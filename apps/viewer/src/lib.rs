mod config;
mod managers;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use camwall_ffmpeg::FfmpegSource;
use camwall_stream::{CameraRegistry, DirectResolver, StreamUriResolver, TemplateResolver};

pub use config::{AppConfig, CameraEntry};
pub use managers::wall_manager::{
    Overlay, OverlayChange, ViewerEventHandler, WallEvent, WallManager,
};

const DEFAULT_LOG_FILTER: &str = "camwall=debug,camwall_stream=debug,camwall_ffmpeg=info";

/// Rotated log files kept on disk.
const MAX_LOG_FILES: usize = 7;

/// `<data dir>/camwall/logs`.
pub fn log_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("camwall").join("logs"))
}

/// Daily-rotated `camwall.<date>.log` files under `dir`.
fn file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("camwall")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .context("Failed to open log file")
}

/// Stdout plus a rolling log file. The guard flushes the file on drop.
fn init_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let (file_layer, guard, problem) = match log_dir().map(|dir| file_appender(&dir)) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Some(Err(e)) => (None, None, Some(format!("{e:#}"))),
        None => (None, None, Some("no data directory available".to_string())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    if let Some(problem) = problem {
        warn!("Logging to stdout only: {problem}");
    }
    guard
}

pub fn run() {
    let log_guard = init_logging();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(app_main()));
    if let Err(e) = &result {
        error!("camwall exited with error: {e:#}");
    }

    drop(log_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}

async fn app_main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let engine = config.effective_engine()?;

    let source = FfmpegSource::new(&config.ffmpeg_path);
    match source.check_available() {
        Ok(version) => info!("Using {version}"),
        Err(e) => warn!("ffmpeg is not usable, every camera will fail to open: {e}"),
    }

    let resolver: Arc<dyn StreamUriResolver> = match &config.discovery {
        Some(discovery) => Arc::new(DirectResolver::with_discovery(Arc::new(
            TemplateResolver::new(discovery.path.as_str()).with_port(discovery.rtsp_port),
        ))),
        None => Arc::new(DirectResolver::new()),
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(CameraRegistry::new(
        engine.clone(),
        resolver,
        Arc::new(source),
        Arc::new(ViewerEventHandler::new(event_tx)),
    ));

    for entry in &config.cameras {
        match entry.to_descriptor() {
            Ok(descriptor) => {
                registry.add(descriptor);
            }
            Err(e) => warn!(host = %entry.host, "Skipping camera: {e}"),
        }
    }
    if registry.is_empty() {
        warn!("No cameras configured");
    }

    let mut wall = WallManager::new(config.stale_after_empty_polls);
    run_wall(registry, &mut wall, event_rx, engine.poll_interval(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
        }
    })
    .await
}

/// Poll `registry` every `poll_interval` until `shutdown` resolves, then stop
/// every camera off the async threads.
pub async fn run_wall(
    registry: Arc<CameraRegistry>,
    wall: &mut WallManager,
    mut events: mpsc::UnboundedReceiver<WallEvent>,
    poll_interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!(cameras = registry.len(), "Camera wall running");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshots = registry.snapshot();
                for change in wall.apply(&snapshots) {
                    render(&change);
                }
            }
            Some(event) = events.recv() => {
                if let Some(change) = wall.handle_event(&event) {
                    render(&change);
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down camera wall");
                break;
            }
        }
    }

    let stopped = tokio::task::spawn_blocking(move || registry.stop_all())
        .await
        .context("Camera shutdown task failed")?;
    info!(stopped, "Camera wall stopped");
    Ok(())
}

fn render(change: &OverlayChange) {
    match change.overlay.text() {
        Some(text) => info!(camera = %change.label, "[{text}]"),
        None => info!(camera = %change.label, "[live]"),
    }
}
