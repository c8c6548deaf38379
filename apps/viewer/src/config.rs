//! Application configuration: engine knobs plus the camera list.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

use camwall_stream::{CameraDescriptor, DescriptorError, EngineConfig, Secret, Transport};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CAMWALL_CONFIG";

/// Empty polls (~3 s at the default 30 ms tick) before a cell shows "No signal".
pub const DEFAULT_STALE_AFTER_EMPTY_POLLS: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub stale_after_empty_polls: u32,
    pub ffmpeg_path: PathBuf,
    /// Vendor stream path used for cameras without an explicit URL.
    pub discovery: Option<DiscoveryConfig>,
    pub cameras: Vec<CameraEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            stale_after_empty_polls: DEFAULT_STALE_AFTER_EMPTY_POLLS,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            discovery: None,
            cameras: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    pub path: String,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
}

fn default_rtsp_port() -> u16 {
    camwall_stream::resolver::DEFAULT_RTSP_PORT
}

fn default_camera_port() -> u16 {
    80
}

/// One camera as written in `camwall.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraEntry {
    pub host: String,
    #[serde(default = "default_camera_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Secret,
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Inferred from `streamUrl` when absent.
    #[serde(default)]
    pub transport: Option<Transport>,
}

impl CameraEntry {
    pub fn to_descriptor(&self) -> Result<CameraDescriptor, DescriptorError> {
        let transport = self.transport.unwrap_or(match self.stream_url {
            Some(_) => Transport::Direct,
            None => Transport::Discovered,
        });
        CameraDescriptor::new(
            self.host.as_str(),
            self.port,
            self.username.as_str(),
            self.password.clone(),
            self.stream_url.as_deref(),
            transport,
        )
    }
}

impl AppConfig {
    /// `$CAMWALL_CONFIG`, else `<config dir>/camwall/camwall.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("camwall").join("camwall.json"))
    }

    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                warn!("No config at {}, starting with no cameras", path.display());
                Ok(Self::default())
            }
            None => {
                warn!("No config directory available, starting with no cameras");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!(
            "Loaded config from {} ({} cameras)",
            path.display(),
            config.cameras.len()
        );
        Ok(config)
    }

    /// Engine settings with environment overrides applied, validated.
    pub fn effective_engine(&self) -> anyhow::Result<EngineConfig> {
        let engine = self.engine.clone().with_env_overrides();
        engine.validate().context("Invalid engine configuration")?;
        Ok(engine)
    }
}
