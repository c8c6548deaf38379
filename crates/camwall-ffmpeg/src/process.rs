//! `StreamSource` backed by an `ffmpeg` child process.
//!
//! Each open spawns one decoder writing PPM frames to stdout. A pump thread
//! parses them into a small bounded channel, and the handle reads from that
//! channel with the configured read timeout. Killing the child closes stdout,
//! which ends the pump and unblocks any pending read.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use camwall_stream::{
    mask_urls_in, CancelSignal, Frame, OpenError, ReadError, Release, StreamHandle, StreamSource,
    StreamTimeouts, StreamUrl,
};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::ppm::PpmReader;

/// Decoded frames queued between the pump thread and the handle.
const PUMP_QUEUE: usize = 2;

type FrameResult = Result<Frame, ReadError>;

#[derive(Debug, Clone)]
pub struct FfmpegSource {
    program: PathBuf,
}

impl FfmpegSource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `ffmpeg -version` and return its first output line.
    ///
    /// Releases older than [`MIN_FFMPEG_MAJOR`] read the RTSP `-timeout` option
    /// as a listen timeout and would wait for an inbound connection instead of
    /// dialing the camera, so they are refused. Builds without a numeric
    /// version (git snapshots) are accepted.
    pub fn check_available(&self) -> Result<String, OpenError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|e| OpenError::Spawn(format!("{}: {e}", self.program.display())))?;
        if !output.status.success() {
            return Err(OpenError::Spawn(format!(
                "{} -version exited with {}",
                self.program.display(),
                output.status
            )));
        }
        let banner = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        match major_version(&banner) {
            Some(major) if major < MIN_FFMPEG_MAJOR => Err(OpenError::Spawn(format!(
                "ffmpeg {MIN_FFMPEG_MAJOR} or newer is required, found \"{banner}\""
            ))),
            _ => Ok(banner),
        }
    }
}

/// Oldest ffmpeg major release whose RTSP demuxer treats `-timeout` as a
/// socket I/O timeout.
pub const MIN_FFMPEG_MAJOR: u32 = 5;

/// Major version from a banner like `ffmpeg version 6.1.1-3ubuntu5 ...`.
fn major_version(banner: &str) -> Option<u32> {
    let version = banner.split_whitespace().skip_while(|w| *w != "version").nth(1)?;
    let version = version.strip_prefix('n').unwrap_or(version);
    let digits: String = version.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

/// Command line for decoding `url` into a PPM stream on stdout.
pub fn build_args(url: &StreamUrl, timeouts: &StreamTimeouts) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .into_iter()
        .map(String::from)
        .collect();

    let socket_timeout_us = timeouts.open.as_micros().to_string();
    if url.is_rtsp() {
        args.extend(["-rtsp_transport".into(), "tcp".into()]);
        args.extend(["-timeout".into(), socket_timeout_us]);
    } else {
        args.extend(["-rw_timeout".into(), socket_timeout_us]);
    }

    args.extend(["-i".into(), url.as_str().to_string()]);
    args.extend(
        ["-an", "-f", "image2pipe", "-c:v", "ppm", "-pix_fmt", "rgb24", "-"]
            .into_iter()
            .map(String::from),
    );
    args
}

impl StreamSource for FfmpegSource {
    fn open(
        &self,
        url: &StreamUrl,
        timeouts: &StreamTimeouts,
        cancel: &CancelSignal,
    ) -> Result<Box<dyn StreamHandle>, OpenError> {
        let masked = url.masked();
        let mut child = Command::new(&self.program)
            .args(build_args(url, timeouts))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OpenError::Spawn(format!("{}: {e}", self.program.display())))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let release = Arc::new(ChildRelease::new(child, masked.clone()));

        let Some(stdout) = stdout else {
            release.release();
            return Err(OpenError::Spawn("decoder stdout was not captured".into()));
        };
        if let Some(stderr) = stderr {
            forward_stderr(stderr, masked.clone());
        }

        let (tx, frames) = bounded::<FrameResult>(PUMP_QUEUE);
        let pump = thread::Builder::new()
            .name("ffmpeg-pump".into())
            .spawn(move || {
                let mut reader = PpmReader::new(stdout);
                loop {
                    let next = match reader.next_frame() {
                        Ok(Some(frame)) => Ok(frame),
                        Ok(None) => break,
                        Err(e) => Err(ReadError::Decode(e.to_string())),
                    };
                    let failed = next.is_err();
                    if tx.send(next).is_err() || failed {
                        break;
                    }
                }
            });
        if let Err(e) = pump {
            release.release();
            return Err(OpenError::Spawn(format!("failed to spawn pump thread: {e}")));
        }

        let cancelled = cancel.receiver();
        let first = select! {
            recv(frames) -> msg => match msg {
                Ok(Ok(frame)) => Ok(frame),
                Ok(Err(e)) => Err(OpenError::Rejected(format!("{masked}: {e}"))),
                Err(_) => Err(OpenError::Terminated(masked.clone())),
            },
            recv(cancelled) -> _ => Err(OpenError::Cancelled),
            default(timeouts.open) => Err(OpenError::Timeout(masked.clone())),
        };

        match first {
            Ok(frame) => {
                debug!(
                    url = %masked,
                    width = frame.width,
                    height = frame.height,
                    "Decoder producing frames"
                );
                Ok(Box::new(FfmpegHandle {
                    frames,
                    pending: Some(frame),
                    read_timeout: timeouts.read,
                    release,
                }))
            }
            Err(e) => {
                release.release();
                Err(e)
            }
        }
    }
}

/// Log decoder diagnostics with credentials masked. Ends when the child exits.
fn forward_stderr(stderr: ChildStderr, url: String) {
    let spawned = thread::Builder::new()
        .name("ffmpeg-stderr".into())
        .spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                let line = line.trim();
                if !line.is_empty() {
                    warn!(url = %url, "ffmpeg: {}", mask_urls_in(line));
                }
            }
        });
    if let Err(e) = spawned {
        debug!("Not forwarding ffmpeg stderr: {e}");
    }
}

/// Kills and reaps the decoder exactly once.
pub struct ChildRelease {
    child: Mutex<Option<Child>>,
    url: String,
}

impl ChildRelease {
    pub fn new(child: Child, url: String) -> Self {
        Self {
            child: Mutex::new(Some(child)),
            url,
        }
    }

    pub fn is_released(&self) -> bool {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Release for ChildRelease {
    fn release(&self) {
        let child = self
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut child) = child else {
            return;
        };
        if let Err(e) = child.kill() {
            debug!(url = %self.url, "Decoder already exited: {e}");
        }
        match child.wait() {
            Ok(status) => debug!(url = %self.url, %status, "Decoder released"),
            Err(e) => warn!(url = %self.url, "Failed to reap decoder: {e}"),
        }
    }
}

pub struct FfmpegHandle {
    frames: Receiver<FrameResult>,
    /// First frame, received during open.
    pending: Option<Frame>,
    read_timeout: std::time::Duration,
    release: Arc<ChildRelease>,
}

impl StreamHandle for FfmpegHandle {
    fn read(&mut self) -> Result<Frame, ReadError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match self.frames.recv_timeout(self.read_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ReadError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ReadError::Terminated),
        }
    }

    fn releaser(&self) -> Arc<dyn Release> {
        self.release.clone()
    }
}

impl Drop for FfmpegHandle {
    fn drop(&mut self) {
        self.release.release();
    }
}
