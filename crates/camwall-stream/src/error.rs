use thiserror::Error;

/// Failure to turn a camera descriptor into a playable stream URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No credentials configured for discovery")]
    NoCredentials,

    #[error("No stream capability found: {0}")]
    NoCapabilityFound(String),

    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("Discovery timed out")]
    Timeout,

    #[error("Discovery failed: {0}")]
    Other(String),
}

/// Failure to open a stream. Messages never carry a cleartext password.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to start decoder: {0}")]
    Spawn(String),

    #[error("Timed out waiting for the first frame from {0}")]
    Timeout(String),

    #[error("Stream {0} ended before the first frame")]
    Terminated(String),

    #[error("Open rejected: {0}")]
    Rejected(String),

    #[error("Open cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to read the next frame from an open stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// The read returned without a frame.
    #[error("Read returned no frame")]
    Empty,

    #[error("Timed out waiting for a frame")]
    Timeout,

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    /// The underlying stream is gone; no further reads can succeed.
    #[error("Stream terminated")]
    Terminated,
}

impl ReadError {
    /// Whether the handle can still yield frames after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadError::Terminated)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("retryBackoffBaseSec must be at least 1, got {0}")]
    BackoffBase(u32),

    #[error("maxRetryWaitSec ({max}) must not be below retryBackoffBaseSec ({base})")]
    BackoffCeiling { base: u32, max: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Host address is empty")]
    EmptyHost,

    #[error("Invalid host address: {0:?}")]
    InvalidHost(String),

    #[error("Unsupported stream URL scheme in {0}")]
    UnsupportedScheme(String),

    #[error("Invalid stream URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Failure of a one-shot connection probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("Stream opened but no frame could be read: {0}")]
    Read(#[from] ReadError),
}

pub type OpenResult<T> = Result<T, OpenError>;
pub type ReadResult<T> = Result<T, ReadError>;
