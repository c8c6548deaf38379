pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod frame_buffer;
pub mod policy;
pub mod probe;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancelSignal;
pub use config::{EngineConfig, StreamTimeouts};
pub use error::{ConfigError, DescriptorError, OpenError, ProbeError, ReadError, ResolveError};
pub use events::{CameraEventHandler, FailureEvent, FailureKind, TracingEventHandler};
pub use frame_buffer::{FrameBuffer, PushOutcome};
pub use policy::{ConnectDecision, ReadDecision, ReconnectPolicy};
pub use probe::{probe_connection, ProbeReport};
pub use registry::{CameraRegistry, CameraSnapshot};
pub use resolver::{DirectResolver, StreamUriResolver, TemplateResolver};
pub use source::{OpenStream, Release, ReleaseSlot, StreamHandle, StreamSource};
pub use types::*;
pub use worker::{CameraWorker, WorkerOptions};
