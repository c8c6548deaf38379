//! ffmpeg-backed decoding for camwall streams.

pub mod ppm;
pub mod process;

pub use ppm::{PpmError, PpmReader};
pub use process::{build_args, ChildRelease, FfmpegHandle, FfmpegSource, MIN_FFMPEG_MAJOR};
