//! FFmpeg concern for the vproc engine.
//!
//! - [`command`]: pure argument construction for each operation type
//! - [`exec`]: running one invocation with captured output and a timeout
//! - [`classify`]: mapping raw stderr to user-facing failure categories
//! - [`probe`]: ffprobe metadata extraction

pub mod classify;
pub mod command;
pub mod error;
pub mod exec;
pub mod probe;

pub use classify::{classify, VIDEO_SOURCES_INCOMPATIBLE};
pub use command::{CommandBuilder, FfmpegInvocation};
pub use error::{MediaError, MediaResult};
pub use exec::{ExecOutput, FfmpegRunner};
pub use probe::{aspect_ratio, parse_frame_rate, probe_media, MediaInfo};
