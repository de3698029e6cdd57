//! Supervises a set of long-running ffmpeg push processes, one per
//! (media source, RTSP destination) pair: launches them, relaunches them
//! whenever they exit, and tears them all down on SIGINT/SIGTERM.

pub mod cli;
pub mod control;
pub mod error;
pub mod logger;
pub mod parse;
pub mod runtime;
pub mod supervisor;

pub use error::{Error, Result};
pub use parse::{resolve, StreamInputs, StreamSpec};
pub use runtime::{FfmpegLauncher, Launcher, SupervisorContext};
pub use supervisor::{preflight, RunReport, Settings, Supervisor};
