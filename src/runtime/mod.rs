//! Per-stream workers and the shared state they run against.

mod context;
mod process;
mod registry;
mod worker;

pub use context::{SupervisorContext, DEFAULT_GRACE_PERIOD};
pub use process::{exit_code, FfmpegLauncher, Launcher, ProcessHandle};
pub use registry::ProcessRegistry;
pub use worker::{ExitInfo, Phase, StopReason, Worker, WorkerState, DEFAULT_RESTART_DELAY};
