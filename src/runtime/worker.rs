use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::control::terminate;
use crate::error::Error;
use crate::parse::StreamSpec;
use crate::runtime::context::SupervisorContext;
use crate::runtime::process::{exit_code, spawn_child, Launcher, ProcessHandle};

pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// How much of a failed process's stderr ends up in the log, counted from the end.
const STDERR_LOG_LIMIT: usize = 500;

/// Bytes of stderr kept per process; ffmpeg prints progress for as long as it runs.
const STDERR_TAIL_BYTES: usize = 4096;

/// How long the reader gets to reach EOF once the process is gone. A forked
/// helper can keep the pipe open indefinitely.
const STDERR_DRAIN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Exited,
    Restarting,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    SourceMissing,
}

/// How the last launch ended. `code` is `None` when the process never started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub cancelled: bool,
}

/// Everything a worker knows about its stream. Returned when the worker stops.
#[derive(Debug, Clone)]
pub struct WorkerState {
    pub stream: usize,
    pub phase: Phase,
    pub process: Option<Arc<ProcessHandle>>,
    pub last_exit: Option<ExitInfo>,
    pub launches: u64,
    pub stop_reason: Option<StopReason>,
}

impl WorkerState {
    fn new(stream: usize) -> Self {
        Self {
            stream,
            phase: Phase::Starting,
            process: None,
            last_exit: None,
            launches: 0,
            stop_reason: None,
        }
    }
}

/// Keeps one stream on air: launch, wait, wait out the restart delay,
/// launch again, until shutdown is requested.
pub struct Worker {
    spec: StreamSpec,
    ctx: SupervisorContext,
    launcher: Arc<dyn Launcher>,
    restart_delay: Duration,
    child: Option<Child>,
    stderr: Option<StderrTail>,
    state: WorkerState,
}

impl Worker {
    pub fn new(
        spec: StreamSpec,
        ctx: SupervisorContext,
        launcher: Arc<dyn Launcher>,
        restart_delay: Duration,
    ) -> Self {
        let state = WorkerState::new(spec.index());
        Self {
            spec,
            ctx,
            launcher,
            restart_delay,
            child: None,
            stderr: None,
            state,
        }
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.spec
    }



    /*
        @@@
        @run();
        . Drives the state machine until Stopped and hands back the final state.
        . Every exit, clean or not, leads to a restart unless shutdown was requested.
    */
    pub async fn run(mut self) -> WorkerState {
        info!(
            stream = self.spec.index(),
            source = %self.spec.source().display(),
            destination = self.spec.destination(),
            "worker started"
        );
        loop {
            match self.state.phase {
                Phase::Starting => self.start(),
                Phase::Running => self.wait().await,
                Phase::Exited => {
                    if self.ctx.is_cancelled() {
                        self.stop(StopReason::Shutdown);
                    } else {
                        self.state.phase = Phase::Restarting;
                    }
                }
                Phase::Restarting => self.back_off().await,
                Phase::Stopped => break,
            }
        }
        info!(
            stream = self.spec.index(),
            launches = self.state.launches,
            reason = ?self.state.stop_reason,
            "worker stopped"
        );
        self.state
    }

    fn stop(&mut self, reason: StopReason) {
        self.state.phase = Phase::Stopped;
        self.state.stop_reason = Some(reason);
    }



    /*
        @@@
        @start();
        . Gives up for good if the source has vanished; it will not come back on its own.
        . A spawn failure is treated like any other exit and retried after the delay.
        . Registers the new process; if shutdown raced the launch, terminates it right away.
    */
    fn start(&mut self) {
        let stream = self.spec.index();
        if self.ctx.is_cancelled() {
            self.stop(StopReason::Shutdown);
            return;
        }

        if !self.spec.source().is_file() {
            let err = Error::SourceMissing {
                index: stream,
                path: self.spec.source().to_path_buf(),
            };
            error!(stream, error = %err, "not restarting");
            self.stop(StopReason::SourceMissing);
            return;
        }

        let mut child = match spawn_child(self.launcher.as_ref(), &self.spec) {
            Ok(child) => child,
            Err(source) => {
                let err = Error::ProcessLaunch { index: stream, source };
                error!(stream, error = %err, "launch failed");
                self.state.last_exit = Some(ExitInfo {
                    code: None,
                    cancelled: self.ctx.is_cancelled(),
                });
                self.state.phase = Phase::Exited;
                return;
            }
        };

        // `id()` is only `None` once the child has been awaited.
        let Some(pid) = child.id() else {
            self.state.phase = Phase::Exited;
            return;
        };

        let handle = Arc::new(ProcessHandle::new(stream, pid));
        self.ctx.registry().register(stream, handle.clone());
        self.state.launches += 1;
        info!(stream, pid, launch = self.state.launches, "push process started");

        if self.ctx.is_cancelled() {
            let handle = handle.clone();
            let grace = self.ctx.grace_period();
            tokio::spawn(async move {
                let outcome = terminate(&handle, grace).await;
                info!(stream, pid, ?outcome, "stopped a launch that raced shutdown");
            });
        }

        self.stderr = child.stderr.take().map(StderrTail::capture);
        self.child = Some(child);
        self.state.process = Some(handle);
        self.state.phase = Phase::Running;
    }



    /*
        @@@
        @wait();
        . Waits for the process itself, not for its stderr; shutdown reaches it through SIGTERM/SIGKILL.
        . Reaps, then marks the handle exited and drops it from the registry.
        . Logs the end of stderr only for non-zero exits outside of shutdown.
    */
    async fn wait(&mut self) {
        let stream = self.spec.index();
        let (Some(mut child), Some(handle)) = (self.child.take(), self.state.process.clone()) else {
            self.state.phase = Phase::Exited;
            return;
        };
        let stderr = self.stderr.take();

        let result = child.wait().await;
        handle.mark_exited();
        self.ctx.registry().unregister(stream, &handle);
        self.state.process = None;

        let cancelled = self.ctx.is_cancelled() || handle.is_terminating();
        let code = match result {
            Ok(status) => {
                let code = exit_code(status);
                if cancelled {
                    info!(stream, exit_code = code, "push process ended for shutdown");
                } else if code == 0 {
                    info!(stream, "push process exited cleanly, restarting anyway");
                } else {
                    let tail = match stderr {
                        Some(stderr) => stderr.finish(STDERR_DRAIN).await,
                        None => String::new(),
                    };
                    let err = Error::ProcessExit { index: stream, code };
                    warn!(
                        stream,
                        error = %err,
                        stderr = %last_chars(&tail, STDERR_LOG_LIMIT),
                        restart_in_ms = self.restart_delay.as_millis() as u64,
                        "push process failed"
                    );
                }
                Some(code)
            }
            Err(e) => {
                error!(stream, error = %e, "failed to wait for push process");
                None
            }
        };

        self.state.last_exit = Some(ExitInfo { code, cancelled });
        self.state.phase = Phase::Exited;
    }

    async fn back_off(&mut self) {
        let cancelled = tokio::select! {
            _ = sleep(self.restart_delay) => false,
            _ = self.ctx.cancelled() => true,
        };
        if cancelled {
            self.stop(StopReason::Shutdown);
        } else {
            self.state.phase = Phase::Starting;
        }
    }
}


/// Rolling window over the last [`STDERR_TAIL_BYTES`] a process wrote to stderr.
/// Dropping it stops the reader.
struct StderrTail {
    bytes: Arc<Mutex<VecDeque<u8>>>,
    reader: JoinHandle<()>,
}

impl StderrTail {
    fn capture(pipe: ChildStderr) -> Self {
        let bytes = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_BYTES)));
        let reader = tokio::spawn(read_tail(pipe, bytes.clone()));
        Self { bytes, reader }
    }

    /// Lets the reader catch up for at most `drain`, then returns what was kept.
    async fn finish(mut self, drain: Duration) -> String {
        let _ = timeout(drain, &mut self.reader).await;
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(bytes.make_contiguous()).into_owned()
    }
}

impl Drop for StderrTail {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_tail(mut pipe: ChildStderr, bytes: Arc<Mutex<VecDeque<u8>>>) {
    let mut chunk = [0u8; 1024];
    // EOF or a read error both end the capture.
    while let Ok(n @ 1..) = pipe.read(&mut chunk).await {
        let mut tail = bytes.lock().unwrap_or_else(PoisonError::into_inner);
        tail.extend(&chunk[..n]);
        let excess = tail.len().saturating_sub(STDERR_TAIL_BYTES);
        tail.drain(..excess);
    }
}

/// The last `limit` characters of `text`, surrounding whitespace ignored.
fn last_chars(text: &str, limit: usize) -> &str {
    let text = text.trim();
    match limit.checked_sub(1).and_then(|n| text.char_indices().rev().nth(n)) {
        Some((start, _)) => &text[start..],
        None if limit == 0 => "",
        None => text,
    }
}
