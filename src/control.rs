use crate::runtime::{ProcessHandle, ProcessRegistry};
use futures::future::join_all;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// How long to wait for the reap after a SIGKILL before giving up on it.
const KILL_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Needed SIGKILL.
    Forced,
    /// Was already gone when we got to it.
    AlreadyExited,
    /// Someone else is terminating this process.
    AlreadyClaimed,
}



/*
    @@@
    @terminate();
    . Claims the handle so a process is only ever signalled by one caller.
    . Sends SIGTERM to the process group and waits up to `grace` for the worker to reap it.
    . Escalates to SIGKILL when the grace period runs out.
*/
pub async fn terminate(handle: &ProcessHandle, grace: Duration) -> Termination {
    if !handle.claim_termination() {
        return Termination::AlreadyClaimed;
    }
    if handle.has_exited() {
        return Termination::AlreadyExited;
    }

    let stream = handle.stream();
    let pid = handle.pid();

    // 1) Graceful stop
    info!(stream, pid = pid.as_raw(), "sending SIGTERM");
    match killpg(pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Termination::AlreadyExited,
        Err(e) => error!(stream, pid = pid.as_raw(), error = %e, "failed to send SIGTERM"),
    }

    // 2) Wait up to the grace period
    if timeout(grace, handle.wait_exited()).await.is_ok() {
        info!(stream, pid = pid.as_raw(), "push process stopped");
        return Termination::Graceful;
    }

    // 3) Force-kill
    warn!(
        stream,
        pid = pid.as_raw(),
        grace_ms = grace.as_millis() as u64,
        "push process ignored SIGTERM, sending SIGKILL"
    );
    match killpg(pid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => error!(stream, pid = pid.as_raw(), error = %e, "failed to send SIGKILL"),
    }
    if timeout(KILL_SETTLE, handle.wait_exited()).await.is_err() {
        error!(stream, pid = pid.as_raw(), "push process still not reaped after SIGKILL");
    }
    Termination::Forced
}



/*
    @@@
    @broadcast_shutdown();
    . Takes a copy of the registry so the lock is released before any signal is sent.
    . Runs terminate() for every live process concurrently; a stuck process never delays the others.
*/
pub async fn broadcast_shutdown(
    registry: &ProcessRegistry,
    grace: Duration,
) -> Vec<(usize, Termination)> {
    let live = registry.snapshot_all();
    info!(live = live.len(), "terminating push processes");

    join_all(live.into_iter().map(|(stream, handle): (usize, Arc<ProcessHandle>)| async move {
        (stream, terminate(&handle, grace).await)
    }))
    .await
}
