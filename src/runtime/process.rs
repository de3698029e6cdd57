use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::parse::StreamSpec;

/// Builds the command that pushes one stream.
///
/// The worker owns stdio and process-group setup, so implementations only
/// describe the program and its arguments.
pub trait Launcher: Send + Sync + 'static {
    fn command(&self, spec: &StreamSpec) -> Command;
}

impl<F> Launcher for F
where
    F: Fn(&StreamSpec) -> Command + Send + Sync + 'static,
{
    fn command(&self, spec: &StreamSpec) -> Command {
        self(spec)
    }
}

/// Loops the source forever, copies streams without transcoding and
/// publishes over RTSP/TCP.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    binary: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn args(spec: &StreamSpec) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-re", "-stream_loop", "-1", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(spec.source().as_os_str().to_owned());
        args.extend(
            ["-c", "copy", "-f", "rtsp", "-rtsp_transport", "tcp"]
                .into_iter()
                .map(OsString::from),
        );
        args.push(OsString::from(spec.destination()));
        args
    }
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Launcher for FfmpegLauncher {
    fn command(&self, spec: &StreamSpec) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(Self::args(spec));
        cmd
    }
}



/*
    @@@
    @spawn_child();
    . Starts the push process in its own process group so terminal signals only reach the supervisor.
    . stdin and stdout go to /dev/null, stderr is piped so it can be logged on failure.
    . The child is killed if the owning worker is dropped mid-wait.
*/
pub(crate) fn spawn_child(launcher: &dyn Launcher, spec: &StreamSpec) -> std::io::Result<Child> {
    let mut cmd = launcher.command(spec);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    cmd.spawn()
}

/// Maps a wait status to a shell-style code: signal deaths become `128 + signo`.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}



/// Shared view of one live push process.
///
/// The worker keeps the `Child` itself; the registry and the shutdown path
/// only ever see this handle, identified by allocation (`Arc::ptr_eq`).
#[derive(Debug)]
pub struct ProcessHandle {
    stream: usize,
    pid: Pid,
    exited: watch::Sender<bool>,
    terminating: AtomicBool,
}

impl ProcessHandle {
    pub fn new(stream: usize, pid: u32) -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            stream,
            pid: Pid::from_raw(pid as i32),
            exited,
            terminating: AtomicBool::new(false),
        }
    }

    pub fn stream(&self) -> usize {
        self.stream
    }

    /// Also the process-group id, since children lead their own group.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.send_replace(true);
    }

    /// Resolves once the owning worker has reaped the process.
    pub async fn wait_exited(&self) {
        let mut rx = self.exited.subscribe();
        // Err means the sender is gone, which only happens with the handle itself.
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// True for the first caller only; later callers must not signal again.
    pub(crate) fn claim_termination(&self) -> bool {
        !self.terminating.swap(true, Ordering::AcqRel)
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }
}
