#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use streamvisor::{Launcher, StreamSpec};
use tempfile::NamedTempFile;
use tokio::process::Command;

/// Every stream runs the same shell script in place of ffmpeg.
pub fn sh(script: &'static str) -> impl Launcher {
    move |_: &StreamSpec| {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", script]);
        cmd
    }
}

/// Stream `i` runs `scripts[i]`.
pub fn sh_per_stream(scripts: Vec<&'static str>) -> impl Launcher {
    move |spec: &StreamSpec| {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", scripts[spec.index()]]);
        cmd
    }
}

/// Ignores SIGTERM (and so does every child it forks) until SIGKILL.
pub const STUBBORN: &str = "trap '' TERM; while :; do sleep 0.05; done";

pub fn source_file() -> NamedTempFile {
    NamedTempFile::new().unwrap()
}

pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| panic!("did not finish within {limit:?}"))
}
