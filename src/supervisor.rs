use crate::control::{broadcast_shutdown, Termination};
use crate::error::{Error, Result};
use crate::parse::StreamSpec;
use crate::runtime::{
    Launcher, SupervisorContext, Worker, WorkerState, DEFAULT_GRACE_PERIOD, DEFAULT_RESTART_DELAY,
};
use futures::future::join_all;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Pause between a push process exiting and the next launch.
    pub restart_delay: Duration,
    /// How long a push process gets after SIGTERM before SIGKILL.
    pub grace_period: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            restart_delay: DEFAULT_RESTART_DELAY,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Final state of every worker once the supervisor has drained.
#[derive(Debug)]
pub struct RunReport {
    pub workers: Vec<WorkerState>,
    pub shutdown_requested: bool,
}

pub struct Supervisor {
    specs: Vec<StreamSpec>,
    launcher: Arc<dyn Launcher>,
    restart_delay: Duration,
    ctx: SupervisorContext,
}



/*
    @@@
    @preflight();
    . Fails on the first declared source that is not an existing regular file.
    . Runs before any worker exists, so a bad config never leaves a partial set of streams running.
*/
pub fn preflight(specs: &[StreamSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(Error::Config("no streams to supervise".into()));
    }
    for spec in specs {
        if !spec.source().is_file() {
            return Err(Error::SourceMissing {
                index: spec.index(),
                path: spec.source().to_path_buf(),
            });
        }
    }
    Ok(())
}

impl Supervisor {
    pub fn new(specs: Vec<StreamSpec>, launcher: impl Launcher, settings: Settings) -> Self {
        Self {
            specs,
            launcher: Arc::new(launcher),
            restart_delay: settings.restart_delay,
            ctx: SupervisorContext::new(settings.grace_period),
        }
    }

    pub fn specs(&self) -> &[StreamSpec] {
        &self.specs
    }

    /// Handle for requesting shutdown from outside, the same way a signal does.
    pub fn context(&self) -> SupervisorContext {
        self.ctx.clone()
    }

    /// Runs every stream until SIGINT or SIGTERM, then drains.
    pub async fn run(self) -> Result<RunReport> {
        preflight(&self.specs)?;

        let signals = Signals::new([SIGINT, SIGTERM]).map_err(Error::Signal)?;
        let signal_handle = signals.handle();
        let listener = tokio::spawn(listen_for_signals(signals, self.ctx.clone()));

        let report = self.supervise().await;

        signal_handle.close();
        if let Err(e) = listener.await {
            warn!(error = %e, "signal listener ended abnormally");
        }
        Ok(report)
    }

    /// Like [`Supervisor::run`] but without signal handlers; shutdown comes
    /// only through [`SupervisorContext::request_shutdown`].
    pub async fn run_until_drained(self) -> Result<RunReport> {
        preflight(&self.specs)?;
        Ok(self.supervise().await)
    }



    /*
        @@@
        @supervise();
        . Spawns one worker task per stream, all sharing the same context.
        . A separate task waits for the shutdown flag and runs the termination broadcast, never the signal listener itself.
        . Returns only once every worker task has returned.
    */
    async fn supervise(self) -> RunReport {
        let Supervisor {
            specs,
            launcher,
            restart_delay,
            ctx,
        } = self;

        info!(streams = specs.len(), "starting streams (Ctrl+C to stop)");
        for spec in &specs {
            info!("  {spec}");
        }

        let workers: Vec<_> = specs
            .into_iter()
            .map(|spec| {
                let worker = Worker::new(spec, ctx.clone(), launcher.clone(), restart_delay);
                tokio::spawn(worker.run())
            })
            .collect();

        let broadcaster = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.cancelled().await;
                broadcast_shutdown(ctx.registry(), ctx.grace_period()).await
            })
        };

        let mut states = Vec::with_capacity(workers.len());
        for (stream, joined) in join_all(workers).await.into_iter().enumerate() {
            match joined {
                Ok(state) => states.push(state),
                Err(e) => error!(stream, error = %e, "worker task failed"),
            }
        }

        let shutdown_requested = ctx.is_cancelled();
        if shutdown_requested {
            match broadcaster.await {
                Ok(outcomes) => {
                    let forced = outcomes
                        .iter()
                        .filter(|(_, outcome)| *outcome == Termination::Forced)
                        .count();
                    info!(terminated = outcomes.len(), forced, "all streams drained");
                }
                Err(e) => error!(error = %e, "shutdown broadcast failed"),
            }
        } else {
            broadcaster.abort();
            warn!("every worker stopped without a shutdown request");
        }

        RunReport {
            workers: states,
            shutdown_requested,
        }
    }
}

async fn listen_for_signals(mut signals: Signals, ctx: SupervisorContext) {
    while let Some(signal) = signals.next().await {
        let name = match signal {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            _ => "unknown",
        };
        if ctx.request_shutdown() {
            info!(signal = name, "termination requested, draining streams");
        } else {
            info!(signal = name, "shutdown already in progress");
        }
    }
}
