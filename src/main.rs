use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use streamvisor::cli::Args;
use streamvisor::{logger, resolve, FfmpegLauncher, Supervisor};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Keep the guard alive for the whole run or buffered file logs are lost.
    let _guard = match logger::logs_tracing(args.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("streamvisor: failed to initialise logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let specs = resolve(&args.inputs()).context("failed to resolve streams")?;

    let launcher = FfmpegLauncher::new(args.ffmpeg.clone());
    let supervisor = Supervisor::new(specs, launcher, args.settings());

    let report = supervisor.run().await.context("failed to start streams")?;
    if report.shutdown_requested {
        info!(streams = report.workers.len(), "shutdown complete");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("no stream left running");
        Ok(ExitCode::FAILURE)
    }
}
