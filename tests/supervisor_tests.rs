mod common;

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{sh, sh_per_stream, source_file, wait_for, within, STUBBORN};
use nix::sys::signal::{signal, SigHandler, Signal};
use streamvisor::control::{terminate, Termination};
use streamvisor::runtime::{Phase, StopReason, Worker};
use streamvisor::{resolve, Error, Settings, StreamInputs, StreamSpec, Supervisor, SupervisorContext};
use tokio::process::Command;

fn settings(restart_ms: u64, grace_ms: u64) -> Settings {
    Settings {
        restart_delay: Duration::from_millis(restart_ms),
        grace_period: Duration::from_millis(grace_ms),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_worker_per_configured_stream() {
    let sources = [source_file(), source_file(), source_file()];
    let mut config = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    let entries: Vec<String> = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!(r#"{{"source": "{}", "url": "rtsp://h/{i}"}}"#, s.path().display()))
        .collect();
    write!(config, "[{}]", entries.join(",")).unwrap();

    let specs = resolve(&StreamInputs {
        config: Some(config.path().to_path_buf()),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(specs.iter().map(StreamSpec::index).collect::<Vec<_>>(), vec![0, 1, 2]);

    let supervisor = Supervisor::new(specs, sh("exec sleep 30"), settings(50, 2000));
    let ctx = supervisor.context();
    let run = tokio::spawn(supervisor.run_until_drained());

    wait_for("three live processes", || ctx.registry().len() == 3).await;
    let live: Vec<usize> = ctx.registry().snapshot_all().into_iter().map(|(i, _)| i).collect();
    assert_eq!(live, vec![0, 1, 2]);

    assert!(ctx.request_shutdown());
    let report = within(Duration::from_secs(5), run).await.unwrap().unwrap();

    assert!(report.shutdown_requested);
    let mut streams: Vec<usize> = report.workers.iter().map(|w| w.stream).collect();
    streams.sort_unstable();
    assert_eq!(streams, vec![0, 1, 2]);
    for worker in &report.workers {
        assert_eq!(worker.phase, Phase::Stopped);
        assert_eq!(worker.launches, 1);
        let exit = worker.last_exit.unwrap();
        assert!(exit.cancelled);
        assert_eq!(exit.code, Some(128 + 15));
    }
    assert!(ctx.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crashing_stream_restarts_until_shutdown() {
    let source = source_file();
    let specs = vec![StreamSpec::new(0, source.path(), "rtsp://h/a")];
    let supervisor = Supervisor::new(specs, sh("exit 137"), settings(20, 1000));
    let ctx = supervisor.context();
    let run = tokio::spawn(supervisor.run_until_drained());

    let sampler = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut max_live = 0;
            while !ctx.is_cancelled() {
                max_live = max_live.max(ctx.registry().len());
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            max_live
        })
    };

    tokio::time::sleep(Duration::from_millis(400)).await;
    ctx.request_shutdown();
    let report = within(Duration::from_secs(5), run).await.unwrap().unwrap();

    // A second registration for the same stream would have panicked the worker.
    assert_eq!(report.workers.len(), 1);
    let worker = &report.workers[0];
    assert!(worker.launches >= 3, "only {} launches", worker.launches);
    assert_eq!(worker.stop_reason, Some(StopReason::Shutdown));
    assert!(sampler.await.unwrap() <= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_skips_pending_restart() {
    let a = source_file();
    let b = source_file();
    let specs = vec![
        StreamSpec::new(0, a.path(), "rtsp://h/a"),
        StreamSpec::new(1, b.path(), "rtsp://h/b"),
    ];
    let launcher = sh_per_stream(vec!["exit 1", "exec sleep 30"]);
    let supervisor = Supervisor::new(specs, launcher, settings(1000, 2000));
    let ctx = supervisor.context();
    let run = tokio::spawn(supervisor.run_until_drained());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(ctx.request_shutdown());
    let report = within(Duration::from_secs(2), run).await.unwrap().unwrap();

    let mut workers = report.workers;
    workers.sort_by_key(|w| w.stream);

    assert_eq!(workers[0].launches, 1, "stream 0 relaunched after shutdown");
    assert_eq!(workers[0].last_exit.unwrap().code, Some(1));
    assert!(!workers[0].last_exit.unwrap().cancelled);

    assert_eq!(workers[1].launches, 1);
    assert!(workers[1].last_exit.unwrap().cancelled);

    for worker in &workers {
        assert_eq!(worker.phase, Phase::Stopped);
        assert_eq!(worker.stop_reason, Some(StopReason::Shutdown));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stuck_process_is_killed_after_grace_period() {
    let source = source_file();
    let grace = Duration::from_millis(300);
    let specs = vec![StreamSpec::new(0, source.path(), "rtsp://h/a")];
    let supervisor = Supervisor::new(specs, sh(STUBBORN), settings(50, 300));
    let ctx = supervisor.context();
    let run = tokio::spawn(supervisor.run_until_drained());

    wait_for("stubborn process", || ctx.registry().len() == 1).await;
    // give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = Instant::now();
    ctx.request_shutdown();
    let report = within(Duration::from_secs(5), run).await.unwrap().unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= grace, "killed before the grace period: {elapsed:?}");
    assert!(elapsed < grace + Duration::from_millis(1500), "teardown took {elapsed:?}");
    let exit = report.workers[0].last_exit.unwrap();
    assert_eq!(exit.code, Some(128 + 9));
    assert!(exit.cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_escalates_once() {
    let source = source_file();
    let ctx = SupervisorContext::new(Duration::from_millis(200));
    let spec = StreamSpec::new(0, source.path(), "rtsp://h/a");
    let worker = Worker::new(spec, ctx.clone(), Arc::new(sh(STUBBORN)), Duration::from_millis(50));
    let task = tokio::spawn(worker.run());

    wait_for("stubborn process", || ctx.registry().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    let handle = ctx.registry().get(0).unwrap();

    // Flag first so the worker does not relaunch after the kill.
    ctx.request_shutdown();
    assert_eq!(terminate(&handle, ctx.grace_period()).await, Termination::Forced);
    assert_eq!(terminate(&handle, ctx.grace_period()).await, Termination::AlreadyClaimed);
    assert!(handle.has_exited());

    let state = within(Duration::from_secs(2), task).await.unwrap();
    assert_eq!(state.launches, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn launch_racing_shutdown_is_terminated_by_its_worker() {
    let source = source_file();
    let grace = Duration::from_millis(300);
    let ctx = SupervisorContext::new(grace);

    // Shutdown lands while the process is being launched, after any broadcast
    // could have seen it. SIGTERM is ignored from exec on, so only SIGKILL works.
    let launcher = {
        let ctx = ctx.clone();
        move |_: &StreamSpec| {
            ctx.request_shutdown();
            let mut cmd = Command::new("/bin/sh");
            cmd.args(["-c", STUBBORN]);
            unsafe {
                cmd.pre_exec(|| {
                    signal(Signal::SIGTERM, SigHandler::SigIgn)
                        .map(drop)
                        .map_err(std::io::Error::from)
                });
            }
            cmd
        }
    };
    let spec = StreamSpec::new(0, source.path(), "rtsp://h/a");
    let worker = Worker::new(spec, ctx.clone(), Arc::new(launcher), Duration::from_millis(50));

    let started = Instant::now();
    let state = within(grace + Duration::from_millis(1500), worker.run()).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= grace, "killed before the grace period: {elapsed:?}");
    assert_eq!(state.phase, Phase::Stopped);
    assert_eq!(state.stop_reason, Some(StopReason::Shutdown));
    assert_eq!(state.launches, 1);
    let exit = state.last_exit.unwrap();
    assert_eq!(exit.code, Some(128 + 9));
    assert!(exit.cancelled);
    assert!(ctx.registry().is_empty());
}

#[tokio::test]
async fn missing_source_fails_before_any_launch() {
    let launches = Arc::new(AtomicUsize::new(0));
    let counter = launches.clone();
    let launcher = move |_: &StreamSpec| {
        counter.fetch_add(1, Ordering::SeqCst);
        Command::new("/bin/true")
    };

    let present = source_file();
    let specs = resolve(&StreamInputs {
        streams: vec![
            format!("{},rtsp://h/a", present.path().display()),
            "/nonexistent,rtsp://h/b".to_string(),
        ],
        ..Default::default()
    })
    .unwrap();

    let supervisor = Supervisor::new(specs, launcher, Settings::default());
    match supervisor.run_until_drained().await {
        Err(Error::SourceMissing { index, path }) => {
            assert_eq!(index, 1);
            assert_eq!(path, std::path::Path::new("/nonexistent"));
        }
        other => panic!("expected SourceMissing, got {other:?}"),
    }
    assert_eq!(launches.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn source_removed_at_runtime_stops_only_that_stream() {
    let doomed = source_file();
    let kept = source_file();
    let specs = vec![
        StreamSpec::new(0, doomed.path(), "rtsp://h/a"),
        StreamSpec::new(1, kept.path(), "rtsp://h/b"),
    ];
    let launcher = sh_per_stream(vec!["exit 1", "exec sleep 30"]);
    let supervisor = Supervisor::new(specs, launcher, settings(100, 1000));
    let ctx = supervisor.context();
    let run = tokio::spawn(supervisor.run_until_drained());

    wait_for("stream 1 live", || ctx.registry().get(1).is_some()).await;
    doomed.close().unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(ctx.registry().get(1).is_some(), "healthy stream was disturbed");

    ctx.request_shutdown();
    let mut workers = within(Duration::from_secs(3), run).await.unwrap().unwrap().workers;
    workers.sort_by_key(|w| w.stream);
    assert_eq!(workers[0].stop_reason, Some(StopReason::SourceMissing));
    assert_eq!(workers[1].stop_reason, Some(StopReason::Shutdown));
}
