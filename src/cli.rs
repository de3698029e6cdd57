use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::parse::StreamInputs;
use crate::supervisor::Settings;

/// Loop local media files to RTSP endpoints, one supervised ffmpeg per stream.
#[derive(Debug, Parser)]
#[command(name = "streamvisor", version, about)]
pub struct Args {
    /// Multi-stream config file: a JSON (or .yaml/.yml) list of {source, destination}.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// One stream as SOURCE,DESTINATION. Repeat for more streams.
    #[arg(long = "stream", value_name = "SOURCE,DESTINATION")]
    pub streams: Vec<String>,

    /// Multi-stream JSON payload, same shape as --config.
    #[arg(long, env = "STREAMS_JSON", hide_env_values = true, value_name = "JSON")]
    pub streams_json: Option<String>,

    /// Single-stream source file.
    #[arg(long, visible_alias = "video", env = "VIDEO_PATH", value_name = "PATH")]
    pub source: Option<String>,

    /// Single-stream publish URL.
    #[arg(long, visible_alias = "url", env = "RTSP_PUBLISH_URL", value_name = "URL")]
    pub destination: Option<String>,

    /// Seconds to wait before relaunching a stream whose process exited.
    #[arg(long, value_name = "SECONDS", default_value = "5.0", value_parser = parse_seconds)]
    pub restart_delay: Duration,

    /// Seconds a process gets after SIGTERM before it is killed.
    #[arg(long, value_name = "SECONDS", default_value = "5.0", value_parser = parse_seconds)]
    pub grace_period: Duration,

    /// ffmpeg binary used to push streams.
    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg", value_name = "BIN")]
    pub ffmpeg: PathBuf,

    /// Also write daily-rotated log files into this directory.
    #[arg(long, env = "STREAMVISOR_LOG_DIR", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    pub fn inputs(&self) -> StreamInputs {
        StreamInputs {
            config: self.config.clone(),
            streams_json: self.streams_json.clone(),
            streams: self.streams.clone(),
            source: self.source.clone(),
            destination: self.destination.clone(),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings {
            restart_delay: self.restart_delay,
            grace_period: self.grace_period,
        }
    }
}

/// Non-negative, finite, fractional seconds.
fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("`{raw}` is not a number: {e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("`{raw}` is not a valid duration"))
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_accept_fractions() {
        assert_eq!(parse_seconds("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn repeated_streams_and_aliases() {
        let args = Args::try_parse_from([
            "streamvisor",
            "--stream",
            "a.mp4,rtsp://h/a",
            "--stream",
            "b.mp4,rtsp://h/b",
            "--video",
            "/data/v.mp4",
            "--restart-delay",
            "0.25",
        ])
        .unwrap();
        assert_eq!(args.streams.len(), 2);
        assert_eq!(args.source.as_deref(), Some("/data/v.mp4"));
        assert_eq!(args.settings().restart_delay, Duration::from_millis(250));

        let inputs = args.inputs();
        assert_eq!(inputs.streams, args.streams);
        assert!(inputs.config.is_none());
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["streamvisor", "--config", "streams.json"]).unwrap();
        assert_eq!(args.settings(), Settings::default());
        assert_eq!(args.config, Some(PathBuf::from("streams.json")));
    }
}
