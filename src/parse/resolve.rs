use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::parse::parse::{load_file, parse_entries, Format};

pub const DEFAULT_SOURCE: &str = "/data/video.mp4";
pub const DEFAULT_DESTINATION: &str = "rtsp://mediamtx:8554/stream";
pub const STREAMS_ENV: &str = "STREAMS_JSON";

/// One resolved (source, destination) pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    index: usize,
    source: PathBuf,
    destination: String,
}

impl StreamSpec {
    pub fn new(index: usize, source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            index,
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl fmt::Display for StreamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} -> {}", self.index, self.source.display(), self.destination)
    }
}

/// Raw configuration inputs, one field per precedence tier.
#[derive(Debug, Default, Clone)]
pub struct StreamInputs {
    /// Tier 1: multi-stream config file.
    pub config: Option<PathBuf>,
    /// Tier 2: multi-stream JSON payload (normally `STREAMS_JSON`).
    pub streams_json: Option<String>,
    /// Tier 3: repeated `source,destination` declarations.
    pub streams: Vec<String>,
    /// Tier 4: implicit single pair.
    pub source: Option<String>,
    pub destination: Option<String>,
}



/*
    @@@
    @resolve();
    . Consults exactly one tier: config file, then env payload, then --stream declarations, then the implicit pair.
    . A lower tier is ignored entirely as soon as a higher one has input, even if the higher one then fails to parse.
    . Numbers the resulting streams 0..N in declaration order.
*/
pub fn resolve(inputs: &StreamInputs) -> Result<Vec<StreamSpec>> {
    let pairs: Vec<(String, String)> = if let Some(path) = &inputs.config {
        load_file(path)?
            .into_iter()
            .map(|entry| (entry.source, entry.destination))
            .collect()
    } else if let Some(raw) = non_blank(inputs.streams_json.as_deref()) {
        parse_entries(raw, Format::Json, STREAMS_ENV)?
            .into_iter()
            .map(|entry| (entry.source, entry.destination))
            .collect()
    } else if !inputs.streams.is_empty() {
        inputs
            .streams
            .iter()
            .map(String::as_str)
            .map(parse_declaration)
            .collect::<Result<_>>()?
    } else {
        let source = non_blank(inputs.source.as_deref()).unwrap_or(DEFAULT_SOURCE);
        let destination = non_blank(inputs.destination.as_deref()).unwrap_or(DEFAULT_DESTINATION);
        vec![(source.to_string(), destination.to_string())]
    };

    Ok(pairs
        .into_iter()
        .enumerate()
        .map(|(index, (source, destination))| StreamSpec::new(index, source, destination))
        .collect())
}

/// Splits `source,destination` on the first comma; both halves must be non-empty.
pub fn parse_declaration(decl: &str) -> Result<(String, String)> {
    let (source, destination) = decl
        .split_once(',')
        .map(|(s, d)| (s.trim(), d.trim()))
        .filter(|(s, d)| !s.is_empty() && !d.is_empty())
        .ok_or_else(|| {
            Error::config(format!("--stream expects SOURCE,DESTINATION, got `{decl}`"))
        })?;
    Ok((source.to_string(), destination.to_string()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
