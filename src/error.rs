use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while resolving, starting or running streams.
///
/// `Config` and `SourceMissing` raised before the first worker starts are
/// fatal for the whole process. Once workers run, errors are scoped to a
/// single stream and only ever logged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("stream {index}: source not found: {}", path.display())]
    SourceMissing { index: usize, path: PathBuf },

    #[error("stream {index}: failed to launch push process: {source}")]
    ProcessLaunch {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("stream {index}: push process exited with code {code}")]
    ProcessExit { index: usize, code: i32 },

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
