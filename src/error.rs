use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid profiler configuration: {0}")]
    Config(#[source] serde_json::Error),

    #[error("failed to render chart {}: {message}", path.display())]
    Render { path: PathBuf, message: String },

    #[error("host no longer exposes tracked attribute '{label}'")]
    MissingAttribute { label: String },

    #[error("the profiler has already reported; no further samples are accepted")]
    AlreadyReported,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
