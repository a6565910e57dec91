use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure failures. These abort a batch; per-submission failures are
/// expressed as `Outcome` instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to launch `{program}`: {msg}")]
    Launch { program: String, msg: String },
    #[error("io error")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid config file")]
    ConfigFormat(#[from] serde_json::Error),
    #[error("cannot enumerate submissions in {path}")]
    Collection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("worker failed: {0}")]
    Worker(String),
}
