use std::{
    fs::File,
    io,
    path::Path,
    process::Stdio,
    time::Duration,
};

use crate::core::domain::CommandLine;

/// Where a child's stdout or stderr goes. Never the caller's own streams, so
/// concurrent workers cannot interleave on the console.
#[derive(Debug)]
pub enum Sink {
    Null,
    File(File),
}

impl Sink {
    /// Creates or truncates the file at `path`.
    pub async fn create<T: AsRef<Path>>(path: T) -> io::Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Sink::File(file.into_std().await))
    }

    /// Another handle on the same destination; writes through either handle
    /// land in one stream, in order.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Sink::Null => Ok(Sink::Null),
            Sink::File(file) => Ok(Sink::File(file.try_clone()?)),
        }
    }
}

impl From<Sink> for Stdio {
    fn from(sink: Sink) -> Self {
        match sink {
            Sink::Null => Stdio::null(),
            Sink::File(file) => Stdio::from(file),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The wall-clock limit elapsed; the child has been killed and reaped.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to launch `{program}`: {msg}")]
    Launch { program: String, msg: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessRunner: std::fmt::Debug + Send + Sync {
    /// Runs `command` in `cwd` to completion and returns its exit code.
    /// A process killed by a signal reports `-1`.
    async fn run(
        &self,
        command: &CommandLine,
        cwd: &Path,
        stdout: Sink,
        stderr: Sink,
        timeout: Option<Duration>,
    ) -> Result<i32, ProcessError>;
}
