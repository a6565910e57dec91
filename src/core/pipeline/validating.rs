use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    core::{
        domain::CommandLine,
        traits::process::{ProcessError, ProcessRunner, Sink},
    },
    error::{Error, Result},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Identical,
    Different { command: CommandLine },
    TimedOut { command: CommandLine },
}

/// Byte-exact comparison of a candidate artifact against the reference one,
/// delegated to an external `diff`-like program.
#[derive(Debug, Clone)]
pub struct Validator {
    runner: Arc<dyn ProcessRunner>,
    compare_program: String,
    reference: PathBuf,
    timeout: Duration,
}

impl Validator {
    pub fn new<T: AsRef<Path>>(
        runner: Arc<dyn ProcessRunner>,
        compare_program: &str,
        reference: T,
        timeout: Duration,
    ) -> Self {
        Validator {
            runner,
            compare_program: compare_program.to_string(),
            reference: reference.as_ref().into(),
            timeout,
        }
    }

    pub fn reference(&self) -> &Path {
        &self.reference
    }

    fn command(&self, candidate: &Path) -> CommandLine {
        CommandLine::new(
            &self.compare_program,
            [
                self.reference.to_string_lossy().to_string(),
                candidate.to_string_lossy().to_string(),
            ],
        )
    }

    /// Any nonzero exit of the compare program counts as a difference.
    pub async fn compare(&self, candidate: &Path, cwd: &Path) -> Result<Comparison> {
        let command = self.command(candidate);

        match self
            .runner
            .run(&command, cwd, Sink::Null, Sink::Null, Some(self.timeout))
            .await
        {
            Ok(0) => Ok(Comparison::Identical),
            Ok(status) => {
                tracing::debug!("Compare exited with {}", status);
                Ok(Comparison::Different { command })
            }
            Err(ProcessError::Timeout(_)) => Ok(Comparison::TimedOut { command }),
            Err(ProcessError::Launch { program, msg }) => Err(Error::Launch { program, msg }),
        }
    }
}
