use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::core::{
    domain::CommandLine,
    traits::process::{ProcessError, ProcessRunner, Sink},
};

/// What a scripted command does when it is "run".
#[derive(Clone, Debug)]
pub enum Step {
    Exit(i32),
    /// Never finishes on its own; ends with a timeout when one is given.
    Hang,
    Launch,
    Panic,
}

type Script = dyn Fn(&CommandLine, &Path) -> Step + Send + Sync;

/// Runner that decides each command's fate with a closure instead of
/// spawning anything. Echoes every command line into a file stdout sink and
/// remembers every call.
#[derive(Clone)]
pub struct ScriptedRunner {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<(CommandLine, PathBuf)>>>,
}

impl ScriptedRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&CommandLine, &Path) -> Step + Send + Sync + 'static,
    {
        ScriptedRunner {
            script: Arc::new(script),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(CommandLine, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandLine,
        cwd: &Path,
        stdout: Sink,
        _stderr: Sink,
        timeout: Option<Duration>,
    ) -> Result<i32, ProcessError> {
        self.calls
            .lock()
            .unwrap()
            .push((command.clone(), cwd.to_path_buf()));

        let step = (self.script)(command, cwd);

        match step {
            Step::Exit(status) => {
                if let Sink::File(mut file) = stdout {
                    writeln!(file, "{}", command).unwrap();
                }
                Ok(status)
            }
            Step::Hang => match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    Err(ProcessError::Timeout(limit))
                }
                None => std::future::pending().await,
            },
            Step::Launch => Err(ProcessError::Launch {
                program: command.program.clone(),
                msg: "No such file or directory".to_string(),
            }),
            Step::Panic => panic!("scripted panic for {}", command),
        }
    }
}
