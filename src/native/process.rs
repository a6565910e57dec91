use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use nix::{
    sys::signal::{Signal, killpg},
    unistd::Pid,
};
use tokio::{process::Command, time::timeout};

use crate::core::{
    domain::CommandLine,
    traits::process::{ProcessError, ProcessRunner, Sink},
};

#[derive(Clone, Debug, Default)]
pub struct NativeProcessRunner;

impl NativeProcessRunner {
    pub fn new() -> Self {
        NativeProcessRunner
    }
}

/// `./prog` style programs are resolved against the child's working
/// directory rather than ours.
fn resolve_program(cwd: &Path, program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path)
    } else {
        path.into()
    }
}

#[async_trait::async_trait]
impl ProcessRunner for NativeProcessRunner {
    #[tracing::instrument(skip(self, stdout, stderr), fields(command = %command))]
    async fn run(
        &self,
        command: &CommandLine,
        cwd: &Path,
        stdout: Sink,
        stderr: Sink,
        limit: Option<Duration>,
    ) -> Result<i32, ProcessError> {
        let launch_err = |e: std::io::Error| ProcessError::Launch {
            program: command.program.clone(),
            msg: e.to_string(),
        };

        let mut child = Command::new(resolve_program(cwd, &command.program))
            .args(&command.args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .process_group(0)
            .spawn()
            .map_err(launch_err)?;
        // The child leads its own group, so its pid is the group id.
        let group = child.id().map(|pid| Pid::from_raw(pid as i32));

        let status = match limit {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    tracing::debug!("Killing process group after {:?}", limit);
                    // Whatever the child forked still holds the sinks.
                    if let Some(group) = group {
                        if let Err(e) = killpg(group, Signal::SIGKILL) {
                            tracing::warn!("Failed to kill process group {}: {}", group, e);
                        }
                    }
                    // kill() also reaps the child
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill timed out process: {}", e);
                    }
                    return Err(ProcessError::Timeout(limit));
                }
            },
            None => child.wait().await,
        };

        let status = status.map_err(launch_err)?;
        tracing::debug!("Process exited: {:?}", status);

        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, time::Instant};

    use uuid::Uuid;

    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("batch_marker_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("Failed to create scratch dir");
        dir
    }

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_exit_codes_are_reported() {
        let dir = scratch_dir();
        let runner = NativeProcessRunner::new();

        let ok = runner
            .run(&sh("exit 0"), &dir, Sink::Null, Sink::Null, None)
            .await;
        let failed = runner
            .run(&sh("exit 3"), &dir, Sink::Null, Sink::Null, None)
            .await;

        assert_eq!(ok, Ok(0));
        assert_eq!(failed, Ok(3));
    }

    #[tokio::test]
    async fn test_signal_death_is_negative() {
        let dir = scratch_dir();
        let runner = NativeProcessRunner::new();

        let result = runner
            .run(&sh("kill -9 $$"), &dir, Sink::Null, Sink::Null, None)
            .await;

        assert_eq!(result, Ok(-1));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = scratch_dir();
        let runner = NativeProcessRunner::new();
        let limit = Duration::from_millis(200);

        let start = Instant::now();
        let result = runner
            .run(&sh("sleep 10"), &dir, Sink::Null, Sink::Null, Some(limit))
            .await;

        assert_eq!(result, Err(ProcessError::Timeout(limit)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let dir = scratch_dir();
        let out = dir.join("out.txt");
        let runner = NativeProcessRunner::new();
        let limit = Duration::from_millis(200);

        let result = runner
            .run(
                &sh("(sleep 1; echo late) & sleep 30"),
                &dir,
                Sink::create(&out).await.unwrap(),
                Sink::Null,
                Some(limit),
            )
            .await;
        assert_eq!(result, Err(ProcessError::Timeout(limit)));

        tokio::time::sleep(Duration::from_millis(1800)).await;
        assert_eq!(fs::read_to_string(&out).unwrap(), "");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let dir = scratch_dir();
        let runner = NativeProcessRunner::new();

        let result = runner
            .run(
                &CommandLine::new("/aboba/not-a-program", Vec::<String>::new()),
                &dir,
                Sink::Null,
                Sink::Null,
                None,
            )
            .await;

        assert!(matches!(result, Err(ProcessError::Launch { .. })));
    }

    #[tokio::test]
    async fn test_output_goes_to_sinks_in_cwd() {
        let dir = scratch_dir();
        let out = dir.join("out.txt");
        let err = dir.join("err.txt");
        let runner = NativeProcessRunner::new();

        let result = runner
            .run(
                &sh("pwd; echo oops >&2"),
                &dir,
                Sink::create(&out).await.unwrap(),
                Sink::create(&err).await.unwrap(),
                Some(Duration::from_secs(10)),
            )
            .await;

        assert_eq!(result, Ok(0));
        let stdout = fs::read_to_string(&out).unwrap();
        assert_eq!(
            Path::new(stdout.trim()).canonicalize().unwrap(),
            dir.canonicalize().unwrap()
        );
        assert_eq!(fs::read_to_string(&err).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn test_cloned_sinks_share_one_stream() {
        let dir = scratch_dir();
        let out = dir.join("stream.txt");
        let stream = Sink::create(&out).await.unwrap();
        let runner = NativeProcessRunner::new();

        for word in ["first", "second", "third"] {
            let result = runner
                .run(
                    &CommandLine::new("echo", [word]),
                    &dir,
                    stream.try_clone().unwrap(),
                    Sink::Null,
                    None,
                )
                .await;
            assert_eq!(result, Ok(0));
        }

        assert_eq!(fs::read_to_string(&out).unwrap(), "first\nsecond\nthird\n");
    }

    #[tokio::test]
    async fn test_relative_program_resolves_against_cwd() {
        let dir = scratch_dir();
        std::os::unix::fs::symlink("/bin/sh", dir.join("local-sh")).unwrap();
        let runner = NativeProcessRunner::new();

        let result = runner
            .run(
                &CommandLine::new("./local-sh", ["-c", "exit 7"]),
                &dir,
                Sink::Null,
                Sink::Null,
                None,
            )
            .await;

        assert_eq!(result, Ok(7));
    }
}
