use std::{fmt, ops::ControlFlow, sync::Arc};

use crate::{
    core::{
        domain::{BuildRule, Outcome, Submission},
        pipeline::{
            locating::ArtifactLocator,
            validating::{Comparison, Validator},
        },
        traits::process::{ProcessError, ProcessRunner, Sink},
    },
    error::{Error, Result},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    Building,
    BuildFailed,
    Built,
    Running,
    TimedOut,
    RunFailed,
    Ran,
    Validating,
    PathError,
    Mismatch,
    Validated,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::BuildFailed
                | PipelineState::TimedOut
                | PipelineState::RunFailed
                | PipelineState::PathError
                | PipelineState::Mismatch
                | PipelineState::Validated
        )
    }

    /// Terminal state an outcome was produced in.
    pub fn finished_with(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success => PipelineState::Validated,
            Outcome::CompileFailure { .. } => PipelineState::BuildFailed,
            Outcome::ExecutionFailure { .. } => PipelineState::RunFailed,
            Outcome::Timeout { .. } => PipelineState::TimedOut,
            Outcome::ArtifactPathError { .. } => PipelineState::PathError,
            Outcome::ArtifactMismatch { .. } => PipelineState::Mismatch,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type Stage = ControlFlow<Outcome>;

/// Build, run and validate one submission, stopping at the first failing
/// stage. Per-submission failures come back as `Ok(outcome)`; only broken
/// infrastructure is an `Err`.
#[derive(Debug, Clone)]
pub struct SubmissionPipeline {
    runner: Arc<dyn ProcessRunner>,
    rule: Arc<BuildRule>,
    locator: ArtifactLocator,
    validator: Validator,
}

impl SubmissionPipeline {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        rule: Arc<BuildRule>,
        locator: ArtifactLocator,
        validator: Validator,
    ) -> Self {
        SubmissionPipeline {
            runner,
            rule,
            locator,
            validator,
        }
    }

    #[tracing::instrument(skip(self, submission), fields(submission = %submission.label))]
    pub async fn process(&self, submission: &Submission) -> Result<Outcome> {
        transition(PipelineState::Pending, PipelineState::Building);
        if let ControlFlow::Break(outcome) = self.build(submission).await? {
            return Ok(finish(outcome));
        }

        transition(PipelineState::Built, PipelineState::Running);
        if let ControlFlow::Break(outcome) = self.execute(submission).await? {
            return Ok(finish(outcome));
        }

        transition(PipelineState::Ran, PipelineState::Validating);
        Ok(finish(self.validate(submission).await?))
    }

    async fn build(&self, submission: &Submission) -> Result<Stage> {
        // A missing previous build makes `clean` fail; that is expected.
        match self
            .runner
            .run(&self.rule.clean, &submission.root, Sink::Null, Sink::Null, None)
            .await
        {
            Ok(0) => {}
            Ok(status) => tracing::debug!("Clean exited with {}, ignored", status),
            Err(e) => tracing::warn!("Clean step failed, ignored: {}", e),
        }

        let build = self.rule.build.clone();
        let output_dir = self.rule.output_dir(submission);
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            tracing::error!("Cannot create {}: {}", output_dir.display(), e);
            return Ok(ControlFlow::Break(Outcome::CompileFailure { command: build }));
        }

        match self
            .runner
            .run(&build, &submission.root, Sink::Null, Sink::Null, None)
            .await
        {
            Ok(0) => Ok(ControlFlow::Continue(())),
            Ok(status) => {
                tracing::debug!("Build exited with {}", status);
                Ok(ControlFlow::Break(Outcome::CompileFailure { command: build }))
            }
            Err(ProcessError::Launch { program, msg }) => Err(Error::Launch { program, msg }),
            Err(ProcessError::Timeout(_)) => Ok(ControlFlow::Break(Outcome::Timeout {
                command: Some(build),
            })),
        }
    }

    async fn execute(&self, submission: &Submission) -> Result<Stage> {
        let run = self.rule.run.clone();
        let cwd = self.rule.output_dir(submission);

        let stage = match self
            .runner
            .run(&run, &cwd, Sink::Null, Sink::Null, Some(self.rule.run_timeout))
            .await
        {
            Ok(0) => ControlFlow::Continue(()),
            Ok(status) => ControlFlow::Break(Outcome::ExecutionFailure {
                command: Some(run),
                status: Some(status),
            }),
            Err(ProcessError::Timeout(limit)) => {
                tracing::debug!("Run exceeded {:?}", limit);
                ControlFlow::Break(Outcome::Timeout { command: Some(run) })
            }
            // The executable is the submission's own product, so failing to
            // start it is the submission's fault.
            Err(ProcessError::Launch { msg, .. }) => {
                tracing::debug!("Executable did not start: {}", msg);
                ControlFlow::Break(Outcome::ExecutionFailure {
                    command: Some(run),
                    status: None,
                })
            }
        };

        Ok(stage)
    }

    async fn validate(&self, submission: &Submission) -> Result<Outcome> {
        let dir = self.rule.output_dir(submission);

        let locator = self.locator.clone();
        let scan_dir = dir.clone();
        let located = tokio::task::spawn_blocking(move || locator.locate(&scan_dir))
            .await
            .map_err(|e| Error::Worker(e.to_string()))?;

        let artifact = match located {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::debug!("Artifact lookup failed: {}", e);
                return Ok(Outcome::ArtifactPathError {
                    dir: e.dir().to_path_buf(),
                    matches: e.matches(),
                });
            }
        };

        let outcome = match self.validator.compare(&artifact, &dir).await? {
            Comparison::Identical => Outcome::Success,
            Comparison::Different { command } => Outcome::ArtifactMismatch { command },
            Comparison::TimedOut { command } => Outcome::Timeout {
                command: Some(command),
            },
        };

        Ok(outcome)
    }
}

fn transition(from: PipelineState, to: PipelineState) {
    tracing::debug!(%from, %to, "State changed");
}

fn finish(outcome: Outcome) -> Outcome {
    let state = PipelineState::finished_with(&outcome);
    debug_assert!(state.is_terminal());
    tracing::debug!(%state, tag = %outcome.tag(), "Pipeline finished");
    outcome
}
