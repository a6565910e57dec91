use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    constants::SCORE_STREAM_EXT,
    core::{
        domain::{CommandLine, Submission},
        traits::process::{ProcessError, ProcessRunner, Sink},
    },
    error::{Error, Result},
};

/// One source file scored separately, with the analyzer marker to use on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalyzerPart {
    pub marker: String,
    pub file: String,
}

/// How the external analyzer is invoked for a (reference, student) pair.
#[derive(Clone, Debug)]
pub struct AnalyzerRule {
    pub program: String,
    pub parts: Vec<AnalyzerPart>,
    pub extra_args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl AnalyzerRule {
    pub fn command(
        &self,
        reference: &Submission,
        student: &Submission,
        part: &AnalyzerPart,
    ) -> CommandLine {
        let reference_file = reference.src.join(&part.file);
        let student_file = student.src.join(&part.file);

        let mut args = vec![
            format!("-cam-reference-solution={}", reference_file.display()),
            format!("-cam-marker={}", part.marker),
            student_file.display().to_string(),
            "--".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());

        CommandLine::new(&self.program, args)
    }
}

#[derive(Clone, Debug)]
pub struct GroupReport {
    pub reference: String,
    pub output: PathBuf,
    pub invocations: usize,
    /// Students with at least one failed analyzer run, in processing order.
    pub failed: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

/// Scores every student against every reference. Each reference owns one
/// output stream, so references run in parallel and the students under one
/// reference run sequentially in the order given.
#[derive(Debug, Clone)]
pub struct GroupedDispatcher {
    runner: Arc<dyn ProcessRunner>,
    rule: Arc<AnalyzerRule>,
    output_dir: PathBuf,
    jobs: usize,
}

impl GroupedDispatcher {
    pub fn new<T: AsRef<Path>>(
        runner: Arc<dyn ProcessRunner>,
        rule: Arc<AnalyzerRule>,
        output_dir: T,
        jobs: usize,
    ) -> Self {
        GroupedDispatcher {
            runner,
            rule,
            output_dir: output_dir.as_ref().into(),
            jobs: jobs.max(1),
        }
    }

    /// Reports come back sorted by reference label.
    #[tracing::instrument(skip_all, fields(references = references.len(), students = students.len()))]
    pub async fn run(
        &self,
        references: Vec<Submission>,
        students: Arc<Vec<Submission>>,
    ) -> Result<Vec<GroupReport>> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let permits = Arc::new(Semaphore::new(self.jobs));
        let mut groups = JoinSet::new();

        for reference in references {
            let group = ScoringGroup {
                runner: self.runner.clone(),
                rule: self.rule.clone(),
                output: self
                    .output_dir
                    .join(format!("{}.{}", reference.label, SCORE_STREAM_EXT)),
                reference,
            };
            let permits = permits.clone();
            let students = students.clone();

            groups.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Worker(e.to_string()))?;
                group.score(&students).await
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = groups.join_next().await {
            let report = joined.map_err(|e| Error::Worker(e.to_string()))??;
            tracing::info!(
                "Scored {} students against {} ({} failed)",
                students.len(),
                report.reference,
                report.failed.len()
            );
            reports.push(report);
        }

        reports.sort_by(|a, b| a.reference.cmp(&b.reference));
        Ok(reports)
    }
}

struct ScoringGroup {
    runner: Arc<dyn ProcessRunner>,
    rule: Arc<AnalyzerRule>,
    reference: Submission,
    output: PathBuf,
}

impl ScoringGroup {
    #[tracing::instrument(skip_all, fields(reference = %self.reference.label))]
    async fn score(&self, students: &[Submission]) -> Result<GroupReport> {
        // Truncated: one run, one stream per reference
        let stream = Sink::create(&self.output).await?;
        let mut invocations = 0;
        let mut failed = Vec::new();

        for student in students {
            tracing::info!("Running {} against {}", student.label, self.reference.label);
            let mut student_failed = false;

            for part in &self.rule.parts {
                let command = self.rule.command(&self.reference, student, part);
                let result = self
                    .runner
                    .run(
                        &command,
                        Path::new("."),
                        stream.try_clone()?,
                        Sink::Null,
                        self.rule.timeout,
                    )
                    .await;
                invocations += 1;

                match result {
                    Ok(0) => {}
                    Ok(status) => {
                        tracing::debug!("Analyzer exited with {}: {}", status, command);
                        student_failed = true;
                    }
                    Err(ProcessError::Timeout(limit)) => {
                        tracing::debug!("Analyzer exceeded {:?}: {}", limit, command);
                        student_failed = true;
                    }
                    Err(ProcessError::Launch { program, msg }) => {
                        return Err(Error::Launch { program, msg });
                    }
                }
            }

            if student_failed {
                tracing::error!("Failed to mark {}", student.label);
                failed.push(student.label.clone());
            }
        }

        Ok(GroupReport {
            reference: self.reference.label.clone(),
            output: self.output.clone(),
            invocations,
            failed,
            finished_at: Utc::now(),
        })
    }
}
