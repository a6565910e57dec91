use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    core::{
        dispatch::panic_message,
        domain::{BatchResultSet, Outcome, Submission},
        pipeline::submission::SubmissionPipeline,
        traits::reporter::Reporter,
    },
    error::{Error, Result},
};

/// Runs the submission pipeline for every submission, at most `jobs` at a
/// time, reporting each outcome as soon as it is known.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pipeline: Arc<SubmissionPipeline>,
    reporter: Arc<dyn Reporter>,
    jobs: usize,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<SubmissionPipeline>, reporter: Arc<dyn Reporter>, jobs: usize) -> Self {
        Dispatcher {
            pipeline,
            reporter,
            jobs: jobs.max(1),
        }
    }

    /// Completion order is arbitrary. A fatal error aborts every worker still
    /// running; their children are killed when the tasks are dropped.
    #[tracing::instrument(skip_all, fields(submissions = submissions.len(), jobs = self.jobs))]
    pub async fn run(&self, submissions: Vec<Submission>) -> Result<BatchResultSet> {
        let permits = Arc::new(Semaphore::new(self.jobs));
        let mut workers = JoinSet::new();

        for submission in submissions {
            workers.spawn(process_submission(
                self.pipeline.clone(),
                permits.clone(),
                submission,
            ));
        }

        let results = BatchResultSet::new();
        while let Some(joined) = workers.join_next().await {
            let (submission, result) = joined.map_err(|e| Error::Worker(e.to_string()))?;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Aborting batch on {}: {}", submission.label, e);
                    workers.abort_all();
                    return Err(e);
                }
            };

            self.reporter.report(&submission, &outcome).await?;
            if results.record(&submission.label, outcome).is_some() {
                tracing::warn!("Submission {} was classified twice", submission.label);
            }
        }

        Ok(results)
    }
}

async fn process_submission(
    pipeline: Arc<SubmissionPipeline>,
    permits: Arc<Semaphore>,
    submission: Submission,
) -> (Submission, Result<Outcome>) {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return (submission, Err(Error::Worker(e.to_string()))),
    };

    tracing::info!("Processing: {}", submission.label);
    let result = AssertUnwindSafe(pipeline.process(&submission))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            tracing::error!(
                "Worker for {} panicked: {}",
                submission.label,
                panic_message(panic.as_ref())
            );
            Ok(Outcome::ExecutionFailure {
                command: None,
                status: None,
            })
        });

    (submission, result)
}
