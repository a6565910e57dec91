use std::panic;
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;

use crate::collection::discover;
use crate::config::{Config, Mode};
use crate::core::dispatch::grouped::GroupedDispatcher;
use crate::core::dispatch::per_unit::Dispatcher;
use crate::core::domain::OutcomeTag;
use crate::core::pipeline::submission::SubmissionPipeline;
use crate::core::traits::process::ProcessRunner;
use crate::native::process::NativeProcessRunner;
use crate::reporting::log::LogReporter;
use crate::reporting::record::read_execute_log;

mod collection;
mod config;
mod constants;
mod core;
mod error;
mod native;
mod reporting;

#[cfg(test)]
mod stubs;

#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    set_panic_hook();

    let config = Config::load_default()?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(NativeProcessRunner::new());

    match config.mode {
        Mode::Execute => execute(&config, runner).await?,
        Mode::Score => score(&config, runner).await?,
    }

    Ok(())
}

async fn execute(config: &Config, runner: Arc<dyn ProcessRunner>) -> error::Result<()> {
    let submissions = discover(&config.submissions_dir)?;

    let locator = config.locator();
    let validator = config.validator(runner.clone())?;
    tracing::info!(
        "Comparing `*{}` artifacts against {}",
        locator.suffix(),
        validator.reference().display()
    );

    let pipeline = SubmissionPipeline::new(
        runner,
        Arc::new(config.build_rule()?),
        locator,
        validator,
    );
    let reporter = LogReporter::open(&config.output_dir, &config.log_key()).await?;
    let log_path = reporter.path().to_path_buf();
    tracing::info!("Writing outcomes to {}", log_path.display());

    let started_at = Utc::now();
    let dispatcher = Dispatcher::new(Arc::new(pipeline), Arc::new(reporter), config.jobs());
    let results = dispatcher.run(submissions).await?;

    if results.is_empty() {
        tracing::warn!("No submissions in {}", config.submissions_dir.display());
        return Ok(());
    }

    let tally = results.tally();
    for tag in OutcomeTag::ALL {
        tracing::info!("{}: {}", tag, tally.get(&tag).copied().unwrap_or(0));
    }
    tracing::info!(
        "Processed {} submissions in {}s",
        results.len(),
        (Utc::now() - started_at).num_seconds()
    );

    // The log accumulates across runs; this is what downstream statistics see.
    let persisted = read_execute_log(&log_path)?;
    tracing::info!(
        "{} holds {} submissions, {} successful",
        log_path.display(),
        persisted.len(),
        persisted
            .values()
            .filter(|&&tag| tag == OutcomeTag::Success)
            .count()
    );

    Ok(())
}

async fn score(config: &Config, runner: Arc<dyn ProcessRunner>) -> error::Result<()> {
    let rule = config.analyzer_rule()?;
    let references = discover(&config.score.references_dir)?;
    let students = discover(&config.submissions_dir)?;

    let dispatcher = GroupedDispatcher::new(
        runner,
        Arc::new(rule),
        &config.output_dir,
        config.jobs(),
    );
    let reports = dispatcher.run(references, Arc::new(students)).await?;

    for report in reports {
        tracing::info!(
            "{} -> {} ({} runs, {} failed) finished at {}",
            report.reference,
            report.output.display(),
            report.invocations,
            report.failed.len(),
            report.finished_at.to_rfc3339()
        );
    }

    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
