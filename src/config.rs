use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;

use crate::{
    constants::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, DEFAULT_COMPARE_TIMEOUT, DEFAULT_RUN_TIMEOUT},
    core::{
        dispatch::{
            default_jobs,
            grouped::{AnalyzerPart, AnalyzerRule},
        },
        domain::{BuildRule, CommandLine},
        pipeline::{locating::ArtifactLocator, validating::Validator},
        traits::process::ProcessRunner,
    },
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Build, run and validate every submission.
    #[default]
    Execute,
    /// Score every submission against every reference solution.
    Score,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Name of the executable the build produces.
    pub target: String,
    pub clean: Vec<String>,
    pub build: Option<Vec<String>>,
    pub run: Option<Vec<String>>,
    pub output_subdir: PathBuf,
    pub run_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            target: "main".to_string(),
            clean: vec!["make".to_string(), "clean".to_string()],
            build: None,
            run: None,
            output_subdir: PathBuf::from("bin"),
            run_timeout_secs: DEFAULT_RUN_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    pub reference_artifact: Option<PathBuf>,
    pub artifact_suffix: String,
    pub compare_program: String,
    pub timeout_secs: u64,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        ValidateConfig {
            reference_artifact: None,
            artifact_suffix: ".png".to_string(),
            compare_program: "diff".to_string(),
            timeout_secs: DEFAULT_COMPARE_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartConfig {
    pub marker: String,
    pub file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub analyzer: String,
    pub references_dir: PathBuf,
    pub parts: Vec<PartConfig>,
    pub extra_args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

/// Whole-run configuration, read once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub submissions_dir: PathBuf,
    pub output_dir: PathBuf,
    pub jobs: Option<usize>,
    pub build: BuildConfig,
    pub validate: ValidateConfig,
    pub score: ScoreConfig,
    pub log_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::default(),
            submissions_dir: PathBuf::from("submissions"),
            output_dir: PathBuf::from("output"),
            jobs: None,
            build: BuildConfig::default(),
            validate: ValidateConfig::default(),
            score: ScoreConfig::default(),
            log_key: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Loads from `$BATCH_MARKER_CONFIG`, or `config/batch.json` when unset.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        tracing::debug!("Loading config from {}", path.display());
        Self::load(&path)
    }

    pub fn jobs(&self) -> usize {
        self.jobs.filter(|&n| n > 0).unwrap_or_else(default_jobs)
    }

    /// Suffix of the execute log file. Runs of different targets must not
    /// share one.
    pub fn log_key(&self) -> String {
        if let Some(key) = &self.log_key {
            return key.clone();
        }
        Path::new(&self.build.target)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.build.target.clone())
    }

    pub fn build_rule(&self) -> Result<BuildRule> {
        let build = &self.build;
        let target = &build.target;

        let clean = command_from(&build.clean, "build.clean")?;
        let build_cmd = match &build.build {
            Some(argv) => command_from(argv, "build.build")?,
            None => CommandLine::new(
                "make",
                [build.output_subdir.join(target).to_string_lossy().to_string()],
            ),
        };
        let run = match &build.run {
            Some(argv) => command_from(argv, "build.run")?,
            None => CommandLine::new(&format!("./{}", target), Vec::<String>::new()),
        };

        Ok(BuildRule {
            clean,
            build: build_cmd,
            run,
            output_subdir: build.output_subdir.clone(),
            run_timeout: Duration::from_secs(build.run_timeout_secs),
        })
    }

    pub fn locator(&self) -> ArtifactLocator {
        ArtifactLocator::new(&self.validate.artifact_suffix)
    }

    pub fn validator(&self, runner: Arc<dyn ProcessRunner>) -> Result<Validator> {
        let validate = &self.validate;
        let reference = validate
            .reference_artifact
            .as_ref()
            .ok_or_else(|| Error::Config("validate.reference_artifact is not set".to_string()))?;
        // Comparisons run inside each submission's output dir.
        let reference = std::path::absolute(reference)?;

        Ok(Validator::new(
            runner,
            &validate.compare_program,
            reference,
            Duration::from_secs(validate.timeout_secs),
        ))
    }

    pub fn analyzer_rule(&self) -> Result<AnalyzerRule> {
        let score = &self.score;
        if score.analyzer.is_empty() {
            return Err(Error::Config("score.analyzer is not set".to_string()));
        }
        if score.parts.is_empty() {
            return Err(Error::Config("score.parts is empty".to_string()));
        }

        Ok(AnalyzerRule {
            program: score.analyzer.clone(),
            parts: score
                .parts
                .iter()
                .map(|part| AnalyzerPart {
                    marker: part.marker.clone(),
                    file: part.file.clone(),
                })
                .collect(),
            extra_args: score.extra_args.clone(),
            timeout: score.timeout_secs.map(Duration::from_secs),
        })
    }
}

fn command_from(argv: &[String], field: &str) -> Result<CommandLine> {
    CommandLine::from_argv(argv).ok_or_else(|| Error::Config(format!("{} is empty", field)))
}
