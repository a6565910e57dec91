use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use dashmap::DashMap;
use itertools::Itertools;

/// One independently submitted program, as handed over by the collection step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub label: String,
    pub root: PathBuf,
    pub src: PathBuf,
}

impl Submission {
    pub fn new<T, U>(label: &str, root: T, src: U) -> Self
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        Submission {
            label: label.to_string(),
            root: root.as_ref().into(),
            src: src.as_ref().into(),
        }
    }

    /// Submission rooted at `root` with sources in `root/src`.
    pub fn from_root<T: AsRef<Path>>(label: &str, root: T) -> Self {
        let root = root.as_ref();
        Self::new(label, root, root.join("src"))
    }
}

/// A program plus its arguments, kept as argv so it can be both spawned and
/// logged as one field.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits an argv vector; `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program, args.iter().cloned()))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            std::iter::once(&self.program).chain(&self.args).join(" ")
        )
    }
}

/// How every submission is compiled and executed. Static for a whole run.
#[derive(Clone, Debug)]
pub struct BuildRule {
    pub clean: CommandLine,
    pub build: CommandLine,
    pub run: CommandLine,
    /// Directory, relative to the submission root, the executable runs in and
    /// writes its artifact to.
    pub output_subdir: PathBuf,
    pub run_timeout: std::time::Duration,
}

impl BuildRule {
    pub fn output_dir(&self, submission: &Submission) -> PathBuf {
        submission.root.join(&self.output_subdir)
    }
}

/// The closed set of classifications consumed by downstream statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutcomeTag {
    Success,
    CompileFailure,
    ExecutionFailure,
    Timeout,
    ArtifactPathError,
    ArtifactMismatch,
}

impl OutcomeTag {
    pub const ALL: [OutcomeTag; 6] = [
        OutcomeTag::Success,
        OutcomeTag::CompileFailure,
        OutcomeTag::ExecutionFailure,
        OutcomeTag::Timeout,
        OutcomeTag::ArtifactPathError,
        OutcomeTag::ArtifactMismatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTag::Success => "Success",
            OutcomeTag::CompileFailure => "CompileFailure",
            OutcomeTag::ExecutionFailure => "ExecutionFailure",
            OutcomeTag::Timeout => "Timeout",
            OutcomeTag::ArtifactPathError => "ArtifactPathError",
            OutcomeTag::ArtifactMismatch => "ArtifactMismatch",
        }
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutcomeTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutcomeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| format!("unknown outcome tag `{}`", s))
    }
}

/// Result of processing one submission. Produced once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    CompileFailure {
        command: CommandLine,
    },
    /// `command` is `None` when the worker itself died before a command
    /// could be blamed.
    ExecutionFailure {
        command: Option<CommandLine>,
        status: Option<i32>,
    },
    Timeout {
        command: Option<CommandLine>,
    },
    ArtifactPathError {
        dir: PathBuf,
        matches: usize,
    },
    ArtifactMismatch {
        command: CommandLine,
    },
}

impl Outcome {
    pub fn tag(&self) -> OutcomeTag {
        match self {
            Outcome::Success => OutcomeTag::Success,
            Outcome::CompileFailure { .. } => OutcomeTag::CompileFailure,
            Outcome::ExecutionFailure { .. } => OutcomeTag::ExecutionFailure,
            Outcome::Timeout { .. } => OutcomeTag::Timeout,
            Outcome::ArtifactPathError { .. } => OutcomeTag::ArtifactPathError,
            Outcome::ArtifactMismatch { .. } => OutcomeTag::ArtifactMismatch,
        }
    }

    /// The failing command, when the classification has one.
    pub fn command(&self) -> Option<&CommandLine> {
        match self {
            Outcome::Success | Outcome::ArtifactPathError { .. } => None,
            Outcome::CompileFailure { command } | Outcome::ArtifactMismatch { command } => {
                Some(command)
            }
            Outcome::ExecutionFailure { command, .. } | Outcome::Timeout { command } => {
                command.as_ref()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Submission identity to outcome, filled concurrently as workers finish.
#[derive(Debug, Default)]
pub struct BatchResultSet {
    outcomes: DashMap<String, Outcome>,
}

impl BatchResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for `label`, returning the previous one if the
    /// submission had already been classified.
    pub fn record(&self, label: &str, outcome: Outcome) -> Option<Outcome> {
        self.outcomes.insert(label.to_string(), outcome)
    }

    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<Outcome> {
        self.outcomes.get(label).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn tally(&self) -> HashMap<OutcomeTag, usize> {
        self.outcomes
            .iter()
            .map(|entry| entry.value().tag())
            .counts()
    }
}
