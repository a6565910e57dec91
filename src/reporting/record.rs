use std::{collections::HashMap, fmt, path::Path, str::FromStr};

use crate::{
    core::domain::{Outcome, OutcomeTag},
    error::Result,
};

/// One parsed line of an execute log: `<TAG>: [<identity>] "<command>"`,
/// with the command part absent when the outcome has none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub tag: OutcomeTag,
    pub identity: String,
    pub command: Option<String>,
}

impl OutcomeRecord {
    pub fn new(identity: &str, outcome: &Outcome) -> Self {
        OutcomeRecord {
            tag: outcome.tag(),
            identity: identity.to_string(),
            command: outcome.command().map(ToString::to_string),
        }
    }
}

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}]", self.tag, self.identity)?;
        if let Some(command) = &self.command {
            write!(f, " \"{}\"", command)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not an outcome line: {0}")]
pub struct MalformedRecord(pub String);

impl FromStr for OutcomeRecord {
    type Err = MalformedRecord;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let malformed = || MalformedRecord(line.to_string());

        let (tag, rest) = line.trim_end().split_once(": ").ok_or_else(malformed)?;
        let tag = tag.parse::<OutcomeTag>().map_err(|_| malformed())?;
        let (identity, rest) = rest
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .ok_or_else(malformed)?;

        let command = match rest.trim_start() {
            "" => None,
            quoted => Some(
                quoted
                    .strip_prefix('"')
                    .and_then(|command| command.strip_suffix('"'))
                    .ok_or_else(malformed)?
                    .to_string(),
            ),
        };

        Ok(OutcomeRecord {
            tag,
            identity: identity.to_string(),
            command,
        })
    }
}

/// Rebuilds identity -> classification from a persisted execute log. Lines
/// that are not outcome lines are skipped; a later line for the same
/// identity wins. A missing log reads as empty.
pub fn read_execute_log<T: AsRef<Path>>(path: T) -> Result<HashMap<String, OutcomeTag>> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("No execute log {} found", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(content
        .lines()
        .filter_map(|line| line.parse::<OutcomeRecord>().ok())
        .map(|record| (record.identity, record.tag))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::*;
    use crate::core::domain::CommandLine;

    #[test]
    fn test_lines_per_classification() {
        let make = CommandLine::new("make", ["bin/paster"]);
        let cases = [
            (Outcome::Success, "Success: [stu1]"),
            (
                Outcome::CompileFailure {
                    command: make.clone(),
                },
                "CompileFailure: [stu1] \"make bin/paster\"",
            ),
            (
                Outcome::ExecutionFailure {
                    command: Some(CommandLine::new("./paster", Vec::<String>::new())),
                    status: Some(1),
                },
                "ExecutionFailure: [stu1] \"./paster\"",
            ),
            (Outcome::Timeout { command: None }, "Timeout: [stu1]"),
            (
                Outcome::ArtifactPathError {
                    dir: PathBuf::from("/stu1/bin"),
                    matches: 0,
                },
                "ArtifactPathError: [stu1]",
            ),
            (
                Outcome::ArtifactMismatch {
                    command: CommandLine::new("diff", ["ref.png", "out.png"]),
                },
                "ArtifactMismatch: [stu1] \"diff ref.png out.png\"",
            ),
        ];

        for (outcome, expected) in cases {
            assert_eq!(OutcomeRecord::new("stu1", &outcome).to_string(), expected);
        }
    }

    #[test]
    fn test_parse_lines() {
        let record: OutcomeRecord = "CompileFailure: [stu1] \"make bin/paster\""
            .parse()
            .unwrap();
        assert_eq!(
            record,
            OutcomeRecord {
                tag: OutcomeTag::CompileFailure,
                identity: "stu1".to_string(),
                command: Some("make bin/paster".to_string()),
            }
        );

        let record: OutcomeRecord = "Timeout: [stu-2]\n".parse().unwrap();
        assert_eq!(record.tag, OutcomeTag::Timeout);
        assert_eq!(record.identity, "stu-2");
        assert_eq!(record.command, None);
    }

    #[test]
    fn test_reject_foreign_lines() {
        for line in [
            "",
            "Processing: stu1",
            "COMPILER ERROR: [stu1] \"make\"",
            "Success stu1",
            "Success: stu1",
            "ArtifactMismatch: [stu1] diff a b",
        ] {
            assert!(line.parse::<OutcomeRecord>().is_err(), "{:?} parsed", line);
        }
    }

    #[test]
    fn test_read_execute_log() {
        let path = std::env::temp_dir().join(format!("batch_marker_{}.txt", Uuid::new_v4()));
        std::fs::write(
            &path,
            "Success: [stu1]\n\
             some unrelated noise\n\
             CompileFailure: [stu2] \"make bin/paster\"\n\
             Timeout: [stu3] \"./paster\"\n\
             Success: [stu3]\n",
        )
        .unwrap();

        let tags = read_execute_log(&path).unwrap();

        assert_eq!(tags.len(), 3);
        assert_eq!(tags["stu1"], OutcomeTag::Success);
        assert_eq!(tags["stu2"], OutcomeTag::CompileFailure);
        assert_eq!(tags["stu3"], OutcomeTag::Success);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let path = std::env::temp_dir().join(format!("batch_marker_{}.txt", Uuid::new_v4()));

        assert!(read_execute_log(&path).unwrap().is_empty());
    }
}
