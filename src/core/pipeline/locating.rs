use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("no file ending in `{suffix}` in {}", dir.display())]
    Missing { dir: PathBuf, suffix: String },
    #[error("{count} files ending in `{suffix}` in {}", dir.display())]
    Ambiguous {
        dir: PathBuf,
        suffix: String,
        count: usize,
    },
    #[error("cannot read {}: {msg}", dir.display())]
    Unreadable { dir: PathBuf, msg: String },
}

impl LocateError {
    pub fn dir(&self) -> &Path {
        match self {
            LocateError::Missing { dir, .. }
            | LocateError::Ambiguous { dir, .. }
            | LocateError::Unreadable { dir, .. } => dir,
        }
    }

    /// How many candidates were seen.
    pub fn matches(&self) -> usize {
        match self {
            LocateError::Ambiguous { count, .. } => *count,
            LocateError::Missing { .. } | LocateError::Unreadable { .. } => 0,
        }
    }
}

/// Finds the single output artifact a run left behind. Strict: zero or
/// several candidates are both errors, there is no tie-break.
#[derive(Clone, Debug)]
pub struct ArtifactLocator {
    suffix: String,
}

impl ArtifactLocator {
    pub fn new(suffix: &str) -> Self {
        ArtifactLocator {
            suffix: suffix.to_string(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Scans the immediate entries of `dir` (not recursive) for regular files
    /// whose name ends with the suffix.
    pub fn locate(&self, dir: &Path) -> Result<PathBuf, LocateError> {
        let entries = std::fs::read_dir(dir).map_err(|e| LocateError::Unreadable {
            dir: dir.into(),
            msg: e.to_string(),
        })?;

        let mut found: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().ends_with(&self.suffix))
                    .unwrap_or(false)
            })
            .collect();

        match found.len() {
            0 => Err(LocateError::Missing {
                dir: dir.into(),
                suffix: self.suffix.clone(),
            }),
            1 => Ok(found.remove(0)),
            count => Err(LocateError::Ambiguous {
                dir: dir.into(),
                suffix: self.suffix.clone(),
                count,
            }),
        }
    }
}
