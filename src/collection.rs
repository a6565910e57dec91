use std::path::Path;

use itertools::Itertools;

use crate::{
    core::domain::Submission,
    error::{Error, Result},
};

/// Every immediate sub-directory of `dir` is one submission, named after the
/// directory, with its sources in `src/`. Sorted by name.
#[tracing::instrument]
pub fn discover(dir: &Path) -> Result<Vec<Submission>> {
    let collection_error = |source| Error::Collection {
        path: dir.to_path_buf(),
        source,
    };

    let dir = dir.canonicalize().map_err(collection_error)?;
    let entries = std::fs::read_dir(&dir).map_err(collection_error)?;

    let mut submissions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(collection_error)?;
        if !entry.file_type().map_err(collection_error)?.is_dir() {
            continue;
        }
        let label = entry.file_name().to_string_lossy().to_string();
        submissions.push(Submission::from_root(&label, entry.path()));
    }

    let submissions = submissions
        .into_iter()
        .sorted_by(|a, b| a.label.cmp(&b.label))
        .collect_vec();
    tracing::info!("Found {} submissions", submissions.len());

    Ok(submissions)
}
