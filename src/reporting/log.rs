use std::path::{Path, PathBuf};

use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::{
    constants::EXECUTE_LOG_PREFIX,
    core::{
        domain::{Outcome, Submission},
        traits::reporter::Reporter,
    },
    error::Result,
    reporting::record::OutcomeRecord,
};

/// Writes each outcome line to the console (through tracing, so failures show
/// up as errors) and appends it to `execute_log_<key>.txt`. Runs with
/// different keys never share a file.
#[derive(Debug)]
pub struct LogReporter {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogReporter {
    pub async fn open<T: AsRef<Path>>(output_dir: T, key: &str) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        tokio::fs::create_dir_all(output_dir).await?;

        let path = output_dir.join(log_file_name(key));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        tracing::debug!("Appending outcomes to {}", path.display());

        Ok(LogReporter {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn log_file_name(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}{}.txt", EXECUTE_LOG_PREFIX, key)
}

#[async_trait::async_trait]
impl Reporter for LogReporter {
    async fn report(&self, submission: &Submission, outcome: &Outcome) -> Result<()> {
        let line = OutcomeRecord::new(&submission.label, outcome).to_string();

        if outcome.is_success() {
            tracing::info!(target: "outcome", "{}", line);
        } else {
            tracing::error!(target: "outcome", "{}", line);
        }

        let mut file = self.file.lock().await;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}
