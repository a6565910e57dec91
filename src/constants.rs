use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "BATCH_MARKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/batch.json";

pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_COMPARE_TIMEOUT: Duration = Duration::from_secs(30);

pub const EXECUTE_LOG_PREFIX: &str = "execute_log_";
pub const SCORE_STREAM_EXT: &str = "stdout";
