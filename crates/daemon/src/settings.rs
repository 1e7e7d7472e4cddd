// Process settings (environment variables with defaults)

use anyhow::{bail, Result};
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "~/.courier/queue.db";
const DEFAULT_ERROR_DIR: &str = "~/.courier/errors";
const DEFAULT_TEST_SINK_PATH: &str = "~/.courier/test_worker.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub error_dir: PathBuf,
    pub test_sink_path: PathBuf,
    pub log_format: LogFormat,
    /// Daily-rolling log files are written here when set
    pub log_dir: Option<PathBuf>,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path_or = |key: &str, default: &str| expand(&lookup(key).unwrap_or_else(|| default.to_string()));

        let log_format = match lookup("COURIER_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!("COURIER_LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        };

        Ok(Self {
            db_path: path_or("COURIER_DB_PATH", DEFAULT_DB_PATH),
            error_dir: path_or("COURIER_ERROR_DIR", DEFAULT_ERROR_DIR),
            test_sink_path: path_or("COURIER_TEST_SINK_PATH", DEFAULT_TEST_SINK_PATH),
            log_format,
            log_dir: lookup("COURIER_LOG_DIR").map(|dir| expand(&dir)),
        })
    }

    /// sqlx connection URL for `db_path`
    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }
}
