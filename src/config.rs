use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dirs;
use crate::error::{JobError, Result};
use crate::executor::ShellExecutor;
use crate::repository::{JobRepository, DEFAULT_HISTORY_LIMIT};
use crate::scheduler::SchedulerOptions;
use crate::store::FileJobStore;

/// User-configurable settings for the scheduler daemon and CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Directory holding jobs and task history
    #[serde(default = "dirs::chartjobs_home")]
    pub data_dir: PathBuf,

    /// Working directory for commands (default: the daemon's own)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Limit for jobs that do not set `timeoutMs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,

    /// Number of tasks returned per job history query
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Extra environment variables for every command
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::chartjobs_home(),
            working_dir: None,
            default_timeout_ms: None,
            history_limit: default_history_limit(),
            log_level: default_log_level(),
            env: BTreeMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from the default config file path.
    /// Returns default config if the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(dirs::config_path())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            JobError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save the current configuration to the default config file path.
    pub fn save(&self) -> Result<()> {
        self.save_to(dirs::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            default_timeout: self
                .default_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            ..Default::default()
        }
    }

    /// Shell executor with the configured working directory and environment
    pub fn executor(&self) -> ShellExecutor {
        let executor = self
            .env
            .iter()
            .fold(ShellExecutor::new(), |executor, (key, value)| {
                executor.with_env(key, value)
            });
        match &self.working_dir {
            Some(dir) => executor.with_working_dir(dir),
            None => executor,
        }
    }

    /// Open the file store under `data_dir`
    pub async fn open_repository(&self) -> Result<JobRepository> {
        let store = FileJobStore::new(&self.data_dir).await?;
        Ok(JobRepository::new(Arc::new(store)).with_history_limit(self.history_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandExecutor;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.log_level, "info");
        assert!(config.default_timeout_ms.is_none());
        assert!(config.scheduler_options().default_timeout.is_none());
    }

    #[test]
    fn test_config_deserialize() {
        let toml_str = r#"
            data_dir = "/var/lib/chartjobs"
            default_timeout_ms = 60000
            history_limit = 20

            [env]
            REPORT_DIR = "/srv/reports"
        "#;
        let config: SchedulerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/chartjobs"));
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.env["REPORT_DIR"], "/srv/reports");
        assert_eq!(
            config.scheduler_options().default_timeout,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = SchedulerConfig {
            data_dir: dir.path().to_path_buf(),
            working_dir: Some(dir.path().to_path_buf()),
            default_timeout_ms: Some(500),
            history_limit: 5,
            log_level: "debug".to_string(),
            env: BTreeMap::from([("A".to_string(), "1".to_string())]),
        };
        config.save_to(&path).unwrap();

        let loaded = SchedulerConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SchedulerConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.history_limit, 100);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_limit = \"many\"").unwrap();
        assert!(SchedulerConfig::load_from(&path).is_err());
    }

    #[tokio::test]
    async fn test_executor_uses_env() {
        let config = SchedulerConfig {
            env: BTreeMap::from([("GREETING".to_string(), "hi".to_string())]),
            ..Default::default()
        };
        let output = config.executor().execute("echo $GREETING").await.unwrap();
        assert_eq!(output.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn test_open_repository() {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let repository = config.open_repository().await.unwrap();
        assert!(repository.list_enabled().await.unwrap().is_empty());
    }
}
