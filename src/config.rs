//! Configuration for the Synheart Sync Agent.
//!
//! This is the agent's local configuration: where to send records, who the
//! principal is and where state lives on disk. The sync cadence itself is a
//! [`SyncConfiguration`](crate::sync::SyncConfiguration) resolved from the
//! control plane at runtime.

use crate::gateway::DEFAULT_REQUEST_TIMEOUT;
use crate::sync::engine::DEFAULT_COLLECTOR_TIMEOUT;
use crate::sync::queue::QUEUE_FILE_NAME;
use crate::sync::settings::DEFAULT_ENDPOINT;
use crate::sync::QueuePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const APP_DIR: &str = "synheart-sync-agent";
const STATS_FILE_NAME: &str = "transparency.json";

/// Main configuration for the sync agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the collection endpoint
    pub endpoint: String,

    /// Principal the records are attributed to
    pub user_id: Option<String>,

    /// Path for the offline queue and transparency stats
    pub data_path: PathBuf,

    /// Upper bound for one HTTP request
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Upper bound for one provider pull
    #[serde(with = "duration_serde")]
    pub collector_timeout: Duration,

    /// How often `start` re-fetches the remote configuration
    #[serde(with = "duration_serde")]
    pub config_refresh: Duration,

    /// What a successful delivery does with the offline queue
    pub queue_policy: QueuePolicy,

    /// JSON file the file collector reads readings from
    pub snapshot_source: Option<PathBuf>,

    /// Reported as `isSimulator` in every record
    pub simulated: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_id: None,
            data_path: data_dir,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            config_refresh: Duration::from_secs(15 * 60),
            queue_policy: QueuePolicy::default(),
            snapshot_source: None,
            simulated: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_path.join(QUEUE_FILE_NAME)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join(STATS_FILE_NAME)
    }

    /// The configured principal. When none is set, a fresh one is generated
    /// and stored in `self`; the caller decides whether to save it.
    pub fn principal_or_generate(&mut self) -> String {
        self.user_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone()
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serde support for Duration, stored as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.queue_policy, QueuePolicy::ClearOnSuccess);
        assert!(config.user_id.is_none());
        assert!(!config.simulated);
        assert!(config.queue_path().ends_with("offline_queue.json"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config {
            endpoint: "http://collector.local:8080".to_string(),
            data_path: dir.path().to_path_buf(),
            config_refresh: Duration::from_secs(60),
            queue_policy: QueuePolicy::DrainOnSuccess,
            ..Config::default()
        };
        config.principal_or_generate();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["config_refresh"], 60);
        assert_eq!(raw["queue_policy"], "drain_on_success");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"user_id": "u1", "simulated": true}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.user_id.as_deref(), Some("u1"));
        assert!(loaded.simulated);
        assert_eq!(loaded.collector_timeout, DEFAULT_COLLECTOR_TIMEOUT);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_principal_generated_once() {
        let mut config = Config::default();
        let first = config.principal_or_generate();
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(config.principal_or_generate(), first);
    }
}
