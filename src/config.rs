//! Configuration for devstats.

use crate::store::ReadMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Where raw and anonymized records are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One SQLite database for raw records and one for aggregates.
    #[default]
    Sqlite,
    /// One JSON file per record type.
    File,
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "file" | "json" => Ok(Backend::File),
            other => Err(ConfigError::Invalid(format!("unknown backend `{other}`"))),
        }
    }
}

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Length of each anonymization interval, in seconds
    pub interval_secs: u64,

    /// Directory holding the stores and the transparency log
    pub data_path: PathBuf,

    pub backend: Backend,

    /// SQLite file for raw records, relative to `data_path`
    pub raw_db_name: String,

    /// SQLite file for anonymized aggregates, relative to `data_path`
    pub anon_db_name: String,

    /// How reads treat stored columns no field claims
    pub read_mode: ReadMode,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("devstats");

        Self {
            interval_secs: 600, // 10 minutes
            data_path: data_dir,
            backend: Backend::default(),
            raw_db_name: "devstats.db".to_string(),
            anon_db_name: "devstats_anon.db".to_string(),
            read_mode: ReadMode::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or the defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        // Ensure parent directory exists
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
            .join("devstats")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Anonymization interval length.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn raw_db_path(&self) -> PathBuf {
        self.data_path.join(&self.raw_db_name)
    }

    pub fn anon_db_path(&self) -> PathBuf {
        self.data_path.join(&self.anon_db_name)
    }

    /// JSON file backing the flat-file store of `table`.
    pub fn file_store_path(&self, table: &str) -> PathBuf {
        self.data_path.join(format!("{table}.json"))
    }

    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.raw_db_name == self.anon_db_name {
            return Err(ConfigError::Invalid(
                "raw and anonymized data must use different databases".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.interval(), Duration::from_secs(600));
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.read_mode, ReadMode::Lenient);
        assert_ne!(config.raw_db_path(), config.anon_db_path());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.interval_secs, 600);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            interval_secs: 60,
            backend: Backend::File,
            read_mode: ReadMode::Strict,
            data_path: dir.path().to_path_buf(),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.interval_secs, 60);
        assert_eq!(loaded.backend, Backend::File);
        assert_eq!(loaded.read_mode, ReadMode::Strict);
        assert_eq!(
            loaded.file_store_path("keypresses"),
            dir.path().join("keypresses.json")
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "backend": "file" }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.backend, Backend::File);
        assert_eq!(config.interval_secs, 600);
    }

    #[test]
    fn test_saved_config_has_no_watch_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "interval_secs": 120, "watch_paths": ["/home"] }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.interval_secs, 120);

        config.save_to(&path).unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("watch_paths"));
    }

    #[test]
    fn test_zero_interval_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "interval_secs": 0 }"#).unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("sqlite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!("File".parse::<Backend>().unwrap(), Backend::File);
        assert!("postgres".parse::<Backend>().is_err());
    }
}
