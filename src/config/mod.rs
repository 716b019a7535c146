//! Configuration management for coon

pub mod schema;

pub use schema::{CacheSpec, Config, ToolSource};

use crate::error::{CoonError, CoonResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coon")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> CoonResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CoonResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CoonError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CoonError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CoonResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CoonError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CoonResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CoonError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the scratch and local cache directories exist
    pub async fn ensure_dirs(config: &Config) -> CoonResult<()> {
        let dirs = [config.temp_dir.clone(), config.local_cache_root()];

        for dir in &dirs {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| CoonError::io(format!("creating directory {}", dir.display()), e))?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.compiler, "coon");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.compiler = "rebar3".to_string();
        config.cache.push(CacheSpec {
            name: "shared".to_string(),
            kind: "filesystem-remote".to_string(),
            url: "/mnt/shared".to_string(),
            username: None,
            password: None,
            token: None,
            namespace: Some("team".to_string()),
        });

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.compiler, "rebar3");
        assert_eq!(loaded.cache, config.cache);
    }

    #[tokio::test]
    async fn malformed_config_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "cache = 5").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[tokio::test]
    async fn ensure_dirs_creates_temp_and_cache() {
        let temp = TempDir::new().unwrap();
        let config = Config {
            temp_dir: temp.path().join("tmp"),
            cache: vec![CacheSpec::local(
                "local_cache",
                temp.path().join("cache").display().to_string(),
            )],
            ..Config::default()
        };

        ConfigManager::ensure_dirs(&config).await.unwrap();
        assert!(temp.path().join("tmp").is_dir());
        assert!(temp.path().join("cache").is_dir());
    }
}
