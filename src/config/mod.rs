//! Configuration loading for gemstage
//!
//! The file is optional. A missing file yields defaults; a present one must
//! parse and pass [`validate`] or the run stops before anything is staged.

pub mod schema;

pub use schema::Config;

use crate::error::{SupplyError, SupplyResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, reads and writes the gemstage config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the per-user config file
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Manager for an explicit file (`--config` / `GEMSTAGE_CONFIG`)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `<config_dir>/gemstage/config.toml`, or `./gemstage/config.toml` when
    /// the platform has no config dir (staging containers without `$HOME`)
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gemstage")
            .join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate the config, or defaults when there is no file
    pub async fn load(&self) -> SupplyResult<Config> {
        match read_optional(&self.config_path).await? {
            Some(content) => self.parse(&content),
            None => {
                debug!("No config at {}, using defaults", self.config_path.display());
                Ok(Config::default())
            }
        }
    }

    fn parse(&self, content: &str) -> SupplyResult<Config> {
        let invalid = |reason: String| SupplyError::ConfigInvalid {
            path: self.config_path.clone(),
            reason,
        };
        let config: Config = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;
        validate(&config).map_err(invalid)?;
        Ok(config)
    }

    /// Write `config`, creating the parent directory as needed
    pub async fn save(&self, config: &Config) -> SupplyResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SupplyError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            SupplyError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;
        info!("Wrote config to {}", self.config_path.display());
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_optional(path: &Path) -> SupplyResult<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SupplyError::io(format!("reading config from {}", path.display()), e)),
    }
}

/// Reject values Bundler or the installer cannot work with
pub fn validate(config: &Config) -> Result<(), String> {
    if config.bundler.jobs == 0 {
        return Err("bundler.jobs must be at least 1".to_string());
    }
    if config.install.download_attempts == 0 {
        return Err("install.download_attempts must be at least 1".to_string());
    }
    if let Some(dir) = config
        .cache
        .cached_dirs
        .iter()
        .find(|d| d.is_empty() || Path::new(d).is_absolute() || d.contains(".."))
    {
        return Err(format!(
            "cache.cached_dirs entry '{}' must be a directory inside the dependency area",
            dir
        ));
    }
    match config.general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(format!("general.log_format must be text or json, not '{}'", other)),
    }
}
