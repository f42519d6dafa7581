//! Configuration schema for gemstage
//!
//! Configuration is stored at `~/.config/gemstage/config.toml`

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Bundler invocation settings
    pub bundler: BundlerConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Dependency download settings
    pub install: InstallConfig,

    /// JavaScript runtime detection
    pub node: NodeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Bundler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    /// Parallel install jobs (`bundle install --jobs`)
    pub jobs: u32,

    /// Network retries (`bundle install --retry`)
    pub retry: u32,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self { jobs: 4, retry: 4 }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Carry installed artifacts between deployments (default: true)
    pub enabled: bool,

    /// Dependency-area directories saved to the cache
    pub cached_dirs: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cached_dirs: vec!["vendor_bundle".to_string()],
        }
    }
}

/// Dependency download settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Fetch `http(s)` archives (false for offline buildpacks)
    pub allow_download: bool,

    /// Attempts per archive for transient download failures
    pub download_attempts: u32,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            allow_download: true,
            download_attempts: 3,
        }
    }
}

/// Node.js detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Gems that need a JavaScript runtime at build time
    pub asset_gems: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            asset_gems: vec!["webpacker".to_string(), "execjs".to_string()],
        }
    }
}
