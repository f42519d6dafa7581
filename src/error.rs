//! Error types for gemstage
//!
//! All modules use `SupplyResult<T>` as their return type.

use crate::version::VersionError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gemstage operations
pub type SupplyResult<T> = Result<T, SupplyError>;

/// All errors that can occur while supplying an application
#[derive(Error, Debug)]
pub enum SupplyError {
    // Supply pipeline errors
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<SupplyError>,
    },

    #[error("Unable to resolve {name}: {source}")]
    Resolution {
        name: String,
        #[source]
        source: VersionError,
    },

    #[error("Failed to install {name} {version}: {reason}")]
    Install {
        name: String,
        version: String,
        reason: String,
    },

    #[error("Unable to determine Bundler compatibility: {0}")]
    CompatibilityCheck(String),

    #[error("Cache IO error: {context}")]
    CacheIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write environment variable {name}: {source}")]
    EnvWrite {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sorry, we do not support engine: {0}")]
    UnsupportedEngine(String),

    // Catalog errors
    #[error("Invalid buildpack manifest at {path}: {reason}")]
    CatalogInvalid { path: PathBuf, reason: String },

    #[error("No default version of {0} in buildpack manifest")]
    NoDefaultVersion(String),

    #[error("Expected exactly one version of {name} in buildpack manifest, found {count}")]
    AmbiguousVersion { name: String, count: usize },

    #[error("Dependency not found in buildpack manifest: {name} {version}")]
    DependencyNotFound { name: String, version: String },

    // Download errors
    #[error("Download failed: {uri}: {reason}")]
    Download { uri: String, reason: String },

    #[error("Checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    #[error("Command exited unsuccessfully: {command}, exit code: {code}")]
    CommandStatus { command: String, code: i32 },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SupplyError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a cache IO error with context
    pub fn cache_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::CacheIo {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an install error for a dependency
    pub fn install(
        name: impl Into<String>,
        version: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Install {
            name: name.into(),
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Attach the name of the supply step that produced this error
    pub fn in_step(self, step: &'static str) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Name of the failing supply step, if known
    pub fn step(&self) -> Option<&'static str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Error with any step wrapper removed
    pub fn root(&self) -> &SupplyError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), Self::Download { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::UnsupportedEngine(_) => {
                Some("Declare either the ruby or the jruby engine in your Gemfile")
            }
            Self::Resolution { .. } => {
                Some("Check the dependency versions listed in the buildpack manifest")
            }
            Self::ChecksumMismatch { .. } => {
                Some("The buildpack manifest sha256 does not match the downloaded archive")
            }
            Self::CacheIo { .. } => Some("Clear the application cache and stage again"),
            _ => None,
        }
    }
}
