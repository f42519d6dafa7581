//! Application manifest inspection
//!
//! The supply pipeline asks questions about the application's `Gemfile` and
//! `Gemfile.lock` through [`AppManifest`]: which engine and version it
//! declares, which gems it locks, and whether it can run under Bundler 2.

mod gemfile;

pub use gemfile::GemfileInspector;

use crate::error::{SupplyError, SupplyResult};
use std::fmt;
use std::path::Path;

/// Ruby implementation an application runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// MRI
    Ruby,
    /// JRuby on the JVM
    JRuby,
}

impl Engine {
    /// Parse a Gemfile engine name
    pub fn parse(name: &str) -> SupplyResult<Self> {
        match name {
            "ruby" => Ok(Self::Ruby),
            "jruby" => Ok(Self::JRuby),
            other => Err(SupplyError::UnsupportedEngine(other.to_string())),
        }
    }

    /// Name as written in the Gemfile and catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ruby => "ruby",
            Self::JRuby => "jruby",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `ruby` directive of a Gemfile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RubyDirective {
    /// Ruby language version or constraint, e.g. `~> 3.2.0`
    pub version: Option<String>,
    /// `engine:` option
    pub engine: Option<String>,
    /// `engine_version:` option
    pub engine_version: Option<String>,
}

/// Questions the supply pipeline asks about the application
pub trait AppManifest: Send + Sync {
    /// Path of the Gemfile, whether or not it exists
    fn gemfile(&self) -> &Path;

    /// Parsed `ruby` directive, `None` when the Gemfile has none
    fn ruby_directive(&self) -> SupplyResult<Option<RubyDirective>>;

    /// Whether the lock file pins `gem` at a version satisfying `constraint`
    fn has_gem_version(&self, gem: &str, constraint: &str) -> SupplyResult<bool>;

    /// Version recorded under `BUNDLED WITH`, if any
    fn bundled_with(&self) -> SupplyResult<Option<String>>;

    /// Whether the lock file was generated for Windows platforms only
    fn has_windows_gemfile_lock(&self) -> SupplyResult<bool>;

    /// Whether the application can be installed with Bundler 2.
    ///
    /// An `Err` means the question could not be answered and is fatal.
    fn check_bundler2_compatibility(&self) -> SupplyResult<bool>;

    /// Engine named in the Gemfile, `ruby` when none is declared
    fn engine(&self) -> SupplyResult<String> {
        Ok(self
            .ruby_directive()?
            .and_then(|d| d.engine)
            .unwrap_or_else(|| "ruby".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_parse() {
        assert_eq!(Engine::parse("ruby").unwrap(), Engine::Ruby);
        assert_eq!(Engine::parse("jruby").unwrap(), Engine::JRuby);
        assert!(matches!(
            Engine::parse("rbx"),
            Err(SupplyError::UnsupportedEngine(name)) if name == "rbx"
        ));
        assert_eq!(Engine::JRuby.to_string(), "jruby");
    }
}
