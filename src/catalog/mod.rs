//! Buildpack dependency catalog
//!
//! The catalog lists every installable dependency version shipped with the
//! buildpack, plus a default version constraint per dependency name.

pub mod manifest;

pub use manifest::{CatalogEntry, DefaultVersion, TomlCatalog};

use crate::error::SupplyResult;
use std::fmt;

/// One installable unit with a concrete version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

impl Dependency {
    /// Create a dependency record
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// Read access to the available dependency versions
pub trait Catalog: Send + Sync {
    /// All versions offered for `name`, in catalog order
    fn all_versions(&self, name: &str) -> Vec<String>;

    /// The default version of `name`, resolved against `all_versions`
    fn default_version(&self, name: &str) -> SupplyResult<Dependency>;
}
