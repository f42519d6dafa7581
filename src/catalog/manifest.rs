//! Buildpack manifest parsing
//!
//! The manifest is a TOML file shipped next to the buildpack:
//!
//! ```toml
//! [[default_versions]]
//! name = "ruby"
//! version = "2.7.x"
//!
//! [[dependencies]]
//! name = "ruby"
//! version = "2.7.1"
//! uri = "https://buildpacks.example.com/ruby-2.7.1.tgz"
//! sha256 = "..."
//! cf_stacks = ["cflinuxfs3"]
//! ```

use super::{Catalog, Dependency};
use crate::error::{SupplyError, SupplyResult};
use crate::version::find_matching_version;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Parsed buildpack manifest
#[derive(Debug, Clone, Deserialize)]
pub struct TomlCatalog {
    /// Default version constraint per dependency
    #[serde(default)]
    pub default_versions: Vec<DefaultVersion>,

    /// Every downloadable dependency
    #[serde(default)]
    pub dependencies: Vec<CatalogEntry>,

    /// Stack used to filter `cf_stacks`; not part of the file
    #[serde(skip)]
    stack: Option<String>,
}

/// Default version entry
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultVersion {
    pub name: String,
    /// May be a constraint such as `2.7.x`
    pub version: String,
}

/// Downloadable dependency entry
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: String,
    pub uri: String,
    #[serde(default)]
    pub sha256: Option<String>,
    /// Stacks this archive was built for; empty means any
    #[serde(default)]
    pub cf_stacks: Vec<String>,
}

impl CatalogEntry {
    fn available_on(&self, stack: Option<&str>) -> bool {
        match stack {
            Some(stack) if !self.cf_stacks.is_empty() => self.cf_stacks.iter().any(|s| s == stack),
            _ => true,
        }
    }
}

impl TomlCatalog {
    /// Parse a manifest from a TOML file on disk
    pub async fn from_file(path: &Path) -> SupplyResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SupplyError::io(format!("reading buildpack manifest {}", path.display()), e)
        })?;
        toml::from_str(&content).map_err(|e| SupplyError::CatalogInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parse a manifest from a TOML string
    pub fn parse(content: &str) -> SupplyResult<Self> {
        toml::from_str(content).map_err(|e| SupplyError::CatalogInvalid {
            path: "manifest.toml".into(),
            reason: e.to_string(),
        })
    }

    /// Restrict lookups to archives built for `stack`
    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack.filter(|s| !s.is_empty());
        self
    }

    /// Find the entry for a concrete dependency
    pub fn entry(&self, dep: &Dependency) -> SupplyResult<&CatalogEntry> {
        self.dependencies
            .iter()
            .filter(|e| e.available_on(self.stack.as_deref()))
            .find(|e| e.name == dep.name && e.version == dep.version)
            .ok_or_else(|| SupplyError::DependencyNotFound {
                name: dep.name.clone(),
                version: dep.version.clone(),
            })
    }
}

impl Catalog for TomlCatalog {
    fn all_versions(&self, name: &str) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|e| e.name == name && e.available_on(self.stack.as_deref()))
            .map(|e| e.version.clone())
            .collect()
    }

    fn default_version(&self, name: &str) -> SupplyResult<Dependency> {
        let entry = self
            .default_versions
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| SupplyError::NoDefaultVersion(name.to_string()))?;

        let version = find_matching_version(&entry.version, &self.all_versions(name))
            .map_err(|source| SupplyError::Resolution {
                name: name.to_string(),
                source,
            })?;
        debug!("Default version of {} is {}", name, version);

        Ok(Dependency::new(name, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
[[default_versions]]
name = "ruby"
version = "2.7.x"

[[default_versions]]
name = "node"
version = "99.x"

[[dependencies]]
name = "ruby"
version = "2.6.6"
uri = "file:///tmp/ruby-2.6.6.tgz"

[[dependencies]]
name = "ruby"
version = "2.7.1"
uri = "file:///tmp/ruby-2.7.1.tgz"
sha256 = "abc"
cf_stacks = ["cflinuxfs3"]

[[dependencies]]
name = "ruby"
version = "2.7.2"
uri = "file:///tmp/ruby-2.7.2.tgz"
cf_stacks = ["cflinuxfs4"]

[[dependencies]]
name = "node"
version = "12.18.3"
uri = "file:///tmp/node.tgz"
"#;

    #[test]
    fn lists_versions_in_catalog_order() {
        let catalog = TomlCatalog::parse(MANIFEST).unwrap();
        assert_eq!(catalog.all_versions("ruby"), vec!["2.6.6", "2.7.1", "2.7.2"]);
        assert!(catalog.all_versions("python").is_empty());
    }

    #[test]
    fn stack_filters_entries() {
        let catalog = TomlCatalog::parse(MANIFEST)
            .unwrap()
            .with_stack(Some("cflinuxfs3".to_string()));
        assert_eq!(catalog.all_versions("ruby"), vec!["2.6.6", "2.7.1"]);
        assert!(catalog.entry(&Dependency::new("ruby", "2.7.2")).is_err());
    }

    #[test]
    fn default_version_resolves_constraint() {
        let catalog = TomlCatalog::parse(MANIFEST).unwrap();
        assert_eq!(
            catalog.default_version("ruby").unwrap(),
            Dependency::new("ruby", "2.7.2")
        );
    }

    #[test]
    fn default_version_errors() {
        let catalog = TomlCatalog::parse(MANIFEST).unwrap();
        assert!(matches!(
            catalog.default_version("yarn"),
            Err(SupplyError::NoDefaultVersion(_))
        ));
        assert!(matches!(
            catalog.default_version("node"),
            Err(SupplyError::Resolution { .. })
        ));
    }

    #[test]
    fn malformed_default_constraint_is_resolution_error() {
        let catalog = TomlCatalog::parse(
            "[[default_versions]]\nname = \"bundler\"\nversion = \"1.X.3\"\n\n\
             [[dependencies]]\nname = \"bundler\"\nversion = \"1.17.3\"\nuri = \"b.tgz\"\n",
        )
        .unwrap();
        let err = catalog.default_version("bundler").unwrap_err();
        assert!(matches!(
            err,
            SupplyError::Resolution {
                source: crate::version::VersionError::InvalidConstraint { .. },
                ..
            }
        ));
    }

    #[test]
    fn invalid_manifest_errors() {
        let result = TomlCatalog::parse("[[dependencies]]\nname = \"ruby\"\n");
        assert!(matches!(result, Err(SupplyError::CatalogInvalid { .. })));
    }
}
