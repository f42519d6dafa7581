//! Dependency installation
//!
//! The supply pipeline never downloads or unpacks anything itself; it asks an
//! [`Installer`] to place a catalog dependency into a directory.

mod archive;

pub use archive::ArchiveInstaller;

use crate::catalog::Dependency;
use crate::error::SupplyResult;
use async_trait::async_trait;
use std::path::Path;

/// Places catalog dependencies on disk
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install exactly `dep` into `dest`
    async fn install_dependency(&self, dep: &Dependency, dest: &Path) -> SupplyResult<()>;

    /// Install the single catalog version of `name` into `dest`.
    ///
    /// Fails unless the catalog lists exactly one version.
    async fn install_only_version(&self, name: &str, dest: &Path) -> SupplyResult<()>;
}
