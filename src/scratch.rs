//! Scratch copies of the build dir
//!
//! `bundle install` runs against a throwaway copy of the application so that
//! files Bundler writes next to the Gemfile (`.bundle/config`, a rewritten
//! lock file) never land in the build dir unless the supply pipeline moves
//! them there explicitly.

use crate::error::{SupplyError, SupplyResult};
use crate::fsutil::{self, CopyMode};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A scratch copy that is deleted when dropped
#[derive(Debug)]
pub struct ScratchCopy {
    _root: TempDir,
    path: PathBuf,
}

impl ScratchCopy {
    /// Wrap a copy placed at `path` inside `root`
    pub fn new(root: TempDir, path: PathBuf) -> Self {
        Self { _root: root, path }
    }

    /// Directory holding the copied tree
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Produces scratch copies of a directory
pub trait ScratchSpace: Send + Sync {
    /// Copy `dir` into a fresh temporary location
    fn copy_to_scratch(&self, dir: &Path) -> SupplyResult<ScratchCopy>;
}

/// Hard-link copy into the system temp dir, byte copies across devices
#[derive(Debug, Default, Clone, Copy)]
pub struct HardLinkScratch;

impl ScratchSpace for HardLinkScratch {
    fn copy_to_scratch(&self, dir: &Path) -> SupplyResult<ScratchCopy> {
        let root = tempfile::Builder::new()
            .prefix("gemstage-")
            .tempdir()
            .map_err(|e| SupplyError::io("creating scratch directory", e))?;
        let name = dir.file_name().unwrap_or_else(|| "app".as_ref());
        let path = root.path().join(name);

        debug!("Copying {} to {}", dir.display(), path.display());
        fsutil::copy_tree(dir, &path, CopyMode::HardLink)?;
        Ok(ScratchCopy::new(root, path))
    }
}
