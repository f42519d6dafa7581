//! Facts about the application computed once per run

use crate::error::SupplyResult;
use crate::fsutil;
use std::path::{Path, PathBuf};

/// Immutable per-run facts shared by every step after `setup`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Application build dir
    pub build_dir: PathBuf,
    /// `<deps_dir>/<deps_idx>`
    pub dep_dir: PathBuf,
    /// Index of this buildpack in the deps dir
    pub deps_idx: String,
    /// Gemfile path (may not exist)
    pub gemfile: PathBuf,
    /// Lock file path (may not exist)
    pub gemfile_lock: PathBuf,
    /// Whether the Gemfile exists
    pub has_gemfile: bool,
    /// Whether the lock file exists
    pub has_gemfile_lock: bool,
}

impl RunContext {
    /// Inspect the build dir for the Gemfile and its lock file
    pub fn detect(
        build_dir: &Path,
        dep_dir: &Path,
        deps_idx: &str,
        gemfile: &Path,
    ) -> SupplyResult<Self> {
        let mut lock = gemfile.as_os_str().to_owned();
        lock.push(".lock");
        let gemfile_lock = PathBuf::from(lock);

        Ok(Self {
            build_dir: build_dir.to_path_buf(),
            dep_dir: dep_dir.to_path_buf(),
            deps_idx: deps_idx.to_string(),
            has_gemfile: fsutil::exists(gemfile)?,
            has_gemfile_lock: fsutil::exists(&gemfile_lock)?,
            gemfile: gemfile.to_path_buf(),
            gemfile_lock,
        })
    }

    /// Path inside the dependency area
    pub fn dep_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dep_dir.join(rel)
    }

    /// Lock file location relative to the build dir, for use in scratch copies
    pub fn gemfile_lock_in(&self, root: &Path) -> PathBuf {
        match self.gemfile_lock.strip_prefix(&self.build_dir) {
            Ok(rel) => root.join(rel),
            Err(_) => root.join("Gemfile.lock"),
        }
    }
}
