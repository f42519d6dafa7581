//! Staging directory layout
//!
//! A supply run works on four locations handed over by the platform:
//! the application build dir, a per-application cache dir, the shared deps
//! dir and this buildpack's index within it. Everything this run installs
//! goes under `<deps_dir>/<deps_idx>`.

use crate::error::{SupplyError, SupplyResult};
use crate::fsutil;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bookkeeping subtree of the build dir that is never hashed or diffed
pub const BOOKKEEPING_DIR: &str = ".cloudfoundry";

/// Paths for one staging run
#[derive(Debug, Clone)]
pub struct Stager {
    build_dir: PathBuf,
    cache_dir: PathBuf,
    deps_dir: PathBuf,
    deps_idx: String,
}

impl Stager {
    /// Create a stager over the platform-provided directories
    pub fn new(
        build_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        deps_dir: impl Into<PathBuf>,
        deps_idx: impl Into<String>,
    ) -> Self {
        Self {
            build_dir: build_dir.into(),
            cache_dir: cache_dir.into(),
            deps_dir: deps_dir.into(),
            deps_idx: deps_idx.into(),
        }
    }

    /// Application source directory
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Per-application cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Index of this buildpack within the deps dir
    pub fn deps_idx(&self) -> &str {
        &self.deps_idx
    }

    /// Dependency area owned by this run
    pub fn dep_dir(&self) -> PathBuf {
        self.deps_dir.join(&self.deps_idx)
    }

    /// Create the dependency area and its fixed subdirectories
    pub fn ensure_layout(&self) -> SupplyResult<()> {
        let dep_dir = self.dep_dir();
        for sub in ["bin", "lib", "env", "profile.d"] {
            let dir = dep_dir.join(sub);
            fs::create_dir_all(&dir)
                .map_err(|e| SupplyError::io(format!("creating {}", dir.display()), e))?;
        }
        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            SupplyError::io(format!("creating {}", self.cache_dir.display()), e)
        })?;
        Ok(())
    }

    /// Symlink every entry of `src_dir` into `<dep_dir>/<dest_sub_dir>`.
    ///
    /// Links are relative so the dependency area can move between staging
    /// and runtime. Existing entries are left alone.
    pub fn link_directory_in_dep_dir(&self, src_dir: &Path, dest_sub_dir: &str) -> SupplyResult<()> {
        let dest_dir = self.dep_dir().join(dest_sub_dir);
        fs::create_dir_all(&dest_dir)
            .map_err(|e| SupplyError::io(format!("creating {}", dest_dir.display()), e))?;

        let entries = fs::read_dir(src_dir)
            .map_err(|e| SupplyError::io(format!("reading {}", src_dir.display()), e))?;

        for entry in entries {
            let entry = entry
                .map_err(|e| SupplyError::io(format!("reading {}", src_dir.display()), e))?;
            let link = dest_dir.join(entry.file_name());
            if fsutil::exists(&link)? {
                continue;
            }
            let target = fsutil::relative_path(&dest_dir, &entry.path());
            debug!("Linking {} -> {}", link.display(), target.display());
            fsutil::symlink(&target, &link)?;
        }
        Ok(())
    }
}
