//! Filesystem helpers shared by the cache, scratch copy and installers

use crate::error::{SupplyError, SupplyResult};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Whether `path` exists; a dangling symlink counts as present
pub fn exists(path: &Path) -> SupplyResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SupplyError::io(
            format!("checking existence of {}", path.display()),
            e,
        )),
    }
}

/// Copy one file, creating parent directories and keeping permissions
pub fn copy_file(src: &Path, dst: &Path) -> SupplyResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SupplyError::io(format!("creating {}", parent.display()), e))?;
    }
    fs::copy(src, dst).map_err(|e| {
        SupplyError::io(
            format!("copying {} to {}", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

/// How file contents are materialized by [`copy_tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Byte copies
    Copy,
    /// Hard links, falling back to byte copies across devices
    HardLink,
}

/// Recursively copy `src` into `dst`, recreating symlinks as symlinks
pub fn copy_tree(src: &Path, dst: &Path, mode: CopyMode) -> SupplyResult<()> {
    let walk_err = |e: walkdir::Error| {
        let path = e.path().unwrap_or(src).display().to_string();
        SupplyError::io(
            format!("walking {}", path),
            e.into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
        )
    };

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(walk_err)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SupplyError::Internal(e.to_string()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| SupplyError::io(format!("creating {}", target.display()), e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| {
                SupplyError::io(format!("reading link {}", entry.path().display()), e)
            })?;
            symlink(&link, &target)?;
        } else if mode == CopyMode::HardLink {
            if fs::hard_link(entry.path(), &target).is_err() {
                copy_file(entry.path(), &target)?;
            }
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file or directory tree if present
pub fn remove_all(path: &Path) -> SupplyResult<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SupplyError::io(format!("inspecting {}", path.display()), e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| SupplyError::io(format!("removing {}", path.display()), e))
}

/// Create a symlink at `link` pointing to `target`
#[cfg(unix)]
pub fn symlink(target: &Path, link: &Path) -> SupplyResult<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| SupplyError::io(format!("creating {}", parent.display()), e))?;
    }
    std::os::unix::fs::symlink(target, link).map_err(|e| {
        SupplyError::io(
            format!("linking {} -> {}", link.display(), target.display()),
            e,
        )
    })
}

/// Create a symlink at `link` pointing to `target`
#[cfg(not(unix))]
pub fn symlink(target: &Path, link: &Path) -> SupplyResult<()> {
    Err(SupplyError::Internal(format!(
        "symlinks are not supported on this platform ({} -> {})",
        link.display(),
        target.display()
    )))
}

/// Path to `to` expressed relative to the directory `from`.
///
/// Both paths must be absolute or both relative to the same base.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    rel
}
