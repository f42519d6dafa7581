//! Content fingerprint of a directory tree
//!
//! Used before and after a supply run to report whether staging touched the
//! application directory. The digest covers relative paths and file bytes of
//! every regular file, so renames and edits both change it.

use crate::error::{SupplyError, SupplyResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

fn is_excluded(rel: &Path, exclude_prefixes: &[&str]) -> bool {
    exclude_prefixes
        .iter()
        .any(|prefix| rel.starts_with(prefix))
}

fn walk_error(root: &Path, e: walkdir::Error) -> SupplyError {
    let path = e.path().unwrap_or(root).display().to_string();
    SupplyError::io(
        format!("walking {}", path),
        e.into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
    )
}

/// Regular files under `root` that are not excluded, in file-name order.
///
/// Excluded subtrees are pruned, never descended into.
fn regular_files<'a>(
    root: &'a Path,
    exclude_prefixes: &'a [&'a str],
) -> impl Iterator<Item = SupplyResult<(PathBuf, DirEntry)>> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            entry
                .path()
                .strip_prefix(root)
                .map_or(true, |rel| !is_excluded(rel, exclude_prefixes))
        })
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(walk_error(root, e))),
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let rel = entry.path().strip_prefix(root).ok()?.to_path_buf();
            Some(Ok((rel, entry)))
        })
}

/// SHA-256 over (relative path, contents) of every regular file, lowercase hex
pub fn compute(root: &Path, exclude_prefixes: &[&str]) -> SupplyResult<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut files = 0usize;

    for item in regular_files(root, exclude_prefixes) {
        let (rel, entry) = item?;
        hasher.update(rel.to_string_lossy().as_bytes());

        let mut file = fs::File::open(entry.path())
            .map_err(|e| SupplyError::io(format!("opening {}", entry.path().display()), e))?;
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| SupplyError::io(format!("reading {}", entry.path().display()), e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        files += 1;
    }

    let digest = hex::encode(hasher.finalize());
    debug!("Fingerprint of {} over {} files: {}", root.display(), files, digest);
    Ok(digest)
}

/// Relative paths of regular files modified after `since`
pub fn changed_since(
    root: &Path,
    since: SystemTime,
    exclude_prefixes: &[&str],
) -> SupplyResult<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for item in regular_files(root, exclude_prefixes) {
        let (rel, entry) = item?;
        let modified = entry
            .metadata()
            .map_err(|e| walk_error(root, e))?
            .modified()
            .map_err(|e| SupplyError::io(format!("reading mtime of {}", rel.display()), e))?;
        if modified > since {
            changed.push(rel);
        }
    }
    Ok(changed)
}
