//! Directory-backed cache store

use super::{Cache, CacheMetadata};
use crate::error::{SupplyError, SupplyResult};
use crate::fsutil::{self, CopyMode};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Metadata file name inside the cache dir
pub const METADATA_FILE: &str = "metadata.json";

/// Convert a filesystem error from the shared helpers into a cache error
fn as_cache_error(err: SupplyError) -> SupplyError {
    match err {
        SupplyError::Io { context, source } => SupplyError::CacheIo { context, source },
        other => other,
    }
}

/// Cache store copying selected dependency-area directories in and out of
/// the platform cache dir
#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_dir: PathBuf,
    dep_dir: PathBuf,
    stack: String,
    cached_dirs: Vec<String>,
    metadata: CacheMetadata,
}

impl CacheStore {
    /// Store for `dep_dir` persisted under `cache_dir`
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        dep_dir: impl Into<PathBuf>,
        stack: impl Into<String>,
        cached_dirs: Vec<String>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            dep_dir: dep_dir.into(),
            stack: stack.into(),
            cached_dirs,
            metadata: CacheMetadata::default(),
        }
    }

    fn metadata_path(&self) -> PathBuf {
        self.cache_dir.join(METADATA_FILE)
    }

    async fn load_metadata(&self) -> SupplyResult<Option<CacheMetadata>> {
        let path = self.metadata_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SupplyError::cache_io(
                    format!("reading {}", path.display()),
                    e,
                ))
            }
        };
        let metadata = serde_json::from_str(&content).map_err(|e| {
            SupplyError::cache_io(
                format!("parsing {}", path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;
        Ok(Some(metadata))
    }

    fn copy_dir(src: &Path, dst: &Path) -> SupplyResult<()> {
        fsutil::remove_all(dst).map_err(as_cache_error)?;
        fsutil::copy_tree(src, dst, CopyMode::Copy).map_err(as_cache_error)
    }
}

#[async_trait]
impl Cache for CacheStore {
    async fn restore(&mut self) -> SupplyResult<()> {
        let Some(metadata) = self.load_metadata().await? else {
            debug!("No cache metadata at {}", self.metadata_path().display());
            return Ok(());
        };

        let stack_matches = metadata.matches_stack(&self.stack);
        if !stack_matches {
            info!(
                "Skipping cache restore: stack changed from {} to {}",
                metadata.stack, self.stack
            );
        }
        self.metadata = metadata;
        if !stack_matches {
            return Ok(());
        }

        for dir in &self.cached_dirs {
            let src = self.cache_dir.join(dir);
            if !fsutil::exists(&src).map_err(as_cache_error)? {
                continue;
            }
            debug!("Restoring {} from cache", dir);
            Self::copy_dir(&src, &self.dep_dir.join(dir))?;
        }
        Ok(())
    }

    async fn save(&mut self) -> SupplyResult<()> {
        fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            SupplyError::cache_io(format!("creating {}", self.cache_dir.display()), e)
        })?;

        for dir in &self.cached_dirs {
            let src = self.dep_dir.join(dir);
            let dst = self.cache_dir.join(dir);
            if fsutil::exists(&src).map_err(as_cache_error)? {
                debug!("Saving {} to cache", dir);
                Self::copy_dir(&src, &dst)?;
            } else {
                fsutil::remove_all(&dst).map_err(as_cache_error)?;
            }
        }

        self.metadata.stack = self.stack.clone();
        self.metadata.saved_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(&self.metadata)?;
        let path = self.metadata_path();
        fs::write(&path, content)
            .await
            .map_err(|e| SupplyError::cache_io(format!("writing {}", path.display()), e))
    }

    fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut CacheMetadata {
        &mut self.metadata
    }
}
