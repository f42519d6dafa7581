//! Environment materialization
//!
//! Two artifacts carry the staged environment to the running application:
//! one file per variable under `<dep_dir>/env` (read back by the finalize
//! stage) and named shell fragments under `<dep_dir>/profile.d` (sourced at
//! application start).

mod overlay;

pub use overlay::EnvOverlay;

use crate::error::{SupplyError, SupplyResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Writes env files and profile fragments for the dependency area
#[derive(Debug, Clone)]
pub struct Materializer {
    env_dir: PathBuf,
    profile_dir: PathBuf,
    fragments: Vec<String>,
}

impl Materializer {
    /// Materializer writing under `dep_dir`
    pub fn new(dep_dir: &Path) -> Self {
        Self {
            env_dir: dep_dir.join("env"),
            profile_dir: dep_dir.join("profile.d"),
            fragments: Vec::new(),
        }
    }

    /// Apply `defaults` to the overlay and persist each applied variable.
    ///
    /// With `overwrite` false a variable is only applied when it has no
    /// non-empty value yet; with `overwrite` true it always replaces the
    /// current value. Returns the applied names in key order.
    pub async fn apply(
        &self,
        env: &mut EnvOverlay,
        defaults: &BTreeMap<String, String>,
        overwrite: bool,
    ) -> SupplyResult<Vec<String>> {
        let mut applied = Vec::new();
        for (name, value) in defaults {
            if !overwrite && env.is_set(name) {
                continue;
            }
            env.set(name.clone(), value.clone());
            self.write_env_file(name, value).await?;
            applied.push(name.clone());
        }
        debug!("Applied environment (overwrite={}): {:?}", overwrite, applied);
        Ok(applied)
    }

    /// Persist one variable for the finalize stage
    pub async fn write_env_file(&self, name: &str, value: &str) -> SupplyResult<()> {
        let env_write = |source| SupplyError::EnvWrite {
            name: name.to_string(),
            source,
        };
        fs::create_dir_all(&self.env_dir).await.map_err(env_write)?;
        fs::write(self.env_dir.join(name), value)
            .await
            .map_err(env_write)
    }

    /// Write the named startup fragment, replacing only its own bytes on rewrite
    pub async fn write_profile_d(&mut self, name: &str, contents: &str) -> SupplyResult<()> {
        fs::create_dir_all(&self.profile_dir).await.map_err(|e| {
            SupplyError::io(format!("creating {}", self.profile_dir.display()), e)
        })?;
        let path = self.profile_dir.join(name);
        fs::write(&path, contents)
            .await
            .map_err(|e| SupplyError::io(format!("writing {}", path.display()), e))?;

        if !self.fragments.iter().any(|f| f == name) {
            self.fragments.push(name.to_string());
        }
        Ok(())
    }

    /// Fragment names in the order they were first written
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Read every persisted env file back
    pub async fn read_env_files(&self) -> SupplyResult<BTreeMap<String, String>> {
        let mut vars = BTreeMap::new();
        let mut entries = match fs::read_dir(&self.env_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vars),
            Err(e) => {
                return Err(SupplyError::io(
                    format!("reading {}", self.env_dir.display()),
                    e,
                ))
            }
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SupplyError::io("reading env file entry", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let value = fs::read_to_string(entry.path()).await.map_err(|e| {
                SupplyError::io(format!("reading {}", entry.path().display()), e)
            })?;
            vars.insert(name, value);
        }
        Ok(vars)
    }
}

/// Build a defaults map from literal pairs
pub fn defaults<I, K, V>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
