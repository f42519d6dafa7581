//! Installer for catalog archives

use super::Installer;
use crate::catalog::{Catalog, CatalogEntry, Dependency, TomlCatalog};
use crate::error::{SupplyError, SupplyResult};
use crate::ui::{DownloadProgress, UiContext};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const USER_AGENT: &str = concat!("gemstage/", env!("CARGO_PKG_VERSION"));

/// Archive formats understood by [`ArchiveInstaller`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    Gzip,
    Xz,
    /// Anything else is copied into the destination as a single file
    Plain,
}

impl ArchiveKind {
    fn from_uri(uri: &str) -> Self {
        let path = uri.split(['?', '#']).next().unwrap_or(uri);
        if path.ends_with(".tgz") || path.ends_with(".tar.gz") {
            Self::Gzip
        } else if path.ends_with(".tar.xz") || path.ends_with(".txz") {
            Self::Xz
        } else {
            Self::Plain
        }
    }
}

/// Unpack every entry of a tar stream below `dest`.
///
/// Entries whose path would land outside `dest` abort the extraction.
fn extract_tar<R: Read>(reader: R, dest: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut unpacked = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.unpack_in(dest)? {
            let path = entry.path()?.display().to_string();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry {} points outside the destination", path),
            ));
        }
        unpacked += 1;
    }
    Ok(unpacked)
}

fn extract_archive(kind: ArchiveKind, archive: &Path, dest: &Path) -> io::Result<usize> {
    let reader = BufReader::new(std::fs::File::open(archive)?);
    match kind {
        ArchiveKind::Gzip => extract_tar(GzDecoder::new(reader), dest),
        ArchiveKind::Xz => extract_tar(XzDecoder::new(reader), dest),
        ArchiveKind::Plain => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a tar archive",
        )),
    }
}

/// Where an archive comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Local(PathBuf),
    Remote(String),
}

impl Source {
    fn parse(uri: &str, base_dir: &Path) -> Self {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            Self::Remote(uri.to_string())
        } else if let Some(path) = uri.strip_prefix("file://") {
            Self::Local(PathBuf::from(path))
        } else {
            Self::Local(base_dir.join(uri))
        }
    }
}

/// Downloads catalog archives, verifies them and unpacks them in-process
pub struct ArchiveInstaller {
    catalog: Arc<TomlCatalog>,
    ui: UiContext,
    base_dir: PathBuf,
    allow_download: bool,
    attempts: u32,
}

impl ArchiveInstaller {
    /// Installer resolving entries in `catalog`.
    ///
    /// Relative archive paths are taken relative to `base_dir`, normally the
    /// directory holding the manifest.
    pub fn new(
        catalog: Arc<TomlCatalog>,
        ui: UiContext,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            ui,
            base_dir: base_dir.into(),
            allow_download: true,
            attempts: 3,
        }
    }

    /// Refuse `http(s)` archives when false
    pub fn allow_download(mut self, allow: bool) -> Self {
        self.allow_download = allow;
        self
    }

    /// Total download attempts for retryable failures
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Fetch `entry` into `archive`, retrying transient download failures
    async fn fetch(&self, entry: &CatalogEntry, archive: &Path) -> SupplyResult<()> {
        match Source::parse(&entry.uri, &self.base_dir) {
            Source::Local(path) => {
                debug!("Copying {} from {}", entry.name, path.display());
                fs::copy(&path, archive).await.map_err(|e| SupplyError::Download {
                    uri: entry.uri.clone(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }
            Source::Remote(_) if !self.allow_download => Err(SupplyError::Download {
                uri: entry.uri.clone(),
                reason: "downloads are disabled by configuration".to_string(),
            }),
            Source::Remote(uri) => {
                let mut attempt = 1;
                loop {
                    match self.download(&uri, &entry.name, archive).await {
                        Err(e) if e.is_retryable() && attempt < self.attempts => {
                            warn!("Download of {} failed (attempt {}): {}", uri, attempt, e);
                            tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                            attempt += 1;
                        }
                        result => return result,
                    }
                }
            }
        }
    }

    async fn download(&self, uri: &str, label: &str, archive: &Path) -> SupplyResult<()> {
        let progress = DownloadProgress::new(&self.ui, label);
        let uri_owned = uri.to_string();
        let archive = archive.to_path_buf();

        tokio::task::spawn_blocking(move || -> SupplyResult<()> {
            let download_err = |reason: String| SupplyError::Download {
                uri: uri_owned.clone(),
                reason,
            };
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(DOWNLOAD_TIMEOUT))
                .build()
                .into();
            let response = agent
                .get(&uri_owned)
                .header("User-Agent", USER_AGENT)
                .call()
                .map_err(|e| download_err(e.to_string()))?;

            let mut reader = response.into_body().into_reader();
            let mut file = std::fs::File::create(&archive)
                .map_err(|e| SupplyError::io(format!("creating {}", archive.display()), e))?;
            let mut buf = vec![0u8; 64 * 1024];
            let mut total = 0u64;
            loop {
                let n = reader.read(&mut buf).map_err(|e| download_err(e.to_string()))?;
                if n == 0 {
                    break;
                }
                file.write_all(&buf[..n])
                    .map_err(|e| SupplyError::io(format!("writing {}", archive.display()), e))?;
                total += n as u64;
                progress.set_bytes(total);
            }
            progress.finish();
            Ok(())
        })
        .await
        .map_err(|e| SupplyError::Internal(format!("download task failed: {}", e)))?
    }

    async fn verify(entry: &CatalogEntry, archive: &Path) -> SupplyResult<()> {
        let Some(expected) = entry.sha256.as_deref() else {
            return Ok(());
        };
        let bytes = fs::read(archive)
            .await
            .map_err(|e| SupplyError::io(format!("reading {}", archive.display()), e))?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual.eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(SupplyError::ChecksumMismatch {
                name: format!("{} {}", entry.name, entry.version),
                expected: expected.to_string(),
                actual,
            })
        }
    }

    async fn unpack(&self, entry: &CatalogEntry, archive: &Path, dest: &Path) -> SupplyResult<()> {
        fs::create_dir_all(dest)
            .await
            .map_err(|e| SupplyError::io(format!("creating {}", dest.display()), e))?;

        let kind = ArchiveKind::from_uri(&entry.uri);
        if kind == ArchiveKind::Plain {
            let name = archive
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(&entry.name));
            fs::copy(archive, dest.join(name))
                .await
                .map_err(|e| SupplyError::io(format!("copying into {}", dest.display()), e))?;
            return Ok(());
        }

        let archive = archive.to_path_buf();
        let target = dest.to_path_buf();
        let unpacked = tokio::task::spawn_blocking(move || extract_archive(kind, &archive, &target))
            .await
            .map_err(|e| SupplyError::Internal(format!("unpack task failed: {}", e)))?
            .map_err(|e| {
                SupplyError::install(&entry.name, &entry.version, format!("unpacking archive: {}", e))
            })?;
        debug!("Unpacked {} entries into {}", unpacked, dest.display());
        Ok(())
    }
}

#[async_trait]
impl Installer for ArchiveInstaller {
    async fn install_dependency(&self, dep: &Dependency, dest: &Path) -> SupplyResult<()> {
        let entry = self.catalog.entry(dep)?;
        debug!("Installing {} into {}", dep, dest.display());

        let workdir = tempfile::TempDir::new()
            .map_err(|e| SupplyError::io("creating download directory", e))?;
        let file_name = entry
            .uri
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(entry.name.as_str())
            .to_string();
        let archive = workdir.path().join(file_name);

        self.fetch(entry, &archive).await?;
        Self::verify(entry, &archive).await?;
        self.unpack(entry, &archive, dest).await
    }

    async fn install_only_version(&self, name: &str, dest: &Path) -> SupplyResult<()> {
        let versions = self.catalog.all_versions(name);
        if versions.len() != 1 {
            return Err(SupplyError::AmbiguousVersion {
                name: name.to_string(),
                count: versions.len(),
            });
        }
        let dep = Dependency::new(name, versions[0].clone());
        self.install_dependency(&dep, dest).await
    }
}
