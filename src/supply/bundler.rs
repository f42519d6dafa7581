//! Bundler 1/2 negotiation
//!
//! Bundler 1 is always installed. Applications with a Gemfile also get
//! Bundler 2 copied into the same gem directory; if the application turns
//! out not to support it, exactly the copied files are removed again.
//!
//! ```text
//! NoPackageManager -> PrimaryInstalled -> SecondaryInstalled -> SecondaryActive
//!                            |                     |
//!                            +---(no Gemfile)------+-------> PrimaryActive
//! ```

use crate::app::AppManifest;
use crate::catalog::{Catalog, Dependency};
use crate::error::{SupplyError, SupplyResult};
use crate::fsutil::{self, CopyMode};
use crate::install::Installer;
use crate::stager::Stager;
use crate::version::find_matching_version;
use std::path::PathBuf;
use tracing::{debug, info};

/// Constraint selecting the primary Bundler
pub const PRIMARY_CONSTRAINT: &str = "1.X.X";
/// Constraint selecting the secondary Bundler
pub const SECONDARY_CONSTRAINT: &str = "2.X.X";
/// Warning recorded when the secondary Bundler is rolled back
pub const INCOMPATIBLE_WARNING: &str = "Ruby version not compatible with Bundler 2";

/// Bundler installation state; transitions only move forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundlerState {
    NoPackageManager,
    PrimaryInstalled { primary: String },
    SecondaryInstalled { primary: String, secondary: String },
    SecondaryActive { primary: String, secondary: String },
    PrimaryActive { primary: String },
}

impl BundlerState {
    /// Version `bundle` resolves to, once a decision has been made
    pub fn active_version(&self) -> Option<&str> {
        match self {
            Self::SecondaryActive { secondary, .. } => Some(secondary),
            Self::PrimaryActive { primary } => Some(primary),
            _ => None,
        }
    }

    /// Whether negotiation reached a final state
    pub fn is_settled(&self) -> bool {
        self.active_version().is_some()
    }

    fn primary_installed(self, primary: String) -> SupplyResult<Self> {
        match self {
            Self::NoPackageManager => Ok(Self::PrimaryInstalled { primary }),
            other => Err(Self::invalid(&other, "PrimaryInstalled")),
        }
    }

    fn secondary_installed(self, secondary: String) -> SupplyResult<Self> {
        match self {
            Self::PrimaryInstalled { primary } => Ok(Self::SecondaryInstalled { primary, secondary }),
            other => Err(Self::invalid(&other, "SecondaryInstalled")),
        }
    }

    fn activate_secondary(self) -> SupplyResult<Self> {
        match self {
            Self::SecondaryInstalled { primary, secondary } => {
                Ok(Self::SecondaryActive { primary, secondary })
            }
            other => Err(Self::invalid(&other, "SecondaryActive")),
        }
    }

    fn activate_primary(self) -> SupplyResult<Self> {
        match self {
            Self::PrimaryInstalled { primary } | Self::SecondaryInstalled { primary, .. } => {
                Ok(Self::PrimaryActive { primary })
            }
            other => Err(Self::invalid(&other, "PrimaryActive")),
        }
    }

    fn invalid(from: &Self, to: &str) -> SupplyError {
        SupplyError::Internal(format!("invalid Bundler transition from {:?} to {}", from, to))
    }
}

/// Result of a negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub state: BundlerState,
    pub warning: Option<String>,
}

/// Installs Bundler versions and picks the active one
pub struct BundlerNegotiator<'a> {
    pub catalog: &'a dyn Catalog,
    pub installer: &'a dyn Installer,
    pub app: &'a dyn AppManifest,
    pub stager: &'a Stager,
}

impl BundlerNegotiator<'_> {
    fn resolve(&self, constraint: &str) -> SupplyResult<String> {
        find_matching_version(constraint, &self.catalog.all_versions("bundler")).map_err(
            |source| SupplyError::Resolution {
                name: format!("bundler {}", constraint),
                source,
            },
        )
    }

    fn bundler_dir(&self) -> PathBuf {
        self.stager.dep_dir().join("bundler")
    }

    fn gem_dir(&self, version: &str) -> PathBuf {
        self.bundler_dir()
            .join("gems")
            .join(format!("bundler-{}", version))
    }

    fn gemspec(&self, version: &str) -> PathBuf {
        self.bundler_dir()
            .join("specifications")
            .join(format!("bundler-{}.gemspec", version))
    }

    async fn install_primary(&self) -> SupplyResult<String> {
        let version = self.resolve(PRIMARY_CONSTRAINT)?;
        let dest = self.bundler_dir();
        self.installer
            .install_dependency(&Dependency::new("bundler", version.clone()), &dest)
            .await?;
        self.stager.link_directory_in_dep_dir(&dest.join("bin"), "bin")?;
        Ok(version)
    }

    /// Install into a side dir and copy the gem and gemspec next to Bundler 1
    async fn install_secondary(&self) -> SupplyResult<String> {
        let version = self.resolve(SECONDARY_CONSTRAINT)?;
        let side_dir = self.stager.dep_dir().join("bundler2");
        self.installer
            .install_dependency(&Dependency::new("bundler", version.clone()), &side_dir)
            .await?;

        let gem_name = format!("bundler-{}", version);
        let copied = fsutil::copy_tree(
            &side_dir.join("gems").join(&gem_name),
            &self.gem_dir(&version),
            CopyMode::Copy,
        )
        .and_then(|_| {
            fsutil::copy_file(
                &side_dir
                    .join("specifications")
                    .join(format!("{}.gemspec", gem_name)),
                &self.gemspec(&version),
            )
        });
        let removed = fsutil::remove_all(&side_dir);
        copied?;
        removed?;
        Ok(version)
    }

    fn uninstall_secondary(&self, version: &str) -> SupplyResult<()> {
        fsutil::remove_all(&self.gem_dir(version))?;
        fsutil::remove_all(&self.gemspec(version))
    }

    /// Run the negotiation to a settled state
    pub async fn negotiate(&self, has_gemfile: bool) -> SupplyResult<Negotiated> {
        let primary = self.install_primary().await?;
        let state = BundlerState::NoPackageManager.primary_installed(primary)?;
        debug!("Bundler state: {:?}", state);

        if !has_gemfile {
            return Ok(Negotiated {
                state: state.activate_primary()?,
                warning: None,
            });
        }

        let secondary = self.install_secondary().await?;
        let state = state.secondary_installed(secondary.clone())?;
        debug!("Bundler state: {:?}", state);

        if self.app.check_bundler2_compatibility()? {
            info!("Using Bundler {}", secondary);
            return Ok(Negotiated {
                state: state.activate_secondary()?,
                warning: None,
            });
        }

        self.uninstall_secondary(&secondary)?;
        Ok(Negotiated {
            state: state.activate_primary()?,
            warning: Some(INCOMPATIBLE_WARNING.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_one_way() {
        let state = BundlerState::NoPackageManager
            .primary_installed("1.17.3".to_string())
            .unwrap();
        assert_eq!(state.active_version(), None);
        assert!(!state.is_settled());

        let state = state.secondary_installed("2.4.19".to_string()).unwrap();
        let active = state.clone().activate_secondary().unwrap();
        assert_eq!(active.active_version(), Some("2.4.19"));

        let rolled_back = state.activate_primary().unwrap();
        assert_eq!(rolled_back.active_version(), Some("1.17.3"));

        assert!(rolled_back.clone().activate_secondary().is_err());
        assert!(rolled_back.primary_installed("1.17.2".to_string()).is_err());
    }
}
