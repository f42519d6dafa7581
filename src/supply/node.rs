//! JavaScript runtime for asset gems

use super::{RunContext, SupplyState, Supplier};
use crate::catalog::Dependency;
use crate::error::{SupplyError, SupplyResult};
use crate::fsutil;
use crate::ui;
use crate::version::find_matching_version;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

impl Supplier {
    /// Whether node must be installed; probed once per run
    pub(super) async fn needs_node(&self, ctx: &RunContext, state: &mut SupplyState) -> bool {
        if let Some(needs) = state.needs_node {
            return needs;
        }

        let probe = self.command("node", &ctx.build_dir).arg("--version");
        let needs = if self.runner.succeeds(&probe).await {
            ui::step(&self.ui, "Skipping install of nodejs since it has been supplied");
            false
        } else {
            self.options.asset_gems.iter().any(|gem| {
                debug!("Test {} in gemfile", gem);
                matches!(self.app.has_gem_version(gem, ">=0.0.0"), Ok(true))
            })
        };

        state.needs_node = Some(needs);
        needs
    }

    fn staging_dir(ctx: &RunContext, prefix: &str) -> SupplyResult<TempDir> {
        tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&ctx.dep_dir)
            .map_err(|e| SupplyError::io(format!("creating {} directory", prefix), e))
    }

    /// Move an unpacked distribution into its final place in the dep dir
    fn place(src: &Path, dest: &Path) -> SupplyResult<()> {
        fsutil::remove_all(dest)?;
        std::fs::rename(src, dest).map_err(|e| {
            SupplyError::io(format!("moving {} to {}", src.display(), dest.display()), e)
        })
    }

    pub(super) async fn install_node(
        &mut self,
        ctx: &RunContext,
        state: &mut SupplyState,
    ) -> SupplyResult<()> {
        if !self.needs_node(ctx, state).await {
            return Ok(());
        }

        let version = find_matching_version("x", &self.catalog.all_versions("node")).map_err(
            |source| SupplyError::Resolution {
                name: "node".to_string(),
                source,
            },
        )?;
        ui::step(&self.ui, &format!("Installing node {}", version));

        let staging = Self::staging_dir(ctx, ".node")?;
        self.installer
            .install_dependency(&Dependency::new("node", version.clone()), staging.path())
            .await?;

        let node_dir = ctx.dep_path("node");
        Self::place(
            &staging.path().join(format!("node-v{}-linux-x64", version)),
            &node_dir,
        )?;
        self.stager.link_directory_in_dep_dir(&node_dir.join("bin"), "bin")
    }

    pub(super) async fn install_yarn(
        &mut self,
        ctx: &RunContext,
        state: &mut SupplyState,
    ) -> SupplyResult<()> {
        if !self.needs_node(ctx, state).await {
            return Ok(());
        }
        if !fsutil::exists(&ctx.build_dir.join("yarn.lock"))? {
            return Ok(());
        }

        ui::step(&self.ui, "Installing yarn");
        let staging = Self::staging_dir(ctx, ".yarn")?;
        self.installer
            .install_only_version("yarn", staging.path())
            .await?;

        let pattern = format!(
            "{}/yarn-v*",
            glob::Pattern::escape(&staging.path().display().to_string())
        );
        let dists: Vec<_> = glob::glob(&pattern)
            .map_err(|e| SupplyError::Internal(format!("yarn pattern {}: {}", pattern, e)))?
            .filter_map(Result::ok)
            .collect();
        let [dist] = dists.as_slice() else {
            return Err(SupplyError::install(
                "yarn",
                "",
                "Unable to find yarn distribution dir",
            ));
        };

        let yarn_dir = ctx.dep_path("yarn");
        Self::place(dist, &yarn_dir)?;
        self.stager.link_directory_in_dep_dir(&yarn_dir.join("bin"), "bin")
    }
}
