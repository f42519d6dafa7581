//! Supply command - stage the Ruby runtime and gems for an application

use crate::app::GemfileInspector;
use crate::cache::CacheStore;
use crate::catalog::TomlCatalog;
use crate::cli::args::SupplyArgs;
use crate::config::Config;
use crate::env::EnvOverlay;
use crate::error::SupplyResult;
use crate::exec::{CommandRunner, SystemCommand};
use crate::install::ArchiveInstaller;
use crate::scratch::HardLinkScratch;
use crate::stager::Stager;
use crate::supply::{Collaborators, SupplyOptions, Supplier};
use crate::ui::{self, UiContext};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Gemfile location: `BUNDLE_GEMFILE` relative to the build dir, else `Gemfile`
fn gemfile_path(build_dir: &Path, env: &EnvOverlay) -> PathBuf {
    match env.get("BUNDLE_GEMFILE").filter(|v| !v.is_empty()) {
        Some(gemfile) => build_dir.join(gemfile),
        None => build_dir.join("Gemfile"),
    }
}

/// Execute the supply command
pub async fn execute(args: SupplyArgs, config: &Config) -> SupplyResult<()> {
    let ctx = UiContext::detect();
    let stack = args.stack.clone().unwrap_or_default();

    let catalog = Arc::new(
        TomlCatalog::from_file(&args.catalog)
            .await?
            .with_stack(args.stack.clone()),
    );
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommand::new());
    let manifest_dir = args
        .catalog
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let installer = ArchiveInstaller::new(catalog.clone(), ctx, manifest_dir)
        .allow_download(config.install.allow_download && !args.offline)
        .attempts(config.install.download_attempts);

    let stager = Stager::new(&args.build_dir, &args.cache_dir, &args.deps_dir, &args.deps_idx);
    let cached_dirs = if config.cache.enabled && !args.no_cache {
        config.cache.cached_dirs.clone()
    } else {
        debug!("Artifact caching disabled");
        Vec::new()
    };
    let cache = CacheStore::new(&args.cache_dir, stager.dep_dir(), stack, cached_dirs);

    let env = EnvOverlay::from_process();
    let app = GemfileInspector::new(gemfile_path(&args.build_dir, &env));

    let collaborators = Collaborators {
        catalog,
        installer: Arc::new(installer),
        runner,
        app: Arc::new(app),
        cache: Box::new(cache),
        scratch: Arc::new(HardLinkScratch),
    };
    let options = SupplyOptions {
        bundle_jobs: config.bundler.jobs,
        bundle_retry: config.bundler.retry,
        asset_gems: config.node.asset_gems.clone(),
        export_environment: true,
    };

    let mut supplier = Supplier::new(stager, collaborators, env)
        .with_ui(ctx)
        .with_options(options);
    let report = supplier.run().await?;

    info!(
        "Supplied {} {} with bundler {}",
        report.runtime.engine, report.runtime.version, report.bundler_version
    );
    debug!("Profile fragments: {:?}", report.fragments);
    if !report.warnings.is_empty() {
        ui::info(
            &ctx,
            &format!("Finished with {} warning(s)", report.warnings.len()),
        );
    }
    Ok(())
}
