//! Supply orchestration
//!
//! [`Supplier::run`] executes the staging pipeline as an ordered list of
//! named [`Step`]s. The first failing step stops the run and its error is
//! wrapped with the step name. Two steps run before the application is
//! inspected; every later step receives the immutable [`RunContext`] and
//! the mutable [`SupplyState`].

pub mod bundler;
pub mod context;
mod gems;
mod node;
mod profile;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use bundler::{BundlerNegotiator, BundlerState};
pub use context::RunContext;
pub use runtime::RuntimeSelection;

use crate::app::{AppManifest, Engine};
use crate::cache::Cache;
use crate::catalog::{Catalog, Dependency};
use crate::env::{defaults, EnvOverlay, Materializer};
use crate::error::{SupplyError, SupplyResult};
use crate::exec::{CommandRunner, CommandSpec};
use crate::fingerprint;
use crate::fsutil;
use crate::install::Installer;
use crate::scratch::ScratchSpace;
use crate::stager::{Stager, BOOKKEEPING_DIR};
use crate::ui::{self, UiContext};
use crate::version::satisfies;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// One named stage of the supply pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SupplyFreetds,
    ChecksumBefore,
    Setup,
    RestoreCache,
    InstallBundler,
    CreateDefaultEnv,
    EnableLdLibraryPath,
    DetermineRuby,
    InstallJvm,
    InstallRuby,
    PostRubyEnv,
    UpdateRubygems,
    InstallNode,
    InstallYarn,
    InstallGems,
    RewriteShebangs,
    SymlinkBundlerIntoRubygems,
    WriteProfileD,
    SaveCache,
    ExportEnvironment,
    ChecksumAfter,
}

impl Step {
    /// Steps that run before the application is inspected
    pub const PRELUDE: &'static [Step] = &[Step::SupplyFreetds, Step::ChecksumBefore];

    /// Steps that run with a [`RunContext`], in order
    pub const PIPELINE: &'static [Step] = &[
        Step::RestoreCache,
        Step::InstallBundler,
        Step::CreateDefaultEnv,
        Step::EnableLdLibraryPath,
        Step::DetermineRuby,
        Step::InstallJvm,
        Step::InstallRuby,
        Step::PostRubyEnv,
        Step::UpdateRubygems,
        Step::InstallNode,
        Step::InstallYarn,
        Step::InstallGems,
        Step::RewriteShebangs,
        Step::SymlinkBundlerIntoRubygems,
        Step::WriteProfileD,
        Step::SaveCache,
        Step::ExportEnvironment,
        Step::ChecksumAfter,
    ];

    /// Every step in execution order
    pub fn all() -> impl Iterator<Item = Step> {
        Self::PRELUDE
            .iter()
            .copied()
            .chain(std::iter::once(Step::Setup))
            .chain(Self::PIPELINE.iter().copied())
    }

    /// Stable step name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SupplyFreetds => "supply_freetds",
            Self::ChecksumBefore => "checksum_before",
            Self::Setup => "setup",
            Self::RestoreCache => "restore_cache",
            Self::InstallBundler => "install_bundler",
            Self::CreateDefaultEnv => "create_default_env",
            Self::EnableLdLibraryPath => "enable_ld_library_path",
            Self::DetermineRuby => "determine_ruby",
            Self::InstallJvm => "install_jvm",
            Self::InstallRuby => "install_ruby",
            Self::PostRubyEnv => "post_ruby_env",
            Self::UpdateRubygems => "update_rubygems",
            Self::InstallNode => "install_node",
            Self::InstallYarn => "install_yarn",
            Self::InstallGems => "install_gems",
            Self::RewriteShebangs => "rewrite_shebangs",
            Self::SymlinkBundlerIntoRubygems => "symlink_bundler_into_rubygems",
            Self::WriteProfileD => "write_profile_d",
            Self::SaveCache => "save_cache",
            Self::ExportEnvironment => "export_environment",
            Self::ChecksumAfter => "checksum_after",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Mutable state carried from step to step
#[derive(Debug, Clone)]
pub struct SupplyState {
    pub runtime: Option<RuntimeSelection>,
    pub bundler: BundlerState,
    needs_node: Option<bool>,
    pub warnings: Vec<String>,
    pub checkpoint: SystemTime,
    pub fingerprint_before: Option<String>,
    pub fingerprint_after: Option<String>,
    pub changed_files: Vec<PathBuf>,
}

impl Default for SupplyState {
    fn default() -> Self {
        Self {
            runtime: None,
            bundler: BundlerState::NoPackageManager,
            needs_node: None,
            warnings: Vec::new(),
            checkpoint: SystemTime::now(),
            fingerprint_before: None,
            fingerprint_after: None,
            changed_files: Vec::new(),
        }
    }
}

impl SupplyState {
    /// Runtime chosen by `determine_ruby`
    pub fn runtime(&self) -> SupplyResult<&RuntimeSelection> {
        self.runtime
            .as_ref()
            .ok_or_else(|| SupplyError::Internal("runtime used before determine_ruby".to_string()))
    }

    /// Active Bundler version chosen by `install_bundler`
    pub fn bundler_version(&self) -> SupplyResult<&str> {
        self.bundler
            .active_version()
            .ok_or_else(|| SupplyError::Internal("bundler used before install_bundler".to_string()))
    }
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct SupplyReport {
    pub runtime: RuntimeSelection,
    pub bundler_version: String,
    pub warnings: Vec<String>,
    pub fragments: Vec<String>,
    pub fingerprint_before: Option<String>,
    pub fingerprint_after: Option<String>,
    pub changed_files: Vec<PathBuf>,
}

/// Tunables for a run
#[derive(Debug, Clone)]
pub struct SupplyOptions {
    /// `bundle install --jobs`
    pub bundle_jobs: u32,
    /// `bundle install --retry`
    pub bundle_retry: u32,
    /// Gems that need a JavaScript runtime
    pub asset_gems: Vec<String>,
    /// Write the final environment into this process
    pub export_environment: bool,
}

impl Default for SupplyOptions {
    fn default() -> Self {
        Self {
            bundle_jobs: 4,
            bundle_retry: 4,
            asset_gems: vec!["webpacker".to_string(), "execjs".to_string()],
            export_environment: true,
        }
    }
}

/// External collaborators of a run
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub installer: Arc<dyn Installer>,
    pub runner: Arc<dyn CommandRunner>,
    pub app: Arc<dyn AppManifest>,
    pub cache: Box<dyn Cache>,
    pub scratch: Arc<dyn ScratchSpace>,
}

/// Runs the supply pipeline for one application
pub struct Supplier {
    stager: Stager,
    catalog: Arc<dyn Catalog>,
    installer: Arc<dyn Installer>,
    runner: Arc<dyn CommandRunner>,
    app: Arc<dyn AppManifest>,
    cache: Box<dyn Cache>,
    scratch: Arc<dyn ScratchSpace>,
    env: EnvOverlay,
    materializer: Materializer,
    ui: UiContext,
    options: SupplyOptions,
}

impl Supplier {
    /// Create a supplier over `stager` with the given environment snapshot
    pub fn new(stager: Stager, collaborators: Collaborators, env: EnvOverlay) -> Self {
        let materializer = Materializer::new(&stager.dep_dir());
        Self {
            stager,
            catalog: collaborators.catalog,
            installer: collaborators.installer,
            runner: collaborators.runner,
            app: collaborators.app,
            cache: collaborators.cache,
            scratch: collaborators.scratch,
            env,
            materializer,
            ui: UiContext::non_interactive(),
            options: SupplyOptions::default(),
        }
    }

    /// Use `ui` for buildpack output
    pub fn with_ui(mut self, ui: UiContext) -> Self {
        self.ui = ui;
        self
    }

    /// Override run tunables
    pub fn with_options(mut self, options: SupplyOptions) -> Self {
        self.options = options;
        self
    }

    /// Environment overlay as it stands
    pub fn env(&self) -> &EnvOverlay {
        &self.env
    }

    /// Run every step in order
    pub async fn run(&mut self) -> SupplyResult<SupplyReport> {
        self.stager.ensure_layout()?;
        let mut state = SupplyState::default();

        for step in Step::PRELUDE {
            self.run_prelude_step(*step, &mut state)
                .await
                .map_err(|e| e.in_step(step.name()))?;
        }

        let ctx = self.setup().map_err(|e| e.in_step(Step::Setup.name()))?;

        for step in Step::PIPELINE {
            debug!("Running step {}", step);
            self.run_step(*step, &ctx, &mut state)
                .await
                .map_err(|e| e.in_step(step.name()))?;
        }

        Ok(SupplyReport {
            runtime: state.runtime()?.clone(),
            bundler_version: state.bundler_version()?.to_string(),
            warnings: state.warnings,
            fragments: self.materializer.fragments().to_vec(),
            fingerprint_before: state.fingerprint_before,
            fingerprint_after: state.fingerprint_after,
            changed_files: state.changed_files,
        })
    }

    async fn run_prelude_step(&mut self, step: Step, state: &mut SupplyState) -> SupplyResult<()> {
        match step {
            Step::SupplyFreetds => self.supply_freetds().await,
            Step::ChecksumBefore => {
                state.checkpoint = SystemTime::now();
                state.fingerprint_before = self.checksum("before");
                Ok(())
            }
            other => Err(SupplyError::Internal(format!("{} is not a prelude step", other))),
        }
    }

    async fn run_step(
        &mut self,
        step: Step,
        ctx: &RunContext,
        state: &mut SupplyState,
    ) -> SupplyResult<()> {
        match step {
            Step::RestoreCache => self.cache.restore().await,
            Step::InstallBundler => self.install_bundler(ctx, state).await,
            Step::CreateDefaultEnv => self.create_default_env(ctx).await,
            Step::EnableLdLibraryPath => self.enable_ld_library_path(ctx).await,
            Step::DetermineRuby => self.determine_ruby(ctx, state),
            Step::InstallJvm => self.install_jvm(ctx, state).await,
            Step::InstallRuby => self.install_ruby(ctx, state).await,
            Step::PostRubyEnv => self.post_ruby_env(ctx, state).await,
            Step::UpdateRubygems => self.update_rubygems(ctx, state).await,
            Step::InstallNode => self.install_node(ctx, state).await,
            Step::InstallYarn => self.install_yarn(ctx, state).await,
            Step::InstallGems => self.install_gems(ctx, state).await,
            Step::RewriteShebangs => self.rewrite_shebangs(ctx),
            Step::SymlinkBundlerIntoRubygems => self.symlink_bundler_into_rubygems(ctx, state),
            Step::WriteProfileD => self.write_profile_d(ctx, state).await,
            Step::SaveCache => self.cache.save().await,
            Step::ExportEnvironment => self.export_environment(ctx),
            Step::ChecksumAfter => {
                state.fingerprint_after = self.checksum("after");
                self.list_changed_files(ctx, state);
                Ok(())
            }
            other => Err(SupplyError::Internal(format!("{} is not a pipeline step", other))),
        }
    }

    /// Child process spec carrying this run's environment
    fn command(&self, program: &str, dir: &Path) -> CommandSpec {
        CommandSpec::new(program, dir).envs(self.env.assigned().clone())
    }

    fn warn_user(&self, state: &mut SupplyState, message: String) {
        warn!("{}", message.lines().next().unwrap_or_default());
        ui::warning(&self.ui, &message);
        state.warnings.push(message);
    }

    async fn supply_freetds(&mut self) -> SupplyResult<()> {
        ui::step(&self.ui, "Supplying FreeTDS");
        let freetds = self.catalog.default_version("freetds")?;
        let dest = self.stager.dep_dir().join("freetds");
        self.installer.install_dependency(&freetds, &dest).await?;
        self.materializer
            .write_profile_d("finalize_freetds.sh", profile::FREETDS_SCRIPT)
            .await
    }

    /// Diagnostic fingerprint; failures are logged and ignored
    fn checksum(&self, label: &str) -> Option<String> {
        match fingerprint::compute(self.stager.build_dir(), &[BOOKKEEPING_DIR]) {
            Ok(digest) => {
                debug!("Build dir checksum {} supply: {}", label, digest);
                Some(digest)
            }
            Err(e) => {
                debug!("Unable to compute build dir checksum {} supply: {}", label, e);
                None
            }
        }
    }

    fn list_changed_files(&self, ctx: &RunContext, state: &mut SupplyState) {
        match fingerprint::changed_since(&ctx.build_dir, state.checkpoint, &[BOOKKEEPING_DIR]) {
            Ok(changed) => {
                if !changed.is_empty() {
                    debug!("Files changed during supply: {:?}", changed);
                }
                state.changed_files = changed;
            }
            Err(e) => debug!("Unable to list changed files: {}", e),
        }
    }

    fn setup(&mut self) -> SupplyResult<RunContext> {
        ui::step(&self.ui, "Supplying Ruby");
        let dep_dir = self.stager.dep_dir();
        let ctx = RunContext::detect(
            self.stager.build_dir(),
            &dep_dir,
            self.stager.deps_idx(),
            self.app.gemfile(),
        )?;
        debug!("Run context: {:?}", ctx);

        // Tools installed into <dep>/bin are found by later child processes
        let bin = dep_dir.join("bin").display().to_string();
        let path = match self.env.get("PATH") {
            Some(path) if !path.is_empty() => format!("{}:{}", bin, path),
            _ => bin,
        };
        self.env.set("PATH", path);
        Ok(ctx)
    }

    async fn install_bundler(&mut self, ctx: &RunContext, state: &mut SupplyState) -> SupplyResult<()> {
        ui::step(&self.ui, "Installing bundler");
        let negotiated = BundlerNegotiator {
            catalog: self.catalog.as_ref(),
            installer: self.installer.as_ref(),
            app: self.app.as_ref(),
            stager: &self.stager,
        }
        .negotiate(ctx.has_gemfile)
        .await?;

        if let Some(warning) = negotiated.warning {
            self.warn_user(state, warning);
        }
        state.bundler = negotiated.state;
        Ok(())
    }

    async fn create_default_env(&mut self, ctx: &RunContext) -> SupplyResult<()> {
        let dep = |rel: &str| ctx.dep_path(rel).display().to_string();
        let vars = defaults([
            ("RAILS_ENV", "production".to_string()),
            ("RACK_ENV", "production".to_string()),
            ("RAILS_GROUPS", "assets".to_string()),
            ("BUNDLE_WITHOUT", "development:test".to_string()),
            ("BUNDLE_GEMFILE", "Gemfile".to_string()),
            ("BUNDLE_BIN", dep("binstubs")),
            ("BUNDLE_CONFIG", dep("bundle_config")),
            ("GEM_HOME", dep("gem_home")),
            ("GEM_PATH", format!("{}:{}", dep("bundler"), dep("gem_home"))),
        ]);
        self.materializer.apply(&mut self.env, &vars, false).await?;
        Ok(())
    }

    async fn enable_ld_library_path(&mut self, ctx: &RunContext) -> SupplyResult<()> {
        let lib_dir = ctx.build_dir.join("ld_library_path");
        if !fsutil::exists(&lib_dir)? {
            return Ok(());
        }

        let mut value = lib_dir.display().to_string();
        if let Some(current) = self.env.get("LD_LIBRARY_PATH").filter(|v| !v.is_empty()) {
            value = format!("{}:{}", value, current);
        }
        self.materializer
            .apply(&mut self.env, &defaults([("LD_LIBRARY_PATH", value)]), true)
            .await?;
        self.materializer
            .write_profile_d("app_lib_path.sh", &profile::app_lib_path_script())
            .await
    }

    fn determine_ruby(&mut self, ctx: &RunContext, state: &mut SupplyState) -> SupplyResult<()> {
        let determined = runtime::determine(ctx, self.app.as_ref(), self.catalog.as_ref())?;
        if let Some(warning) = determined.warning {
            self.warn_user(state, warning);
        }
        info!(
            "Selected {} {}",
            determined.selection.engine, determined.selection.version
        );
        state.runtime = Some(determined.selection);
        Ok(())
    }

    async fn install_jvm(&mut self, ctx: &RunContext, state: &mut SupplyState) -> SupplyResult<()> {
        if state.runtime()?.engine != Engine::JRuby {
            return Ok(());
        }
        if fsutil::exists(&ctx.build_dir.join(".jdk"))? {
            ui::info(&self.ui, "Using pre-installed JDK");
            return Ok(());
        }

        ui::step(&self.ui, "Installing JVM");
        let jvm_dir = ctx.dep_path("jvm");
        self.installer
            .install_only_version("openjdk1.8-latest", &jvm_dir)
            .await?;
        self.stager.link_directory_in_dep_dir(&jvm_dir.join("bin"), "bin")?;
        self.materializer
            .write_profile_d("jruby.sh", profile::JRUBY_SCRIPT)
            .await
    }

    async fn install_ruby(&mut self, ctx: &RunContext, state: &mut SupplyState) -> SupplyResult<()> {
        let runtime = state.runtime()?.clone();
        ui::step(
            &self.ui,
            &format!("Installing {} {}", runtime.engine, runtime.version),
        );
        let ruby_dir = ctx.dep_path("ruby");
        self.installer
            .install_dependency(
                &Dependency::new(runtime.engine.as_str(), runtime.version.clone()),
                &ruby_dir,
            )
            .await?;

        self.rewrite_shebangs(ctx)?;

        let ruby_exe = ruby_dir.join("bin").join("ruby.exe");
        if !fsutil::exists(&ruby_exe)? {
            fsutil::symlink(Path::new("ruby"), &ruby_exe)?;
        }
        self.stager
            .link_directory_in_dep_dir(&ruby_dir.join("bin"), "bin")
    }

    async fn post_ruby_env(&mut self, ctx: &RunContext, state: &mut SupplyState) -> SupplyResult<()> {
        let runtime = state.runtime()?;
        let bundle_path = ctx
            .dep_path("vendor_bundle")
            .join(runtime.engine.as_str())
            .join(runtime.ruby_engine_version()?)
            .display()
            .to_string();
        let gem_path = format!(
            "{}:{}:{}",
            ctx.dep_path("bundler").display(),
            bundle_path,
            ctx.dep_path("gem_home").display()
        );
        let vars = defaults([("BUNDLE_PATH", bundle_path), ("GEM_PATH", gem_path)]);
        debug!("Setting post ruby install env: {:?}", vars);
        self.materializer.apply(&mut self.env, &vars, true).await?;
        Ok(())
    }

    async fn update_rubygems(&mut self, ctx: &RunContext, state: &mut SupplyState) -> SupplyResult<()> {
        let versions = self.catalog.all_versions("rubygems");
        let version = match versions.as_slice() {
            [] => return Ok(()),
            [only] => only.clone(),
            _ => {
                return Err(SupplyError::AmbiguousVersion {
                    name: "rubygems".to_string(),
                    count: versions.len(),
                })
            }
        };

        let current = self
            .runner
            .output(&self.command("gem", &ctx.dep_dir).arg("--version"))
            .await?;
        let current = current.trim().to_string();
        let up_to_date = satisfies(&current, &format!(">= {}", version)).map_err(|source| {
            SupplyError::Resolution {
                name: "rubygems".to_string(),
                source,
            }
        })?;
        if up_to_date {
            return Ok(());
        }
        if state.runtime()?.engine == Engine::JRuby {
            debug!("Skipping update of rubygems since jruby");
            return Ok(());
        }

        ui::step(
            &self.ui,
            &format!("Update rubygems from {} to {}", current, version),
        );
        let workdir = tempfile::Builder::new()
            .prefix(".rubygems")
            .tempdir_in(&ctx.dep_dir)
            .map_err(|e| SupplyError::io("creating rubygems directory", e))?;
        self.installer
            .install_dependency(&Dependency::new("rubygems", version.clone()), workdir.path())
            .await?;

        let gem_home = ctx.dep_path("gem_home");
        tokio::fs::create_dir_all(&gem_home)
            .await
            .map_err(|e| SupplyError::io(format!("creating {}", gem_home.display()), e))?;

        let setup_dir = workdir.path().join(format!("rubygems-{}", version));
        self.runner
            .output(&self.command("ruby", &setup_dir).arg("setup.rb"))
            .await
            .map_err(|e| SupplyError::install("rubygems", &version, e.to_string()))?;
        Ok(())
    }

    fn export_environment(&mut self, ctx: &RunContext) -> SupplyResult<()> {
        let lib = ctx.dep_path("lib").display().to_string();
        for var in ["LD_LIBRARY_PATH", "LIBRARY_PATH"] {
            let current = self.env.get_or_empty(var).to_string();
            if current.split(':').any(|p| p == lib) {
                continue;
            }
            let value = if current.is_empty() {
                lib.clone()
            } else {
                format!("{}:{}", lib, current)
            };
            self.env.set(var, value);
        }

        if self.options.export_environment {
            self.env.export_to_process();
        } else {
            debug!("Leaving process environment untouched");
        }
        Ok(())
    }
}
