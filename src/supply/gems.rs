//! Gem installation and post-install fixups

use super::{RunContext, SupplyState, Supplier};
use crate::error::{SupplyError, SupplyResult};
use crate::exec::CommandSpec;
use crate::fsutil;
use crate::ui;
use regex::bytes::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static RUBY_SHEBANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#!/.*/ruby.*").expect("shebang pattern is valid"));

const BUNDLE_CONFIG_WARNING: &str = "You have the `.bundle/config` file checked into your repository
It contains local state like the location of the installed bundle
as well as configured git local gems, and other settings that should
not be shared between multiple checkouts of a single repo. Please
remove the `.bundle/` folder from your repo and add it to your `.gitignore` file.";

const CRLF_GEMFILE_WARNING: &str =
    "Windows line endings detected in Gemfile. Your app may fail to stage. Please use UNIX line endings.";

const WINDOWS_LOCK_WARNING: &str = "Removing `Gemfile.lock` because it was generated on Windows.
Bundler will do a full resolve so native gems are handled properly.
This may result in unexpected gem versions being used in your app.
If you are using multi buildpacks, subsequent buildpacks may fail.
In rare occasions Bundler may not be able to resolve your dependencies at all.
https://docs.cloudfoundry.org/buildpacks/ruby/windows.html";

/// Replace an absolute ruby interpreter shebang with `/usr/bin/env ruby`.
///
/// Returns `None` when the content has no such shebang.
fn rewrite_shebang(content: &[u8]) -> Option<Vec<u8>> {
    let found = RUBY_SHEBANG.find(content)?;
    let mut rewritten = Vec::with_capacity(content.len());
    rewritten.extend_from_slice(b"#!/usr/bin/env ruby");
    rewritten.extend_from_slice(&content[found.end()..]);
    Some(rewritten)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> SupplyResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| SupplyError::io(format!("setting permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> SupplyResult<()> {
    Ok(())
}

/// Non-directory entries of `dir`, sorted; a missing dir is empty
fn entries(dir: &Path) -> SupplyResult<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SupplyError::io(format!("reading {}", dir.display()), e)),
    };
    let mut paths = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| SupplyError::io(format!("reading {}", dir.display()), e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

impl Supplier {
    /// Environment for Bundler child processes
    fn bundle_command(&self, ctx: &RunContext, dir: &Path) -> CommandSpec {
        self.command("bundle", dir)
            .env("NOKOGIRI_USE_SYSTEM_LIBRARIES", "true")
            .env("FREETDS_DIR", ctx.dep_path("freetds").display().to_string())
    }

    fn warn_bundle_config(&self, ctx: &RunContext, state: &mut SupplyState) {
        if matches!(fsutil::exists(&ctx.build_dir.join(".bundle").join("config")), Ok(true)) {
            self.warn_user(state, BUNDLE_CONFIG_WARNING.to_string());
        }
    }

    fn warn_windows_gemfile(&self, ctx: &RunContext, state: &mut SupplyState) {
        if let Ok(body) = fs::read(&ctx.gemfile) {
            if body.windows(2).any(|w| w == b"\r\n") {
                self.warn_user(state, CRLF_GEMFILE_WARNING.to_string());
            }
        }
    }

    pub(super) async fn install_gems(
        &mut self,
        ctx: &RunContext,
        state: &mut SupplyState,
    ) -> SupplyResult<()> {
        if !ctx.has_gemfile {
            return Ok(());
        }

        self.warn_bundle_config(ctx, state);
        self.warn_windows_gemfile(ctx, state);

        // Dropped on every exit path below, which removes the copy
        let scratch = self.scratch.copy_to_scratch(&ctx.build_dir)?;
        let app_dir = scratch.path();
        let lock = ctx.gemfile_lock_in(app_dir);

        if self.app.has_windows_gemfile_lock()? {
            self.warn_user(state, WINDOWS_LOCK_WARNING.to_string());
            debug!("Remove {}", lock.display());
            fsutil::remove_all(&lock)?;
        }

        let scratch_config = app_dir.join(".bundle").join("config");
        if fsutil::exists(&scratch_config)? {
            fsutil::remove_all(&scratch_config)?;
            fsutil::copy_file(&ctx.build_dir.join(".bundle").join("config"), &scratch_config)?;
        }

        let mut args = vec![
            "install".to_string(),
            "--without".to_string(),
            self.env.get_or_empty("BUNDLE_WITHOUT").to_string(),
            format!("--jobs={}", self.options.bundle_jobs),
            format!("--retry={}", self.options.bundle_retry),
            "--path".to_string(),
            ctx.dep_path("vendor_bundle").display().to_string(),
            "--binstubs".to_string(),
            ctx.dep_path("binstubs").display().to_string(),
        ];
        if fsutil::exists(&lock)? {
            args.push("--deployment".to_string());
        }

        ui::step(
            &self.ui,
            &format!("Installing dependencies using bundler {}", state.bundler_version()?),
        );
        ui::info(&self.ui, &format!("Running: bundle {}", args.join(" ")));
        self.runner
            .run(&self.bundle_command(ctx, app_dir).args(args))
            .await?;

        self.regenerate_bundler_binstub(ctx, app_dir).await?;

        ui::info(&self.ui, "Cleaning up the bundler cache.");
        self.runner
            .run(&self.bundle_command(ctx, app_dir).arg("clean"))
            .await?;

        self.copy_binstubs(ctx)?;

        // Last writer wins: Bundler's config from the scratch copy
        if fsutil::exists(&scratch_config)? {
            let target = match self.env.get("BUNDLE_CONFIG").filter(|v| !v.is_empty()) {
                Some(path) => PathBuf::from(path),
                None => ctx.dep_path("bundle_config"),
            };
            debug!("Saving {} to {}", scratch_config.display(), target.display());
            fsutil::copy_file(&scratch_config, &target)?;
        }

        if fsutil::exists(&lock)? {
            let target = ctx.dep_path("Gemfile.lock");
            debug!("Saving {} to {}", lock.display(), target.display());
            fsutil::copy_file(&lock, &target)?;
        }
        Ok(())
    }

    async fn regenerate_bundler_binstub(&self, ctx: &RunContext, app_dir: &Path) -> SupplyResult<()> {
        ui::step(&self.ui, "Regenerating bundler binstubs...");
        let binstubs = ctx.dep_path("binstubs");
        self.runner
            .run(
                &self
                    .bundle_command(ctx, app_dir)
                    .args(["binstubs", "bundler", "--force", "--path"])
                    .arg(binstubs.display().to_string()),
            )
            .await?;

        // The destination may be a link into another dependency
        let target = ctx.dep_path("bin").join("bundle");
        fsutil::remove_all(&target)?;
        fsutil::copy_file(&binstubs.join("bundle"), &target)
    }

    fn copy_binstubs(&self, ctx: &RunContext) -> SupplyResult<()> {
        let bin = ctx.dep_path("bin");
        for source in entries(&ctx.dep_path("binstubs"))? {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = bin.join(name);
            if !fsutil::exists(&target)? {
                fsutil::copy_file(&source, &target)?;
            }
        }
        Ok(())
    }

    /// Point ruby scripts in the dep dir at the interpreter on `PATH`
    pub(super) fn rewrite_shebangs(&self, ctx: &RunContext) -> SupplyResult<()> {
        let mut files = entries(&ctx.dep_path("bin"))?;
        let pattern = format!(
            "{}/vendor_bundle/ruby/*/bin/*",
            glob::Pattern::escape(&ctx.dep_dir.display().to_string())
        );
        files.extend(
            glob::glob(&pattern)
                .map_err(|e| SupplyError::Internal(format!("shebang pattern {}: {}", pattern, e)))?
                .filter_map(Result::ok),
        );

        for file in files {
            // Follows links; dangling ones are skipped
            let Ok(meta) = fs::metadata(&file) else {
                debug!("Skipping dangling {}", file.display());
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            let content = fs::read(&file)
                .map_err(|e| SupplyError::io(format!("reading {}", file.display()), e))?;
            if let Some(rewritten) = rewrite_shebang(&content) {
                fs::write(&file, rewritten)
                    .map_err(|e| SupplyError::io(format!("writing {}", file.display()), e))?;
                make_executable(&file)?;
            }
        }
        Ok(())
    }

    pub(super) fn symlink_bundler_into_rubygems(
        &self,
        ctx: &RunContext,
        state: &SupplyState,
    ) -> SupplyResult<()> {
        let engine_version = state.runtime()?.ruby_engine_version()?;
        let bundler = state.bundler_version()?;
        let gem_name = format!("bundler-{}", bundler);

        let dest_dir = ctx
            .dep_path("ruby")
            .join("lib")
            .join("ruby")
            .join("gems")
            .join(engine_version)
            .join("gems");
        fs::create_dir_all(&dest_dir)
            .map_err(|e| SupplyError::io(format!("creating {}", dest_dir.display()), e))?;

        let link = dest_dir.join(&gem_name);
        if fsutil::exists(&link)? {
            debug!("Skipping linking bundler since destination exists");
            return Ok(());
        }
        let source = ctx.dep_path("bundler").join("gems").join(&gem_name);
        fsutil::symlink(&fsutil::relative_path(&dest_dir, &source), &link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_rewrite_only_touches_ruby_interpreters() {
        assert_eq!(
            rewrite_shebang(b"#!/tmp/build/ruby/bin/ruby -w\nputs 1\n").unwrap(),
            b"#!/usr/bin/env ruby\nputs 1\n"
        );
        assert_eq!(rewrite_shebang(b"#!/bin/sh\necho\n"), None);
        assert_eq!(rewrite_shebang(b"puts '#!/x/ruby'\n"), None);
        assert_eq!(rewrite_shebang(b"\x7fELF"), None);
    }

    #[test]
    fn missing_dir_has_no_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(entries(&dir.path().join("missing")).unwrap().is_empty());
    }
}
