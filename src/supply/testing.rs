//! In-memory collaborators for driving the supply pipeline in tests

use super::{Collaborators, SupplyOptions, Supplier};
use crate::app::GemfileInspector;
use crate::cache::{Cache, CacheMetadata};
use crate::catalog::{Catalog, Dependency, TomlCatalog};
use crate::env::EnvOverlay;
use crate::error::{SupplyError, SupplyResult};
use crate::exec::{CommandRunner, CommandSpec};
use crate::install::Installer;
use crate::scratch::{HardLinkScratch, ScratchCopy, ScratchSpace};
use crate::stager::Stager;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const MANIFEST: &str = r#"
[[default_versions]]
name = "ruby"
version = "3.2.x"

[[default_versions]]
name = "freetds"
version = "1.x"

[[dependencies]]
name = "freetds"
version = "1.3.17"
uri = "freetds-1.3.17.tgz"

[[dependencies]]
name = "ruby"
version = "3.1.4"
uri = "ruby-3.1.4.tgz"

[[dependencies]]
name = "ruby"
version = "3.2.2"
uri = "ruby-3.2.2.tgz"

[[dependencies]]
name = "jruby"
version = "9.4.3.0-ruby-3.1"
uri = "jruby-9.4.3.0.tgz"

[[dependencies]]
name = "bundler"
version = "1.17.3"
uri = "bundler-1.17.3.tgz"

[[dependencies]]
name = "bundler"
version = "2.4.19"
uri = "bundler-2.4.19.tgz"

[[dependencies]]
name = "openjdk1.8-latest"
version = "1.8.0"
uri = "openjdk.tgz"

[[dependencies]]
name = "rubygems"
version = "3.4.10"
uri = "rubygems-3.4.10.tgz"

[[dependencies]]
name = "node"
version = "18.19.0"
uri = "node-18.19.0.tgz"

[[dependencies]]
name = "node"
version = "20.11.0"
uri = "node-20.11.0.tgz"

[[dependencies]]
name = "yarn"
version = "1.22.19"
uri = "yarn-1.22.19.tgz"
"#;

pub const MANIFEST_WITHOUT_FREETDS: &str = r#"
[[default_versions]]
name = "ruby"
version = "3.2.x"

[[dependencies]]
name = "ruby"
version = "3.2.2"
uri = "ruby-3.2.2.tgz"
"#;

/// Lock file for a Linux-resolved app bundled with `bundler`
pub fn lock_bundled_with(bundler: &str) -> String {
    format!(
        "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (3.0.8)\n\nPLATFORMS\n  x86_64-linux\n\nDEPENDENCIES\n  rack\n\nBUNDLED WITH\n   {}\n",
        bundler
    )
}

/// Lock file for a Rails app
pub fn rails_lock() -> String {
    "GEM\n  remote: https://rubygems.org/\n  specs:\n    rack (2.2.8)\n    rails (7.0.8)\n\nPLATFORMS\n  x86_64-linux\n\nDEPENDENCIES\n  rails\n\nBUNDLED WITH\n   2.4.19\n"
        .to_string()
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Installer that lays out a plausible tree per dependency name
pub struct FakeInstaller {
    catalog: Arc<TomlCatalog>,
    installs: Mutex<Vec<(Dependency, PathBuf)>>,
}

impl FakeInstaller {
    pub fn new(catalog: Arc<TomlCatalog>) -> Self {
        Self {
            catalog,
            installs: Mutex::new(Vec::new()),
        }
    }

    /// Versions installed for `name`, in order
    pub fn installed(&self, name: &str) -> Vec<String> {
        self.installs
            .lock()
            .unwrap()
            .iter()
            .filter(|(dep, _)| dep.name == name && !dep.version.is_empty())
            .map(|(dep, _)| dep.version.clone())
            .collect()
    }

    /// Names of every installed dependency, in order
    pub fn order(&self) -> Vec<String> {
        self.installs
            .lock()
            .unwrap()
            .iter()
            .map(|(dep, _)| dep.name.clone())
            .collect()
    }

    fn lay_out(dep: &Dependency, dest: &Path) {
        let v = &dep.version;
        match dep.name.as_str() {
            "bundler" => {
                write(&dest.join("bin/bundle"), "#!/usr/bin/env ruby\n");
                write(
                    &dest.join(format!("gems/bundler-{}/lib/bundler.rb", v)),
                    "module Bundler; end\n",
                );
                write(
                    &dest.join(format!("specifications/bundler-{}.gemspec", v)),
                    "Gem::Specification.new\n",
                );
            }
            "ruby" | "jruby" => {
                write(&dest.join("bin/ruby"), "\x7fELF");
                write(
                    &dest.join("bin/irb"),
                    "#!/tmp/staging/ruby/bin/ruby -w\nrequire 'irb'\n",
                );
            }
            "freetds" => write(&dest.join("lib/libsybdb.so"), ""),
            "openjdk1.8-latest" => write(&dest.join("bin/java"), "#!/bin/sh\n"),
            "rubygems" => write(&dest.join(format!("rubygems-{}/setup.rb", v)), ""),
            "node" => write(&dest.join(format!("node-v{}-linux-x64/bin/node", v)), ""),
            "yarn" => write(&dest.join(format!("yarn-v{}/bin/yarn", v)), ""),
            _ => fs::create_dir_all(dest).unwrap(),
        }
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install_dependency(&self, dep: &Dependency, dest: &Path) -> SupplyResult<()> {
        self.catalog.entry(dep)?;
        Self::lay_out(dep, dest);
        self.installs
            .lock()
            .unwrap()
            .push((dep.clone(), dest.to_path_buf()));
        Ok(())
    }

    async fn install_only_version(&self, name: &str, dest: &Path) -> SupplyResult<()> {
        let versions = self.catalog.all_versions(name);
        let [version] = versions.as_slice() else {
            return Err(SupplyError::AmbiguousVersion {
                name: name.to_string(),
                count: versions.len(),
            });
        };
        self.install_dependency(&Dependency::new(name, version.clone()), dest)
            .await
    }
}

#[derive(Default)]
struct RunnerScript {
    node_present: bool,
    gem_version: Option<String>,
    failing: Vec<String>,
}

/// Records every command and simulates the few tools the pipeline inspects
#[derive(Default)]
pub struct FakeRunner {
    commands: Mutex<Vec<CommandSpec>>,
    script: Mutex<RunnerScript>,
}

impl FakeRunner {
    pub fn set_node_present(&self, present: bool) {
        self.script.lock().unwrap().node_present = present;
    }

    pub fn set_gem_version(&self, version: &str) {
        self.script.lock().unwrap().gem_version = Some(version.to_string());
    }

    /// Fail commands whose display starts with `prefix`
    pub fn fail_on(&self, prefix: &str) {
        self.script.lock().unwrap().failing.push(prefix.to_string());
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.to_string().starts_with(prefix))
            .count()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    pub fn find(&self, prefix: &str) -> Option<CommandSpec> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.to_string().starts_with(prefix))
            .cloned()
    }

    fn arg_after(spec: &CommandSpec, flag: &str) -> Option<PathBuf> {
        spec.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| spec.args.get(i + 1))
            .map(PathBuf::from)
    }

    fn simulate(&self, spec: &CommandSpec) -> SupplyResult<String> {
        self.commands.lock().unwrap().push(spec.clone());
        let line = spec.to_string();
        let script = self.script.lock().unwrap();

        if script.failing.iter().any(|p| line.starts_with(p.as_str())) {
            return Err(SupplyError::CommandStatus {
                command: line,
                code: 1,
            });
        }

        if line == "node --version" {
            return if script.node_present {
                Ok("v20.11.0\n".to_string())
            } else {
                Err(SupplyError::command_exec(line, "node: not found"))
            };
        }
        if line == "gem --version" {
            return Ok(format!(
                "{}\n",
                script.gem_version.as_deref().unwrap_or("3.4.10")
            ));
        }
        if line == "bundle exec rake secret" {
            return Ok("generated-secret\n".to_string());
        }
        if line.starts_with("bundle install") {
            if let Some(binstubs) = Self::arg_after(spec, "--binstubs") {
                write(&binstubs.join("rackup"), "#!/usr/bin/env ruby\n");
            }
            let config = spec.dir.join(".bundle/config");
            let mut content = fs::read_to_string(&config).unwrap_or_default();
            content.push_str("BUNDLE_PATH: \"vendor_bundle\"\n");
            write(&config, &content);
        }
        if line.starts_with("bundle binstubs") {
            if let Some(binstubs) = Self::arg_after(spec, "--path") {
                write(&binstubs.join("bundle"), "#!/usr/bin/env ruby\n");
            }
        }
        Ok(String::new())
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> SupplyResult<()> {
        self.simulate(spec).map(|_| ())
    }

    async fn output(&self, spec: &CommandSpec) -> SupplyResult<String> {
        self.simulate(spec)
    }
}

#[derive(Default)]
struct CacheShared {
    persisted: CacheMetadata,
    restores: usize,
    saves: usize,
}

/// Cache keeping metadata in memory across supplier instances
#[derive(Clone, Default)]
pub struct MemoryCache {
    shared: Arc<Mutex<CacheShared>>,
    metadata: CacheMetadata,
}

impl MemoryCache {
    pub fn saved_secret(&self) -> String {
        self.shared.lock().unwrap().persisted.secret_key_base.clone()
    }

    pub fn restores(&self) -> usize {
        self.shared.lock().unwrap().restores
    }

    pub fn saves(&self) -> usize {
        self.shared.lock().unwrap().saves
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn restore(&mut self) -> SupplyResult<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.restores += 1;
        self.metadata = shared.persisted.clone();
        Ok(())
    }

    async fn save(&mut self) -> SupplyResult<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.saves += 1;
        shared.persisted = self.metadata.clone();
        Ok(())
    }

    fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut CacheMetadata {
        &mut self.metadata
    }
}

/// Hard-link scratch that remembers where each copy was placed
#[derive(Default)]
pub struct RecordingScratch {
    copies: Mutex<Vec<PathBuf>>,
}

impl RecordingScratch {
    pub fn count(&self) -> usize {
        self.copies.lock().unwrap().len()
    }

    pub fn all_removed(&self) -> bool {
        self.copies.lock().unwrap().iter().all(|p| !p.exists())
    }
}

impl ScratchSpace for RecordingScratch {
    fn copy_to_scratch(&self, dir: &Path) -> SupplyResult<ScratchCopy> {
        let copy = HardLinkScratch.copy_to_scratch(dir)?;
        self.copies.lock().unwrap().push(copy.path().to_path_buf());
        Ok(copy)
    }
}

/// Build, cache and deps dirs plus fakes for one application
pub struct Harness {
    root: TempDir,
    catalog: Arc<TomlCatalog>,
    pub installer: Arc<FakeInstaller>,
    pub runner: Arc<FakeRunner>,
    pub cache: MemoryCache,
    pub scratch: Arc<RecordingScratch>,
}

impl Harness {
    pub fn new(gemfile: Option<&str>, lock: Option<&str>) -> Self {
        Self::with_manifest(gemfile, lock, MANIFEST)
    }

    pub fn with_manifest(gemfile: Option<&str>, lock: Option<&str>, manifest: &str) -> Self {
        let root = TempDir::new().unwrap();
        let build = root.path().join("build");
        fs::create_dir_all(&build).unwrap();
        if let Some(gemfile) = gemfile {
            write(&build.join("Gemfile"), gemfile);
        }
        if let Some(lock) = lock {
            write(&build.join("Gemfile.lock"), lock);
        }

        let catalog = Arc::new(TomlCatalog::parse(manifest).unwrap());
        Self {
            installer: Arc::new(FakeInstaller::new(catalog.clone())),
            catalog,
            runner: Arc::new(FakeRunner::default()),
            cache: MemoryCache::default(),
            scratch: Arc::new(RecordingScratch::default()),
            root,
        }
    }

    pub fn build(&self) -> PathBuf {
        self.root.path().join("build")
    }

    /// Path inside the dependency area
    pub fn dep(&self, rel: &str) -> PathBuf {
        self.root.path().join("deps").join("0").join(rel)
    }

    pub fn env_file_opt(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.dep("env").join(name)).ok()
    }

    pub fn env_file(&self, name: &str) -> String {
        self.env_file_opt(name)
            .unwrap_or_else(|| panic!("env file {} was not written", name))
    }

    pub fn supplier(&self) -> Supplier {
        self.supplier_with_env(EnvOverlay::from_vars([("PATH", "/usr/bin")]))
    }

    pub fn supplier_with_env(&self, env: EnvOverlay) -> Supplier {
        let stager = Stager::new(
            self.build(),
            self.root.path().join("cache"),
            self.root.path().join("deps"),
            "0",
        );
        let collaborators = Collaborators {
            catalog: self.catalog.clone(),
            installer: self.installer.clone(),
            runner: self.runner.clone(),
            app: Arc::new(GemfileInspector::new(self.build().join("Gemfile"))),
            cache: Box::new(self.cache.clone()),
            scratch: self.scratch.clone(),
        };
        Supplier::new(stager, collaborators, env).with_options(SupplyOptions {
            export_environment: false,
            ..SupplyOptions::default()
        })
    }
}
