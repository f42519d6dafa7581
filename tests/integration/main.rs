//! Integration tests for gemstage

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[[default_versions]]
name = "ruby"
version = "3.2.x"

[[dependencies]]
name = "ruby"
version = "3.1.4"
uri = "ruby-3.1.4.tgz"

[[dependencies]]
name = "ruby"
version = "3.2.2"
uri = "ruby-3.2.2.tgz"

[[dependencies]]
name = "bundler"
version = "2.4.19"
uri = "bundler-2.4.19.tgz"
"#;

    /// Command with a config path that does not exist, so defaults apply
    fn gemstage(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("gemstage");
        cmd.env("GEMSTAGE_CONFIG", config_dir.path().join("config.toml"))
            .env_remove("GEMSTAGE_CATALOG")
            .env_remove("CF_STACK");
        cmd
    }

    fn manifest(dir: &Path, content: &str) -> std::path::PathBuf {
        let path = dir.join("manifest.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Supply stage for Ruby application buildpacks"));
    }

    #[test]
    fn version_displays() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gemstage"));
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let cfg = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        fs::write(app.path().join("Gemfile"), "gem 'rack'\n").unwrap();

        let first = gemstage(&cfg)
            .args(["fingerprint"])
            .arg(app.path())
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let digest = String::from_utf8(first).unwrap();
        assert_eq!(digest.trim().len(), 64);
        assert!(digest.trim().chars().all(|c| c.is_ascii_hexdigit()));

        gemstage(&cfg)
            .args(["fingerprint"])
            .arg(app.path())
            .assert()
            .success()
            .stdout(predicate::eq(digest.as_str()));
    }

    #[test]
    fn fingerprint_ignores_bookkeeping_dir() {
        let cfg = TempDir::new().unwrap();
        let app = TempDir::new().unwrap();
        fs::write(app.path().join("Gemfile"), "gem 'rack'\n").unwrap();
        let before = gemstage(&cfg)
            .arg("fingerprint")
            .arg(app.path())
            .output()
            .unwrap()
            .stdout;

        fs::create_dir_all(app.path().join(".cloudfoundry")).unwrap();
        fs::write(app.path().join(".cloudfoundry/state"), "x").unwrap();
        gemstage(&cfg)
            .arg("fingerprint")
            .arg(app.path())
            .assert()
            .success()
            .stdout(predicate::eq(before));
    }

    #[test]
    fn fingerprint_missing_dir_fails() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .args(["fingerprint", "/nonexistent/gemstage/app"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn resolve_picks_highest_match() {
        let cfg = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let path = manifest(dir.path(), MANIFEST);

        gemstage(&cfg)
            .args(["resolve", "ruby", "3.x", "--catalog"])
            .arg(&path)
            .assert()
            .success()
            .stdout("3.2.2\n");

        gemstage(&cfg)
            .args(["resolve", "ruby", "~> 3.1.0", "--catalog"])
            .arg(&path)
            .assert()
            .success()
            .stdout("3.1.4\n");
    }

    #[test]
    fn resolve_without_match_fails_with_hint() {
        let cfg = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let path = manifest(dir.path(), MANIFEST);

        gemstage(&cfg)
            .args(["resolve", "bundler", "1.X.X", "--catalog"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unable to resolve bundler"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_manifest_fails() {
        let cfg = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        let path = manifest(dir.path(), "[[dependencies]]\nname = 1\n");

        gemstage(&cfg)
            .args(["resolve", "ruby", "3.x", "--catalog"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid buildpack manifest"));
    }

    #[test]
    fn config_path_follows_env() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[bundler]"))
            .stdout(predicate::str::contains("vendor_bundle"));
    }

    #[test]
    fn config_init_creates_file() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg).args(["config", "init"]).assert().success();
        let written = fs::read_to_string(cfg.path().join("config.toml")).unwrap();
        assert!(written.contains("asset_gems"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let cfg = TempDir::new().unwrap();
        fs::write(cfg.path().join("config.toml"), "[bundler]\njobs = \"many\"\n").unwrap();
        gemstage(&cfg)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn completions_generate() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gemstage"));
    }

    #[test]
    fn supply_requires_catalog() {
        let cfg = TempDir::new().unwrap();
        gemstage(&cfg)
            .args(["supply", "/tmp/app", "/tmp/cache", "/tmp/deps", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--catalog"));
    }
}

#[cfg(unix)]
mod supply_tests {
    use assert_cmd::cargo::cargo_bin_cmd;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn tarball(root: &Path, name: &str, files: &[(&str, &str)]) {
        let file = fs::File::create(root.join(format!("{}.tgz", name))).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (rel, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(if rel.starts_with("bin/") { 0o755 } else { 0o644 });
            builder.append_data(&mut header, rel, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    /// Buildpack with local archives for an application without a Gemfile
    fn buildpack(root: &Path) -> std::path::PathBuf {
        tarball(root, "freetds", &[("lib/libsybdb.so", "")]);
        tarball(
            root,
            "bundler",
            &[
                ("bin/bundle", "#!/usr/bin/env ruby\n"),
                ("gems/bundler-1.17.3/lib/bundler.rb", "module Bundler; end\n"),
                ("specifications/bundler-1.17.3.gemspec", ""),
            ],
        );
        tarball(
            root,
            "ruby",
            &[
                ("bin/ruby", "#!/bin/sh\n"),
                ("bin/irb", "#!/build/ruby/bin/ruby -w\nrequire 'irb'\n"),
            ],
        );
        let manifest = root.join("manifest.toml");
        fs::write(
            &manifest,
            r#"
[[default_versions]]
name = "ruby"
version = "3.2.x"

[[default_versions]]
name = "freetds"
version = "1.x"

[[dependencies]]
name = "freetds"
version = "1.3.17"
uri = "freetds.tgz"

[[dependencies]]
name = "bundler"
version = "1.17.3"
uri = "bundler.tgz"

[[dependencies]]
name = "ruby"
version = "3.2.2"
uri = "ruby.tgz"
"#,
        )
        .unwrap();
        manifest
    }

    #[test]
    fn supply_without_gemfile() {
        let root = TempDir::new().unwrap();
        let manifest = buildpack(root.path());
        let build = root.path().join("app");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("config.ru"), "run ->(env) { [200, {}, []] }\n").unwrap();

        cargo_bin_cmd!("gemstage")
            .env("GEMSTAGE_CONFIG", root.path().join("config.toml"))
            .env("CF_STACK", "cflinuxfs4")
            .env_remove("RAILS_ENV")
            .env_remove("BUNDLE_GEMFILE")
            .args(["supply"])
            .arg(&build)
            .arg(root.path().join("cache"))
            .arg(root.path().join("deps"))
            .arg("0")
            .arg("--catalog")
            .arg(&manifest)
            .arg("--offline")
            .assert()
            .success()
            .stdout(predicate::str::contains("-----> Supplying Ruby"));

        let dep = root.path().join("deps/0");
        assert_eq!(
            fs::read_to_string(dep.join("env/RAILS_ENV")).unwrap(),
            "production"
        );
        assert!(dep.join("profile.d/finalize_freetds.sh").exists());
        let ruby_sh = fs::read_to_string(dep.join("profile.d/ruby.sh")).unwrap();
        assert!(ruby_sh.contains("vendor_bundle/ruby/3.2.0"));
        assert!(!ruby_sh.contains("SECRET_KEY_BASE"));
        assert!(dep.join("bin/ruby").exists());
        assert!(dep.join("bin/bundle").exists());
        assert!(fs::read_to_string(dep.join("ruby/bin/irb"))
            .unwrap()
            .starts_with("#!/usr/bin/env ruby\n"));
        assert!(!dep.join("bundler2").exists());

        let metadata = fs::read_to_string(root.path().join("cache/metadata.json")).unwrap();
        assert!(metadata.contains("cflinuxfs4"));
    }

    #[test]
    fn supply_reports_failing_step() {
        let root = TempDir::new().unwrap();
        let manifest = root.path().join("manifest.toml");
        fs::write(&manifest, "[[dependencies]]\nname = \"ruby\"\nversion = \"3.2.2\"\nuri = \"ruby.tgz\"\n")
            .unwrap();
        let build = root.path().join("app");
        fs::create_dir_all(&build).unwrap();

        cargo_bin_cmd!("gemstage")
            .env("GEMSTAGE_CONFIG", root.path().join("config.toml"))
            .args(["supply"])
            .arg(&build)
            .arg(root.path().join("cache"))
            .arg(root.path().join("deps"))
            .arg("0")
            .arg("--catalog")
            .arg(&manifest)
            .assert()
            .failure()
            .stderr(predicate::str::contains("supply_freetds failed"));
    }
}
