//! Regex-based Gemfile and Gemfile.lock reader

use super::{AppManifest, RubyDirective};
use crate::error::{SupplyError, SupplyResult};
use crate::version::{satisfies, GemVersion};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static RUBY_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*ruby(?:\s+|\s*\(\s*)(?:['"]([^'"]+)['"])?\s*,?\s*(.*)$"#)
        .expect("ruby directive pattern is valid")
});

static LOCKED_SPEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^    ([A-Za-z0-9_.\-]+) \(([^)]+)\)\s*$").expect("lock spec pattern is valid")
});

/// Value of a `key: 'value'` or `:key => 'value'` option
fn option_value(options: &str, key: &str) -> Option<String> {
    let pattern = format!(
        r#"(?:\b{key}:\s*|:{key}\s*=>\s*)['"]([^'"]+)['"]"#,
        key = regex::escape(key)
    );
    Regex::new(&pattern)
        .ok()?
        .captures(options)
        .map(|c| c[1].to_string())
}

/// Reads the application's Gemfile and lock file from disk on demand
#[derive(Debug, Clone)]
pub struct GemfileInspector {
    gemfile: PathBuf,
    lockfile: PathBuf,
}

impl GemfileInspector {
    /// Inspector for the Gemfile at `gemfile`; the lock file sits next to it
    pub fn new(gemfile: impl Into<PathBuf>) -> Self {
        let gemfile = gemfile.into();
        let mut lock = gemfile.clone().into_os_string();
        lock.push(".lock");
        Self {
            gemfile,
            lockfile: PathBuf::from(lock),
        }
    }

    /// Path of the lock file
    pub fn lockfile(&self) -> &Path {
        &self.lockfile
    }

    fn read_optional(path: &Path) -> SupplyResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SupplyError::io(format!("reading {}", path.display()), e)),
        }
    }

    /// Lines of the named top-level lock file section
    fn lock_section(lock: &str, header: &str) -> Vec<String> {
        lock.lines()
            .skip_while(|line| line.trim_end() != header)
            .skip(1)
            .take_while(|line| line.starts_with(' '))
            .map(|line| line.to_string())
            .collect()
    }

    /// Locked `(name, version)` pairs, platform suffixes removed
    fn locked_specs(lock: &str) -> Vec<(String, String)> {
        lock.lines()
            .filter_map(|line| LOCKED_SPEC.captures(line))
            .map(|c| {
                let version = c[2].split('-').next().unwrap_or(&c[2]).to_string();
                (c[1].to_string(), version)
            })
            .collect()
    }

    fn declares_gem(gemfile: &str, gem: &str) -> bool {
        let pattern = format!(r#"(?m)^\s*gem\s*\(?\s*['"]{}['"]"#, regex::escape(gem));
        Regex::new(&pattern)
            .map(|re| re.is_match(gemfile))
            .unwrap_or(false)
    }

    fn parse_directive(&self, gemfile: &str) -> SupplyResult<Option<RubyDirective>> {
        let Some(caps) = gemfile
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .find_map(|line| RUBY_DIRECTIVE.captures(line))
        else {
            return Ok(None);
        };

        let options = caps.get(2).map_or("", |m| m.as_str());
        let mut version = caps.get(1).map(|m| m.as_str().trim().to_string());

        if version.is_none() {
            if let Some(file) = option_value(options, "file") {
                let dir = self.gemfile.parent().unwrap_or_else(|| Path::new("."));
                let path = dir.join(file);
                let content = fs::read_to_string(&path)
                    .map_err(|e| SupplyError::io(format!("reading {}", path.display()), e))?;
                version = Some(content.trim().trim_start_matches("ruby-").to_string());
            }
        }

        let directive = RubyDirective {
            version,
            engine: option_value(options, "engine"),
            engine_version: option_value(options, "engine_version"),
        };
        debug!("Gemfile ruby directive: {:?}", directive);
        Ok(Some(directive))
    }
}

impl AppManifest for GemfileInspector {
    fn gemfile(&self) -> &Path {
        &self.gemfile
    }

    fn ruby_directive(&self) -> SupplyResult<Option<RubyDirective>> {
        match Self::read_optional(&self.gemfile)? {
            Some(content) => self.parse_directive(&content),
            None => Ok(None),
        }
    }

    fn has_gem_version(&self, gem: &str, constraint: &str) -> SupplyResult<bool> {
        let check = |version: &str| {
            satisfies(version, constraint).map_err(|source| SupplyError::Resolution {
                name: gem.to_string(),
                source,
            })
        };

        if let Some(lock) = Self::read_optional(&self.lockfile)? {
            for (name, version) in Self::locked_specs(&lock) {
                if name == gem {
                    return check(&version);
                }
            }
            return Ok(false);
        }

        // Without a lock file a declared gem counts as its lowest version
        match Self::read_optional(&self.gemfile)? {
            Some(gemfile) if Self::declares_gem(&gemfile, gem) => check("0"),
            _ => Ok(false),
        }
    }

    fn bundled_with(&self) -> SupplyResult<Option<String>> {
        let Some(lock) = Self::read_optional(&self.lockfile)? else {
            return Ok(None);
        };
        Ok(Self::lock_section(&lock, "BUNDLED WITH")
            .first()
            .map(|line| line.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    fn has_windows_gemfile_lock(&self) -> SupplyResult<bool> {
        let Some(lock) = Self::read_optional(&self.lockfile)? else {
            return Ok(false);
        };
        let platforms: Vec<String> = Self::lock_section(&lock, "PLATFORMS")
            .iter()
            .map(|line| line.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(!platforms.is_empty()
            && platforms
                .iter()
                .all(|p| p.contains("mingw") || p.contains("mswin")))
    }

    fn check_bundler2_compatibility(&self) -> SupplyResult<bool> {
        let compat = |e: SupplyError| SupplyError::CompatibilityCheck(e.to_string());

        let directive = self.ruby_directive().map_err(compat)?;
        let declared_engine = directive
            .as_ref()
            .and_then(|d| d.engine.as_deref())
            .unwrap_or("ruby");

        if declared_engine == "ruby" {
            if let Some(version) = directive.as_ref().and_then(|d| d.version.as_deref()) {
                let lowest = lowest_version(version)?;
                if !satisfies(lowest.as_str(), ">= 2.3.0")
                    .map_err(|e| SupplyError::CompatibilityCheck(e.to_string()))?
                {
                    debug!("Ruby {} predates Bundler 2", version);
                    return Ok(false);
                }
            }
        }

        if let Some(bundled) = self.bundled_with().map_err(compat)? {
            let bundled = GemVersion::parse(&bundled).map_err(|e| {
                SupplyError::CompatibilityCheck(format!("BUNDLED WITH {}: {}", bundled, e))
            })?;
            if bundled.major() < 2 {
                debug!("Gemfile.lock bundled with {}", bundled);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Lowest version a declared Ruby version or constraint admits, e.g.
/// `~> 2.7.0` and `>= 2.7` both give `2.7`
fn lowest_version(declared: &str) -> SupplyResult<GemVersion> {
    let bare = declared
        .trim()
        .trim_start_matches(|c: char| "~>=< ".contains(c));
    let bare = bare.split(['p', ',', ' ']).next().unwrap_or(bare);
    let bare = bare.trim_end_matches(|c: char| c == '.' || c == 'x' || c == 'X' || c == '*');
    GemVersion::parse(bare).map_err(|e| {
        SupplyError::CompatibilityCheck(format!("declared Ruby version {}: {}", declared, e))
    })
}
