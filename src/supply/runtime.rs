//! Runtime selection: which engine and version this run installs

use super::context::RunContext;
use crate::app::{AppManifest, Engine};
use crate::catalog::Catalog;
use crate::error::{SupplyError, SupplyResult};
use crate::version::{find_matching_version, GemVersion, VersionError};

/// Warning emitted when the Gemfile does not pin a Ruby version
pub const UNDECLARED_RUBY_WARNING: &str = "You have not declared a Ruby version in your Gemfile.";

/// Engine and concrete version chosen for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSelection {
    /// Engine to install
    pub engine: Engine,
    /// Catalog version of the engine, e.g. `3.2.2` or `9.4.3.0-ruby-3.1`
    pub version: String,
    /// Ruby language version the engine implements, e.g. `3.2.2` or `3.1`
    pub language_version: String,
}

impl RuntimeSelection {
    /// ABI directory name used by Rubygems, e.g. `3.2.0`
    pub fn ruby_engine_version(&self) -> SupplyResult<String> {
        let version = GemVersion::parse(&self.language_version).map_err(|source| {
            SupplyError::Resolution {
                name: self.engine.to_string(),
                source,
            }
        })?;
        let minor = version.number_at(1).unwrap_or(0);
        Ok(format!("{}.{}.0", version.major(), minor))
    }
}

/// Outcome of choosing the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Determined {
    pub selection: RuntimeSelection,
    /// Set when the catalog default was used for a Gemfile without a version
    pub warning: Option<String>,
}

fn resolve(name: &str, constraint: &str, catalog: &dyn Catalog) -> SupplyResult<String> {
    find_matching_version(constraint, &catalog.all_versions(name)).map_err(|source| {
        SupplyError::Resolution {
            name: name.to_string(),
            source,
        }
    })
}

fn ruby_default(catalog: &dyn Catalog) -> SupplyResult<RuntimeSelection> {
    let dep = catalog.default_version("ruby")?;
    Ok(RuntimeSelection {
        engine: Engine::Ruby,
        language_version: dep.version.clone(),
        version: dep.version,
    })
}

/// JRuby catalog versions are `<engine_version>-ruby-<major>.<minor>`
fn jruby_selection(
    declared_ruby: Option<&str>,
    engine_version: Option<&str>,
    catalog: &dyn Catalog,
) -> SupplyResult<RuntimeSelection> {
    let engine_version = engine_version.ok_or_else(|| {
        SupplyError::User("The jruby engine requires an engine_version in the Gemfile".to_string())
    })?;
    let candidates = catalog.all_versions("jruby");
    let prefix = format!("{}-ruby-", engine_version);

    let wanted = match declared_ruby {
        Some(ruby) => {
            let ruby = GemVersion::parse(ruby).map_err(|source| SupplyError::Resolution {
                name: "jruby".to_string(),
                source,
            })?;
            Some(format!(
                "{}{}.{}",
                prefix,
                ruby.major(),
                ruby.number_at(1).unwrap_or(0)
            ))
        }
        None => None,
    };

    let version = candidates
        .iter()
        .filter(|v| match &wanted {
            Some(w) => *v == w,
            None => v.starts_with(&prefix),
        })
        .filter_map(|v| GemVersion::parse(v).ok())
        .max()
        .map(|v| v.as_str().to_string())
        .ok_or_else(|| SupplyError::Resolution {
            name: "jruby".to_string(),
            source: VersionError::NoMatchingVersion {
                constraint: wanted.unwrap_or_else(|| format!("{}*", prefix)),
                candidates: candidates.clone(),
            },
        })?;

    let language_version = version
        .strip_prefix(&prefix)
        .unwrap_or_default()
        .to_string();
    Ok(RuntimeSelection {
        engine: Engine::JRuby,
        version,
        language_version,
    })
}

/// Choose the runtime for this run
pub fn determine(
    ctx: &RunContext,
    app: &dyn AppManifest,
    catalog: &dyn Catalog,
) -> SupplyResult<Determined> {
    if !ctx.has_gemfile {
        return Ok(Determined {
            selection: ruby_default(catalog)?,
            warning: None,
        });
    }

    let directive = app.ruby_directive()?.unwrap_or_default();
    match Engine::parse(&app.engine()?)? {
        Engine::Ruby => match directive.version.as_deref() {
            Some(constraint) => {
                let version = resolve("ruby", constraint, catalog)?;
                Ok(Determined {
                    selection: RuntimeSelection {
                        engine: Engine::Ruby,
                        language_version: version.clone(),
                        version,
                    },
                    warning: None,
                })
            }
            None => {
                let selection = ruby_default(catalog)?;
                let warning = format!(
                    "{}\nDefaulting to {}\nSee http://docs.cloudfoundry.org/buildpacks/ruby/index.html#runtime for more information.",
                    UNDECLARED_RUBY_WARNING, selection.version
                );
                Ok(Determined {
                    selection,
                    warning: Some(warning),
                })
            }
        },
        Engine::JRuby => Ok(Determined {
            selection: jruby_selection(
                directive.version.as_deref(),
                directive.engine_version.as_deref(),
                catalog,
            )?,
            warning: None,
        }),
    }
}
