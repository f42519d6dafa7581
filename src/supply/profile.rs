//! Startup fragments written under `<dep>/profile.d`

use super::{RunContext, SupplyState, Supplier};
use crate::error::{SupplyError, SupplyResult};
use crate::ui;
use tracing::debug;

pub(super) const FREETDS_SCRIPT: &str = r#"#!/bin/bash
# https://github.com/rails-sqlserver/tiny_tds/blob/master/ext/tiny_tds/extconf.rb#L38
export FREETDS_DIR="$( cd /home/vcap/deps/*/freetds && pwd )"

# https://www.freetds.org/faq.html#SYBASE
export SYBASE=$FREETDS_DIR

export LD_LIBRARY_PATH="${FREETDS_DIR}/lib:${LD_LIBRARY_PATH:-/usr/local/lib}"
export LD_RUN_PATH="${FREETDS_DIR}/lib:${LD_RUN_PATH:-/usr/local/lib}"
export LIBRARY_PATH="${FREETDS_DIR}/lib:${LIBRARY_PATH:-/usr/local/lib}"
"#;

pub(super) const JRUBY_SCRIPT: &str = r#"
if ! [[ "${JAVA_OPTS}" == *-Xmx* ]]; then
  export JAVA_MEM=${JAVA_MEM:--Xmx${JVM_MAX_HEAP:-384}m}
fi
export JAVA_OPTS=${JAVA_OPTS:--Xss512k -XX:+UseCompressedOops -Dfile.encoding=UTF-8}
export JRUBY_OPTS=${JRUBY_OPTS:--Xcompile.invokedynamic=false}
"#;

/// Prepends the application's `ld_library_path` dir at startup
pub(super) fn app_lib_path_script() -> String {
    r#"export LD_LIBRARY_PATH="$HOME/ld_library_path$([[ ! -z "${LD_LIBRARY_PATH:-}" ]] && echo ":$LD_LIBRARY_PATH")""#
        .to_string()
}

/// `ruby.sh`: runtime defaults relative to `$DEPS_DIR`
pub(super) fn ruby_script(
    deps_idx: &str,
    engine: &str,
    ruby_engine_version: &str,
    bundle_without: &str,
) -> String {
    let bundle_path = format!(
        "$DEPS_DIR/{}/vendor_bundle/{}/{}",
        deps_idx, engine, ruby_engine_version
    );
    format!(
        r#"
export LANG=${{LANG:-en_US.UTF-8}}
export RAILS_ENV=${{RAILS_ENV:-production}}
export RACK_ENV=${{RACK_ENV:-production}}
export RAILS_SERVE_STATIC_FILES=${{RAILS_SERVE_STATIC_FILES:-enabled}}
export RAILS_LOG_TO_STDOUT=${{RAILS_LOG_TO_STDOUT:-enabled}}
export BUNDLE_GEMFILE=${{BUNDLE_GEMFILE:-$HOME/Gemfile}}

export GEM_HOME=${{GEM_HOME:-$DEPS_DIR/{idx}/gem_home}}
export GEM_PATH=${{GEM_PATH:-{bundle_path}:$DEPS_DIR/{idx}/gem_home:$DEPS_DIR/{idx}/bundler}}
export BUNDLE_PATH=${{BUNDLE_PATH:-{bundle_path}}}

## Change to current DEPS_DIR
bundle config PATH "$DEPS_DIR/{idx}/vendor_bundle" > /dev/null
bundle config WITHOUT "{without}" > /dev/null
"#,
        idx = deps_idx,
        bundle_path = bundle_path,
        without = bundle_without,
    )
}

impl Supplier {
    /// Rails secret from the cache metadata, generated on first use
    async fn secret_key_base(&mut self, ctx: &RunContext) -> SupplyResult<String> {
        let cached = &self.cache.metadata().secret_key_base;
        if !cached.is_empty() {
            debug!("Reusing cached secret_key_base");
            return Ok(cached.clone());
        }

        let secret = self
            .runner
            .output(&self.command("bundle", &ctx.build_dir).args(["exec", "rake", "secret"]))
            .await
            .map_err(|e| SupplyError::User(format!("Failed to run 'rake secret': {}", e)))?;
        let secret = secret.trim().to_string();
        self.cache.metadata_mut().secret_key_base = secret.clone();
        Ok(secret)
    }

    pub(super) async fn write_profile_d(
        &mut self,
        ctx: &RunContext,
        state: &mut SupplyState,
    ) -> SupplyResult<()> {
        ui::step(&self.ui, "Creating runtime environment");
        let runtime = state.runtime()?;
        let mut script = ruby_script(
            &ctx.deps_idx,
            runtime.engine.as_str(),
            &runtime.ruby_engine_version()?,
            self.env.get_or_empty("BUNDLE_WITHOUT"),
        );

        if ctx.has_gemfile && ctx.has_gemfile_lock {
            let rails41 = self
                .app
                .has_gem_version("rails", ">=4.1.0.beta1")
                .map_err(|e| {
                    SupplyError::User(format!("Could not determine rails version: {}", e))
                })?;
            if rails41 {
                let secret = self.secret_key_base(ctx).await?;
                script.push_str(&format!(
                    "\nexport SECRET_KEY_BASE=${{SECRET_KEY_BASE:-{}}}\n",
                    secret
                ));
            }
        }

        self.materializer.write_profile_d("ruby.sh", &script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ruby_script_points_into_deps_dir() {
        let script = ruby_script("2", "ruby", "3.2.0", "development:test");
        assert!(script.contains("export GEM_HOME=${GEM_HOME:-$DEPS_DIR/2/gem_home}"));
        assert!(script.contains(
            "export BUNDLE_PATH=${BUNDLE_PATH:-$DEPS_DIR/2/vendor_bundle/ruby/3.2.0}"
        ));
        assert!(script.contains(
            "GEM_PATH:-$DEPS_DIR/2/vendor_bundle/ruby/3.2.0:$DEPS_DIR/2/gem_home:$DEPS_DIR/2/bundler}"
        ));
        assert!(script.contains("bundle config WITHOUT \"development:test\""));
    }

    #[test]
    fn app_lib_path_is_relative_to_home() {
        assert!(app_lib_path_script().starts_with("export LD_LIBRARY_PATH=\"$HOME/ld_library_path"));
    }
}
