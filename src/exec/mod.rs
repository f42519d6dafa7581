//! Child process execution
//!
//! Every external tool (`bundle`, `gem`, `node`, `ruby setup.rb`) is
//! launched through [`CommandRunner`] so the supply pipeline can be driven by
//! fakes in tests. The environment overlay is passed explicitly on each
//! [`CommandSpec`] rather than through the process environment.

mod system;

pub use system::SystemCommand;

use crate::error::SupplyResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Description of one child process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub dir: PathBuf,
    /// Variables set on top of the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Create a spec running `program` in `dir`
    pub fn new(program: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: dir.as_ref().to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables for the child
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Abstract process launcher
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, streaming indented output; non-zero exit is an error
    async fn run(&self, spec: &CommandSpec) -> SupplyResult<()>;

    /// Run to completion and return stdout; non-zero exit is an error
    async fn output(&self, spec: &CommandSpec) -> SupplyResult<String>;

    /// Whether the program runs successfully, used for availability probes
    async fn succeeds(&self, spec: &CommandSpec) -> bool {
        self.output(spec).await.is_ok()
    }
}
