//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// gemstage - Ruby buildpack supply stage
///
/// Installs the Ruby runtime, Bundler and the application's gems into a
/// dependency directory and records the environment later stages need.
#[derive(Parser, Debug)]
#[command(name = "gemstage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GEMSTAGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format (overrides general.log_format)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supply stage for an application
    Supply(SupplyArgs),

    /// Print the content fingerprint of a directory
    Fingerprint(FingerprintArgs),

    /// Resolve a version constraint against the buildpack manifest
    Resolve(ResolveArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the supply command
#[derive(Parser, Debug)]
pub struct SupplyArgs {
    /// Application build directory
    pub build_dir: PathBuf,

    /// Per-application cache directory
    pub cache_dir: PathBuf,

    /// Shared dependencies directory
    pub deps_dir: PathBuf,

    /// Index of this buildpack within the dependencies directory
    pub deps_idx: String,

    /// Buildpack manifest (TOML)
    #[arg(long, env = "GEMSTAGE_CATALOG")]
    pub catalog: PathBuf,

    /// Stack the application is staged on
    #[arg(long, env = "CF_STACK")]
    pub stack: Option<String>,

    /// Do not restore or save cached artifacts
    #[arg(long)]
    pub no_cache: bool,

    /// Only install archives available on local disk
    #[arg(long)]
    pub offline: bool,
}

/// Arguments for the fingerprint command
#[derive(Parser, Debug)]
pub struct FingerprintArgs {
    /// Directory to fingerprint
    pub dir: PathBuf,

    /// Relative path prefixes to leave out
    #[arg(long, default_value = ".cloudfoundry")]
    pub exclude: Vec<String>,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Dependency name, e.g. ruby
    pub name: String,

    /// Version constraint, e.g. "~> 3.2.0" or 2.x
    pub constraint: String,

    /// Buildpack manifest (TOML)
    #[arg(long, env = "GEMSTAGE_CATALOG")]
    pub catalog: PathBuf,

    /// Restrict to archives built for this stack
    #[arg(long, env = "CF_STACK")]
    pub stack: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Parse the `general.log_format` config value, defaulting to text
    pub fn from_config(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}
