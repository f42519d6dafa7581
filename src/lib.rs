//! gemstage - Ruby buildpack supply stage
//!
//! Installs the Ruby runtime, Bundler and an application's gems into the
//! buildpack dependency directory, and writes the environment files and
//! startup scripts the later stages read.

pub mod app;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod exec;
pub mod fingerprint;
pub mod fsutil;
pub mod install;
pub mod scratch;
pub mod stager;
pub mod supply;
pub mod ui;
pub mod version;

pub use error::{SupplyError, SupplyResult};
