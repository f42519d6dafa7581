//! UI module for buildpack-style staging output
//!
//! Staging logs are read in the platform's deploy output, so everything is
//! plain text with the conventional `----->` step headers and a seven-space
//! indent for detail lines. Colors and spinners are only used when attached
//! to a terminal.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemstage::ui::{self, UiContext, DownloadProgress};
//!
//! let ctx = UiContext::detect();
//! ui::step(&ctx, "Supplying Ruby");
//! let progress = DownloadProgress::new(&ctx, "ruby 2.7.1");
//! // ... fetch ...
//! progress.finish();
//! ui::warning(&ctx, "You have not declared a Ruby version in your Gemfile.");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{indent, indented, info, step, warning, INDENT};
pub use progress::DownloadProgress;
