//! Progress indicators with CI fallback

use super::context::UiContext;
use super::output::INDENT;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner shown while a dependency archive downloads
pub struct DownloadProgress {
    bar: Option<ProgressBar>,
}

impl DownloadProgress {
    /// Create a new download indicator.
    ///
    /// Shows an indicatif spinner in interactive mode, a plain line otherwise.
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .template("       {spinner:.cyan} Downloading {prefix}  {bytes:.dim}  {elapsed:.dim}")
            {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
            }
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("{}Downloading {}", INDENT, label);
            None
        };
        Self { bar }
    }

    /// Record the number of bytes received so far
    pub fn set_bytes(&self, bytes: u64) {
        if let Some(ref bar) = self.bar {
            bar.set_position(bytes);
        }
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
