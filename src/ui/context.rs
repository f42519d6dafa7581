//! Output mode detection
//!
//! Inside a platform stager (`CF_STACK` set) or a CI runner the output is a
//! plain log, so spinners and ANSI styles are turned off even when a pseudo
//! terminal is attached.

use std::ffi::OsString;
use std::io::IsTerminal;

/// Markers of non-interactive runners
const RUNNER_VARS: &[&str] = &["CF_STACK", "CI", "GITHUB_ACTIONS", "GITLAB_CI", "BUILDKITE"];

#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    terminal: bool,
    color: bool,
}

impl UiContext {
    /// Inspect stdout and the process environment
    pub fn detect() -> Self {
        Self::from_env(std::io::stdout().is_terminal(), |key| std::env::var_os(key))
    }

    /// Plain log output, as in staging
    pub fn non_interactive() -> Self {
        Self {
            terminal: false,
            color: false,
        }
    }

    fn from_env(is_terminal: bool, var: impl Fn(&str) -> Option<OsString>) -> Self {
        let under_runner = RUNNER_VARS.iter().any(|key| var(key).is_some());
        let terminal = is_terminal && !under_runner;
        Self {
            terminal,
            color: terminal && var("NO_COLOR").map_or(true, |v| v.is_empty()),
        }
    }

    /// Spinners and styled step headers
    pub fn use_fancy_output(&self) -> bool {
        self.terminal && self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(set: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<OsString> {
        move |key| {
            set.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn staging_is_plain() {
        assert!(!UiContext::non_interactive().use_fancy_output());
        assert!(!UiContext::from_env(true, vars(&[("CF_STACK", "cflinuxfs4")])).use_fancy_output());
    }

    #[test]
    fn terminal_without_runner_is_fancy() {
        assert!(UiContext::from_env(true, vars(&[])).use_fancy_output());
        assert!(!UiContext::from_env(false, vars(&[])).use_fancy_output());
    }

    #[test]
    fn no_color_disables_styles() {
        assert!(!UiContext::from_env(true, vars(&[("NO_COLOR", "1")])).use_fancy_output());
        assert!(UiContext::from_env(true, vars(&[("NO_COLOR", "")])).use_fancy_output());
    }
}
