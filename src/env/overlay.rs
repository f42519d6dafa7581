//! Explicit environment overlay
//!
//! A snapshot of the process environment taken once, with this run's
//! assignments layered on top. Steps read and write the overlay; the real
//! process environment is only touched by [`EnvOverlay::export_to_process`].

use std::collections::BTreeMap;

/// Process environment snapshot plus this run's assignments
#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    base: BTreeMap<String, String>,
    assigned: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// Snapshot the current process environment
    pub fn from_process() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build an overlay over an explicit base environment
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            base: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            assigned: BTreeMap::new(),
        }
    }

    /// Effective value: this run's assignment, else the snapshot
    pub fn get(&self, name: &str) -> Option<&str> {
        self.assigned
            .get(name)
            .or_else(|| self.base.get(name))
            .map(String::as_str)
    }

    /// Effective value or the empty string
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Whether `name` has a non-empty effective value
    pub fn is_set(&self, name: &str) -> bool {
        !self.get_or_empty(name).is_empty()
    }

    /// Assign a value for the rest of the run
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.assigned.insert(name.into(), value.into());
    }

    /// Variables assigned during this run, for child processes
    pub fn assigned(&self) -> &BTreeMap<String, String> {
        &self.assigned
    }

    /// Write this run's assignments into the real process environment
    pub fn export_to_process(&self) {
        for (name, value) in &self.assigned {
            std::env::set_var(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn assignments_shadow_snapshot() {
        let mut env = EnvOverlay::from_vars([("RACK_ENV", "staging")]);
        assert_eq!(env.get("RACK_ENV"), Some("staging"));
        env.set("RACK_ENV", "production");
        assert_eq!(env.get("RACK_ENV"), Some("production"));
        assert_eq!(env.assigned().len(), 1);
    }

    #[test]
    fn empty_value_is_not_set() {
        let env = EnvOverlay::from_vars([("BUNDLE_WITHOUT", "")]);
        assert!(!env.is_set("BUNDLE_WITHOUT"));
        assert!(!env.is_set("MISSING"));
        assert_eq!(env.get_or_empty("MISSING"), "");
    }

    #[test]
    #[serial]
    fn export_writes_process_environment() {
        let mut env = EnvOverlay::from_vars(Vec::<(String, String)>::new());
        env.set("GEMSTAGE_OVERLAY_TEST", "exported");
        env.export_to_process();
        assert_eq!(
            std::env::var("GEMSTAGE_OVERLAY_TEST").unwrap(),
            "exported"
        );
        std::env::remove_var("GEMSTAGE_OVERLAY_TEST");
    }
}
