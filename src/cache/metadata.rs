//! Cache metadata record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Facts carried between deployments alongside the cached artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Rails secret generated on first deploy, reused afterwards
    #[serde(default)]
    pub secret_key_base: String,

    /// Stack the artifacts were built on
    #[serde(default)]
    pub stack: String,

    /// When the cache was last saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl CacheMetadata {
    /// Whether artifacts built on `stack` can be reused for `current`.
    ///
    /// A record without a stack predates stack tracking and is trusted.
    pub fn matches_stack(&self, current: &str) -> bool {
        self.stack.is_empty() || self.stack == current
    }
}
