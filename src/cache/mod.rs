//! Cache of installed artifacts between deployments
//!
//! Installed gems (`vendor_bundle`) are copied into the platform cache dir at
//! the end of a run and back into the dependency area at the start of the
//! next one, together with a small metadata record.
//!
//! # Restore rules
//!
//! | Cache state | Artifacts | Metadata |
//! |-------------|-----------|----------|
//! | absent | nothing restored | defaults |
//! | same stack | restored | loaded |
//! | stack changed | skipped | loaded |

pub mod metadata;
pub mod store;

pub use metadata::CacheMetadata;
pub use store::{CacheStore, METADATA_FILE};

use crate::error::SupplyResult;
use async_trait::async_trait;

/// Persistent cache of installed artifacts and metadata
#[async_trait]
pub trait Cache: Send + Sync {
    /// Bring cached artifacts and metadata into the dependency area
    async fn restore(&mut self) -> SupplyResult<()>;

    /// Persist artifacts and metadata for the next deployment
    async fn save(&mut self) -> SupplyResult<()>;

    /// Current metadata record
    fn metadata(&self) -> &CacheMetadata;

    /// Mutable metadata record, saved by the next [`Cache::save`]
    fn metadata_mut(&mut self) -> &mut CacheMetadata;
}
