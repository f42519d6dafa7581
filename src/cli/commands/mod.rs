//! CLI command implementations

pub mod completions;
pub mod config;
pub mod fingerprint;
pub mod resolve;
pub mod supply;

pub use completions::execute as completions;
pub use config::execute as config;
pub use fingerprint::execute as fingerprint;
pub use resolve::execute as resolve;
pub use supply::execute as supply;
