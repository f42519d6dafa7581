//! Fingerprint command - print a directory's content digest

use crate::cli::args::FingerprintArgs;
use crate::error::{SupplyError, SupplyResult};
use crate::fingerprint;

/// Execute the fingerprint command
pub async fn execute(args: FingerprintArgs) -> SupplyResult<()> {
    if !args.dir.is_dir() {
        return Err(SupplyError::PathNotFound(args.dir));
    }
    let FingerprintArgs { dir, exclude } = args;
    let digest = tokio::task::spawn_blocking(move || {
        let exclude: Vec<&str> = exclude.iter().map(String::as_str).collect();
        fingerprint::compute(&dir, &exclude)
    })
    .await
    .map_err(|e| SupplyError::Internal(format!("fingerprint task failed: {}", e)))??;
    println!("{}", digest);
    Ok(())
}
