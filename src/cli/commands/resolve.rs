//! Resolve command - pick the highest catalog version matching a constraint

use crate::catalog::{Catalog, TomlCatalog};
use crate::cli::args::ResolveArgs;
use crate::error::{SupplyError, SupplyResult};
use crate::version::find_matching_version;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs) -> SupplyResult<()> {
    let catalog = TomlCatalog::from_file(&args.catalog)
        .await?
        .with_stack(args.stack);
    let version = find_matching_version(&args.constraint, &catalog.all_versions(&args.name))
        .map_err(|source| SupplyError::Resolution {
            name: args.name.clone(),
            source,
        })?;
    println!("{}", version);
    Ok(())
}
