//! Search command - filters the catalog by free text.

use anyhow::Result;
use database::Catalog;
use model_structs::filter_listings;

use super::list::load_listings;
use super::output::{print_json, print_table};

/// Runs the search command.
///
/// # Errors
///
/// Returns an error if the catalog fails.
pub async fn run(catalog: &Catalog, query: &str, json: bool) -> Result<()> {
    let listings = load_listings(catalog).await?;
    let rows = filter_listings(&listings, query);

    if json {
        print_json(&rows)?;
    } else {
        print_table(&rows);
    }

    Ok(())
}
