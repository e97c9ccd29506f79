//! List command - prints the catalog grouped by type.

use anyhow::Result;
use config::Config;
use database::Catalog;
use model_structs::{ModelListing, ModelType};
use tracing::info;

use super::output::{print_json, print_table};

/// Runs the list command. An empty catalog is scanned first.
///
/// # Errors
///
/// Returns an error if the catalog fails.
pub async fn run(
    catalog: &Catalog,
    config: &Config,
    model_type: Option<ModelType>,
    json: bool,
) -> Result<()> {
    if catalog.count().await? == 0 {
        info!("Catalog is empty, scanning first");
        super::scan::run(catalog, config, false).await?;
    }

    let listings = load_listings(catalog).await?;
    let rows: Vec<&ModelListing> = listings
        .iter()
        .filter(|row| model_type.is_none_or(|wanted| row.model_type == wanted))
        .collect();

    if json {
        print_json(&rows)?;
    } else {
        print_table(&rows);
    }

    Ok(())
}

/// Loads the whole catalog as display rows.
///
/// # Errors
///
/// Returns an error if the catalog fails.
pub async fn load_listings(catalog: &Catalog) -> Result<Vec<ModelListing>> {
    Ok(catalog
        .list_all()
        .await?
        .into_iter()
        .map(ModelListing::from)
        .collect())
}
