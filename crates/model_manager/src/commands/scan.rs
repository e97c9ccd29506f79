//! Scan command - reconciles the model folders with the catalog.

use anyhow::{Context, Result};
use config::Config;
use database::Catalog;
use model_scanner::{ScanConfig, ScanStats, scan};
use tracing::info;

/// Builds the scan configuration from the application configuration.
#[must_use]
pub fn scan_config(config: &Config, force: bool) -> ScanConfig {
    ScanConfig {
        roots: config.model_roots(),
        extensions: config.model_extensions(),
        force,
    }
}

/// Runs the scan command.
///
/// # Errors
///
/// Returns an error if the catalog fails.
pub async fn run(catalog: &Catalog, config: &Config, force: bool) -> Result<ScanStats> {
    info!(
        base = %config.base_models_path.display(),
        force,
        "Scanning model folders"
    );

    let stats = scan(catalog, &scan_config(config, force))
        .await
        .context("Scan failed")?;

    println!(
        "Scan complete: {} files, {} fingerprinted, {} unchanged, {} removed, {} errors",
        stats.files_seen, stats.hashed, stats.unchanged, stats.removed, stats.errors
    );

    Ok(stats)
}
