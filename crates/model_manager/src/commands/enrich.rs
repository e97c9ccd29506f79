//! Enrich command - looks models up on Civitai and merges the results.

use anyhow::{Context, Result};
use civitai_client::{
    CivitaiClient, EnrichError, EnrichmentEvent, EnrichmentJob, ItemStatus, JobOutcome, JobState,
};
use config::Config;
use database::Catalog;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Runs the enrich command over `ids`, or over every unchecked model.
///
/// Ctrl-C cancels the job at the next item; nothing is persisted then.
///
/// # Errors
///
/// Returns an error if the catalog fails or the HTTP client cannot be created.
pub async fn run(
    catalog: &Catalog,
    config: &Config,
    ids: Vec<String>,
    unchecked: bool,
) -> Result<()> {
    let ids = if unchecked {
        catalog
            .list_unchecked()
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect()
    } else {
        ids
    };

    let job = match EnrichmentJob::new(ids, config.request_delay) {
        Ok(job) => job,
        Err(EnrichError::EmptySelection) => {
            println!("Nothing to enrich.");
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    let client = CivitaiClient::from_config(config)?;

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut job = job.with_events(events_tx);
    let progress = tokio::spawn(log_progress(events_rx));

    let cancel = job.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling after the current model");
            cancel.cancel();
        }
    });

    let result = job.run(catalog, &client).await;
    ctrl_c.abort();
    drop(job);
    let _ = progress.await;

    let outcome = result.context("Enrichment failed")?;
    print_outcome(&outcome);

    Ok(())
}

async fn log_progress(mut events: UnboundedReceiver<EnrichmentEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EnrichmentEvent::Item {
                phase,
                model_id,
                status,
                progress,
            } => {
                let percent = (progress * 100.0).round();
                match status {
                    ItemStatus::Failed(reason) => {
                        debug!(%model_id, ?phase, percent, "Failed: {reason}");
                    }
                    status => info!(%model_id, ?phase, ?status, "{percent}%"),
                }
            }
            EnrichmentEvent::Finished(outcome) => {
                debug!(state = ?outcome.state, "Enrichment job finished");
            }
        }
    }
}

fn print_outcome(outcome: &JobOutcome) {
    if outcome.state == JobState::Cancelled {
        println!("Enrichment cancelled, no changes saved.");
    }

    println!(
        "Enrichment: {} found, {} not found, {} failed, {} cancelled",
        outcome.succeeded, outcome.not_found, outcome.failed, outcome.cancelled
    );

    for (model_id, reason) in &outcome.failures {
        println!("  {model_id}: {reason}");
    }
}
