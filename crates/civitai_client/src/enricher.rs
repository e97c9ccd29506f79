//! The enrichment job: hash the selected models, look them up, merge the results.
//!
//! Nothing is written to the catalog until every lookup has finished. A
//! cancelled job writes nothing at all.

use core::num::NonZeroU32;
use core::time::Duration;
use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use config::MIN_REQUEST_DELAY;
use database::{Catalog, EnrichmentWrite};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use model_scanner::verify;
use model_structs::{CivitaiMerge, FileAttributes, ModelRecord};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::MetadataService;
use crate::api::models::ModelDetail;
use crate::normalize::normalize;

/// Share of overall progress taken by hashing.
const HASHING_SHARE: f64 = 0.1;

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Parent model fetches of one job, failures included.
type ParentCache = HashMap<i64, Result<Option<ModelDetail>, String>>;

/// Job that cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("no models selected")]
    EmptySelection,

    #[error("catalog error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Hashing,
    Querying,
    Merging,
    Done,
    Cancelled,
}

/// Per-item result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Full hash computed or reused; lookup still pending.
    Hashed,
    /// The service matched the hash.
    Found,
    /// The service has no version for the hash.
    NotFound,
    /// Hashing or lookup failed; nothing will be merged.
    ///
    /// A failed item keeps its Civitai state as it was, `civitai_checked_at`
    /// included, so the next job retries it.
    Failed(String),
    /// The job was cancelled before this item's result was persisted.
    Cancelled,
}

/// Final state of one selected model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub model_id: String,
    pub full_hash: Option<String>,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Progress emitted while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentEvent {
    /// One item finished a phase. `progress` is the overall fraction done, 0 to 1.
    Item {
        phase: JobState,
        model_id: String,
        status: ItemStatus,
        progress: f64,
    },
    /// The job finished; always the last event.
    Finished(JobOutcome),
}

/// Summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub state: JobState,
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// `(model id, reason)` for every failed item.
    pub failures: Vec<(String, String)>,
    pub items: Vec<ItemReport>,
}

/// Working state of one selected model.
#[derive(Debug)]
struct Item {
    model_id: String,
    record: Option<ModelRecord>,
    full_hash: Option<String>,
    /// Set when the hash was computed by this job and should be cached.
    fresh_attributes: Option<FileAttributes>,
    status: ItemStatus,
    merge: Option<CivitaiMerge>,
}

/// One enrichment job over an ordered selection of model ids.
///
/// The caller owns the job; cancel it through [`EnrichmentJob::cancellation_token`].
/// Only one job should run against a catalog at a time.
#[derive(Debug)]
pub struct EnrichmentJob {
    model_ids: Vec<String>,
    request_delay: Duration,
    cancel: CancellationToken,
    events: Option<UnboundedSender<EnrichmentEvent>>,
    state: JobState,
}

impl EnrichmentJob {
    /// Creates a job. `request_delay` is raised to [`MIN_REQUEST_DELAY`] if lower.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::EmptySelection`] if no ids are given.
    pub fn new(model_ids: Vec<String>, request_delay: Duration) -> Result<Self, EnrichError> {
        if model_ids.is_empty() {
            return Err(EnrichError::EmptySelection);
        }

        Ok(Self {
            model_ids,
            request_delay: request_delay.max(MIN_REQUEST_DELAY),
            cancel: CancellationToken::new(),
            events: None,
            state: JobState::Pending,
        })
    }

    /// Sends progress events to `events`. Send failures are ignored.
    #[must_use]
    pub fn with_events(mut self, events: UnboundedSender<EnrichmentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Token that cancels this job at the next item boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Runs the job to completion or cancellation.
    ///
    /// Per-item failures are reported in the outcome, never returned as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or the final merge fails.
    pub async fn run(
        &mut self,
        catalog: &Catalog,
        service: &dyn MetadataService,
    ) -> Result<JobOutcome, EnrichError> {
        let mut records: HashMap<String, ModelRecord> = catalog
            .get_many(&self.model_ids)
            .await?
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        let mut items: Vec<Item> = self
            .model_ids
            .iter()
            .map(|model_id| Item {
                model_id: model_id.clone(),
                record: records.remove(model_id),
                full_hash: None,
                fresh_attributes: None,
                status: ItemStatus::Hashed,
                merge: None,
            })
            .collect();

        info!(models = items.len(), "Starting enrichment job");

        self.state = JobState::Hashing;
        if !self.hash_all(&mut items).await {
            return Ok(self.finish_cancelled(items));
        }

        self.state = JobState::Querying;
        if !self.query_all(&mut items, service).await {
            return Ok(self.finish_cancelled(items));
        }

        self.state = JobState::Merging;
        let writes: Vec<EnrichmentWrite> = items
            .iter()
            .filter(|item| item.fresh_attributes.is_some() || item.merge.is_some())
            .map(|item| EnrichmentWrite {
                model_id: item.model_id.clone(),
                full_hash: item.full_hash.clone().zip(item.fresh_attributes),
                merge: item.merge.clone(),
            })
            .collect();
        let applied = catalog.apply_enrichment(&writes, Utc::now()).await?;
        debug!(
            hashes_stored = applied.hashes_stored,
            merged = applied.merged,
            "Enrichment results merged"
        );

        self.state = JobState::Done;
        let outcome = self.outcome(items);
        info!(
            succeeded = outcome.succeeded,
            not_found = outcome.not_found,
            failed = outcome.failed,
            "Enrichment job finished"
        );
        self.emit(EnrichmentEvent::Finished(outcome.clone()));
        Ok(outcome)
    }

    /// Phase 1. Returns `false` if the job was cancelled.
    async fn hash_all(&self, items: &mut [Item]) -> bool {
        let total = items.len();

        for (index, item) in items.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                return false;
            }

            match &item.record {
                None => item.status = ItemStatus::Failed("model not in catalog".to_owned()),
                Some(record) => match full_hash(record).await {
                    Ok((hash, fresh_attributes)) => {
                        item.full_hash = Some(hash);
                        item.fresh_attributes = fresh_attributes;
                    }
                    Err(reason) => {
                        warn!(model_id = %item.model_id, phase = "hashing", "Hashing failed: {reason}");
                        item.status = ItemStatus::Failed(reason);
                    }
                },
            }

            self.emit_item(item, fraction(index, total) * HASHING_SHARE);
        }

        true
    }

    /// Phase 2. Returns `false` if the job was cancelled.
    async fn query_all(&self, items: &mut [Item], service: &dyn MetadataService) -> bool {
        let pacer = pacer(self.request_delay);
        let mut parents = ParentCache::new();
        let total = items.len();

        for (index, item) in items.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                return false;
            }
            let progress = HASHING_SHARE + fraction(index, total) * (1.0 - HASHING_SHARE);

            let Some(hash) = item.full_hash.clone() else {
                self.emit_item(item, progress);
                continue;
            };

            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = pacer.until_ready() => {}
            }

            match lookup(service, &hash, &mut parents).await {
                Ok(merge) => {
                    item.status = match &merge {
                        CivitaiMerge::Found(_) => ItemStatus::Found,
                        CivitaiMerge::NotFound => ItemStatus::NotFound,
                    };
                    item.merge = Some(merge);
                }
                Err(reason) => {
                    warn!(model_id = %item.model_id, phase = "querying", "Lookup failed: {reason}");
                    item.status = ItemStatus::Failed(reason);
                }
            }

            self.emit_item(item, progress);
        }

        !self.cancel.is_cancelled()
    }

    fn finish_cancelled(&mut self, mut items: Vec<Item>) -> JobOutcome {
        info!("Enrichment job cancelled, nothing persisted");
        self.state = JobState::Cancelled;

        for item in &mut items {
            if !matches!(item.status, ItemStatus::Failed(_)) {
                item.status = ItemStatus::Cancelled;
            }
        }

        let outcome = self.outcome(items);
        self.emit(EnrichmentEvent::Finished(outcome.clone()));
        outcome
    }

    fn outcome(&self, items: Vec<Item>) -> JobOutcome {
        let mut outcome = JobOutcome {
            state: self.state,
            succeeded: 0,
            not_found: 0,
            failed: 0,
            cancelled: 0,
            failures: Vec::new(),
            items: Vec::with_capacity(items.len()),
        };

        for item in items {
            match &item.status {
                ItemStatus::Found => outcome.succeeded += 1,
                ItemStatus::NotFound => outcome.not_found += 1,
                ItemStatus::Failed(reason) => {
                    outcome.failed += 1;
                    outcome.failures.push((item.model_id.clone(), reason.clone()));
                }
                ItemStatus::Cancelled | ItemStatus::Hashed => outcome.cancelled += 1,
            }
            outcome.items.push(ItemReport {
                model_id: item.model_id,
                full_hash: item.full_hash,
                status: item.status,
            });
        }

        outcome
    }

    fn emit_item(&self, item: &Item, progress: f64) {
        self.emit(EnrichmentEvent::Item {
            phase: self.state,
            model_id: item.model_id.clone(),
            status: item.status.clone(),
            progress,
        });
    }

    fn emit(&self, event: EnrichmentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Reuses the cached full hash if the file is unchanged, otherwise hashes it.
///
/// Returns the hash and, for a fresh hash, the attributes it was computed for.
async fn full_hash(record: &ModelRecord) -> Result<(String, Option<FileAttributes>), String> {
    let path = PathBuf::from(&record.path);

    let task = tokio::task::spawn_blocking({
        let cached = record.full_hash.clone();
        let recorded = record.attributes();
        move || {
            let metadata = std::fs::metadata(&path)
                .map_err(|error| format!("failed to read {}: {error}", path.display()))?;
            let current = FileAttributes::from_metadata(&metadata);

            if let Some(hash) = cached
                && current == recorded
            {
                return Ok((hash, None));
            }

            verify(&path)
                .map(|hash| (hash, Some(current)))
                .map_err(|error| error.to_string())
        }
    });

    task.await
        .map_err(|error| format!("hashing task failed: {error}"))?
}

/// Looks one hash up, fetching each parent model at most once per job.
///
/// A failed parent fetch fails every item of that parent with the same reason.
async fn lookup(
    service: &dyn MetadataService,
    hash: &str,
    parents: &mut ParentCache,
) -> Result<CivitaiMerge, String> {
    let Some(version) = service
        .version_by_hash(hash)
        .await
        .map_err(|error| error.to_string())?
    else {
        return Ok(CivitaiMerge::NotFound);
    };

    let detail = match version.model_id {
        Some(parent_id) => {
            if !parents.contains_key(&parent_id) {
                let fetched = service
                    .model_by_id(parent_id)
                    .await
                    .map_err(|error| format!("parent model {parent_id}: {error}"));
                parents.insert(parent_id, fetched);
            }
            match parents.get(&parent_id) {
                Some(Ok(detail)) => detail.as_ref(),
                Some(Err(reason)) => return Err(reason.clone()),
                None => None,
            }
        }
        None => None,
    };

    Ok(CivitaiMerge::Found(normalize(
        &version,
        detail,
        service.site_url(),
    )))
}

fn pacer(delay: Duration) -> Pacer {
    let quota = Quota::with_period(delay)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(NonZeroU32::MIN);
    RateLimiter::direct(quota)
}

#[expect(clippy::cast_precision_loss, reason = "item counts are small")]
fn fraction(index: usize, total: usize) -> f64 {
    (index + 1) as f64 / total.max(1) as f64
}
