//! Batched persistence of an enrichment job's results.

use chrono::{DateTime, Utc};
use model_structs::{CivitaiMerge, FileAttributes};
use tracing::{debug, warn};

use crate::Catalog;
use crate::catalog::merge_civitai_on;

/// Everything one enrichment item wants persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentWrite {
    pub model_id: String,
    /// Freshly computed full hash and the attributes it was computed for.
    pub full_hash: Option<(String, FileAttributes)>,
    /// Civitai merge, if the query produced a definitive answer.
    pub merge: Option<CivitaiMerge>,
}

/// Counts of rows touched by [`Catalog::apply_enrichment`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedEnrichment {
    pub hashes_stored: u64,
    pub merged: u64,
}

impl Catalog {
    /// Applies all writes of one enrichment job in a single transaction.
    ///
    /// A full hash is stored only if the row still carries the size and mtime the
    /// hash was computed for, so a file rescanned in between is not given a stale hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is applied then.
    pub async fn apply_enrichment(
        &self,
        writes: &[EnrichmentWrite],
        checked_at: DateTime<Utc>,
    ) -> Result<AppliedEnrichment, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut applied = AppliedEnrichment::default();

        for write in writes {
            if let Some((hash, attributes)) = &write.full_hash {
                let stored = sqlx::query(
                    r"
                    UPDATE models
                    SET full_hash = ?2
                    WHERE id = ?1 AND size = ?3 AND mtime = ?4
                    ",
                )
                .bind(&write.model_id)
                .bind(hash)
                .bind(attributes.size)
                .bind(attributes.mtime)
                .execute(&mut *tx)
                .await?
                .rows_affected();

                if stored == 0 {
                    debug!(model_id = %write.model_id, "Full hash not cached, file changed since last scan");
                }
                applied.hashes_stored += stored;
            }

            if let Some(merge) = &write.merge {
                if merge_civitai_on(&mut tx, &write.model_id, merge, checked_at).await? {
                    applied.merged += 1;
                } else {
                    warn!(model_id = %write.model_id, "Model vanished before merge");
                }
            }
        }

        tx.commit().await?;
        Ok(applied)
    }
}
