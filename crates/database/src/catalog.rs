//! Repository functions for model catalog operations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use model_structs::{CivitaiMerge, ModelRecord, ModelType, UpsertModel};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::Catalog;

/// Column list matching [`ModelRecord`].
pub(crate) const MODEL_COLUMNS: &str = "id, type, path, size, mtime, identification_hash, full_hash, \
     name_local, trigger_local, tags_local, architecture_local, \
     name_civitai, version_name_civitai, type_civitai, base_model, creator, license, \
     trigger_civitai, tags_civitai, civitai_model_id, civitai_version_id, civitai_model_url, \
     civitai_checked_at, civitai_not_found, scanned_at";

impl Catalog {
    /// Inserts a scanned model or refreshes its filesystem attributes and local fields.
    ///
    /// Civitai fields are never written here. A cached full hash survives only if
    /// size and mtime are unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails (including a second id
    /// claiming an already catalogued `(type, path)`).
    pub async fn upsert(&self, model: &UpsertModel) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;

        sqlx::query(
            r"
            INSERT INTO models (
                id, type, path, size, mtime, identification_hash,
                name_local, trigger_local, tags_local, architecture_local, scanned_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (id) DO UPDATE SET
                type = excluded.type,
                path = excluded.path,
                full_hash = CASE
                    WHEN models.size = excluded.size AND models.mtime = excluded.mtime
                    THEN models.full_hash
                    ELSE NULL
                END,
                size = excluded.size,
                mtime = excluded.mtime,
                identification_hash = excluded.identification_hash,
                name_local = excluded.name_local,
                trigger_local = excluded.trigger_local,
                tags_local = excluded.tags_local,
                architecture_local = excluded.architecture_local,
                scanned_at = excluded.scanned_at
            ",
        )
        .bind(&model.id)
        .bind(model.model_type)
        .bind(&model.path)
        .bind(model.attributes.size)
        .bind(model.attributes.mtime)
        .bind(&model.identification_hash)
        .bind(&model.local.name)
        .bind(&model.local.trigger)
        .bind(&model.local.tags)
        .bind(&model.local.architecture)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finds a model by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get(&self, id: &str) -> Result<Option<ModelRecord>, sqlx::Error> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Finds the models with the given ids. Unknown ids are skipped; order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<ModelRecord>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {MODEL_COLUMNS} FROM models WHERE id IN ("));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        query.build_query_as::<ModelRecord>().fetch_all(&self.pool).await
    }

    /// Lists every model, grouped by type and ordered by display name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_all(&self) -> Result<Vec<ModelRecord>, sqlx::Error> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models \
             ORDER BY type, COALESCE(NULLIF(name_civitai, ''), name_local) COLLATE NOCASE, path"
        ))
        .fetch_all(&self.pool)
        .await
    }

    /// Lists the models of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_by_type(&self, model_type: ModelType) -> Result<Vec<ModelRecord>, sqlx::Error> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE type = ?1 ORDER BY path"
        ))
        .bind(model_type)
        .fetch_all(&self.pool)
        .await
    }

    /// Lists the models never queried against Civitai.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list_unchecked(&self) -> Result<Vec<ModelRecord>, sqlx::Error> {
        sqlx::query_as::<_, ModelRecord>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE civitai_checked_at IS NULL ORDER BY type, path"
        ))
        .fetch_all(&self.pool)
        .await
    }

    /// Counts catalogued models.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM models")
            .fetch_one(&self.pool)
            .await
    }

    /// Deletes every model of `model_type` whose path is not in `still_present`.
    ///
    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn remove_missing(
        &self,
        model_type: ModelType,
        still_present: &HashSet<String>,
    ) -> Result<u64, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, path FROM models WHERE type = ?1")
                .bind(model_type)
                .fetch_all(&mut *tx)
                .await?;

        let mut removed = 0;
        for (id, path) in rows {
            if still_present.contains(&path) {
                continue;
            }

            debug!(model_id = %id, path = %path, "Removing model no longer on disk");
            removed += sqlx::query("DELETE FROM models WHERE id = ?1")
                .bind(&id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Merges one enrichment result into a model.
    ///
    /// `civitai_checked_at` is always set. A not-found marker sets
    /// `civitai_not_found` and leaves the Civitai fields alone; found metadata
    /// replaces all Civitai fields and clears `civitai_not_found`.
    ///
    /// Returns whether the model exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn merge_civitai(
        &self,
        model_id: &str,
        merge: &CivitaiMerge,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        let mut conn = self.pool.acquire().await?;
        merge_civitai_on(&mut conn, model_id, merge, checked_at).await
    }
}

/// Applies one Civitai merge on an open connection or transaction.
pub(crate) async fn merge_civitai_on(
    conn: &mut sqlx::SqliteConnection,
    model_id: &str,
    merge: &CivitaiMerge,
    checked_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = match merge {
        CivitaiMerge::NotFound => {
            sqlx::query(
                r"
                UPDATE models
                SET civitai_checked_at = ?2, civitai_not_found = 1
                WHERE id = ?1
                ",
            )
            .bind(model_id)
            .bind(checked_at)
            .execute(&mut *conn)
            .await?
        }
        CivitaiMerge::Found(metadata) => {
            sqlx::query(
                r"
                UPDATE models
                SET
                    name_civitai = ?2,
                    version_name_civitai = ?3,
                    type_civitai = ?4,
                    base_model = ?5,
                    creator = ?6,
                    license = ?7,
                    trigger_civitai = ?8,
                    tags_civitai = ?9,
                    civitai_model_id = ?10,
                    civitai_version_id = ?11,
                    civitai_model_url = ?12,
                    civitai_checked_at = ?13,
                    civitai_not_found = 0
                WHERE id = ?1
                ",
            )
            .bind(model_id)
            .bind(&metadata.name)
            .bind(&metadata.version_name)
            .bind(&metadata.model_type)
            .bind(&metadata.base_model)
            .bind(&metadata.creator)
            .bind(&metadata.license)
            .bind(&metadata.trigger_words)
            .bind(&metadata.tags)
            .bind(metadata.model_id)
            .bind(metadata.version_id)
            .bind(&metadata.model_url)
            .bind(checked_at)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(result.rows_affected() > 0)
}
