//! Display-resolved listing rows and the search filter.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model_type::ModelType;
use crate::record::ModelRecord;

/// One row of the catalog listing payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelListing {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    /// Civitai name if present, else local name.
    pub name: String,
    pub path: String,
    pub size: i64,
    pub mtime: i64,
    /// Full hash, absent until computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub trigger: Option<String>,
    pub tags: Option<String>,
    pub name_local: String,
    pub trigger_local: Option<String>,
    pub tags_local: Option<String>,
    pub architecture_local: Option<String>,
    pub name_civitai: Option<String>,
    pub version_name: Option<String>,
    pub type_civitai: Option<String>,
    pub base_model: Option<String>,
    pub creator: Option<String>,
    pub license: Option<String>,
    pub trigger_civitai: Option<String>,
    pub tags_civitai: Option<String>,
    pub civitai_model_id: Option<i64>,
    pub civitai_version_id: Option<i64>,
    pub civitai_model_url: Option<String>,
    pub civitai_checked_at: Option<DateTime<Utc>>,
    pub civitai_not_found: bool,
}

/// Picks the Civitai value when non-empty, else the local one.
#[must_use]
pub fn pick_effective(civitai: Option<&str>, local: Option<&str>) -> Option<String> {
    civitai
        .filter(|value| !value.is_empty())
        .or_else(|| local.filter(|value| !value.is_empty()))
        .map(str::to_owned)
}

impl From<ModelRecord> for ModelListing {
    fn from(record: ModelRecord) -> Self {
        let name = pick_effective(record.name_civitai.as_deref(), Some(&record.name_local))
            .unwrap_or_default();
        let trigger = pick_effective(
            record.trigger_civitai.as_deref(),
            record.trigger_local.as_deref(),
        );
        let tags = pick_effective(record.tags_civitai.as_deref(), record.tags_local.as_deref());

        Self {
            id: record.id,
            model_type: record.model_type,
            name,
            path: record.path,
            size: record.size,
            mtime: record.mtime,
            hash: record.full_hash,
            trigger,
            tags,
            name_local: record.name_local,
            trigger_local: record.trigger_local,
            tags_local: record.tags_local,
            architecture_local: record.architecture_local,
            name_civitai: record.name_civitai,
            version_name: record.version_name_civitai,
            type_civitai: record.type_civitai,
            base_model: record.base_model,
            creator: record.creator,
            license: record.license,
            trigger_civitai: record.trigger_civitai,
            tags_civitai: record.tags_civitai,
            civitai_model_id: record.civitai_model_id,
            civitai_version_id: record.civitai_version_id,
            civitai_model_url: record.civitai_model_url,
            civitai_checked_at: record.civitai_checked_at,
            civitai_not_found: record.civitai_not_found,
        }
    }
}

impl ModelListing {
    /// Case-insensitive substring match across name, type, path, trigger and tags.
    ///
    /// An empty (or whitespace-only) query matches every row.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        [
            Some(self.name.as_str()),
            Some(self.model_type.as_str()),
            Some(self.model_type.label()),
            Some(self.path.as_str()),
            self.trigger.as_deref(),
            self.tags.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|haystack| haystack.to_lowercase().contains(&needle))
    }
}

/// Returns the rows matching `query`, preserving order.
#[must_use]
pub fn filter_listings<'a>(rows: &'a [ModelListing], query: &str) -> Vec<&'a ModelListing> {
    rows.iter().filter(|row| row.matches(query)).collect()
}
