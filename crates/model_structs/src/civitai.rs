//! Canonical Civitai metadata, after normalization of the service's response shapes.

use serde::{Deserialize, Serialize};

/// The full set of Civitai-sourced fields for one model version.
///
/// Replaces the stored Civitai fields wholesale when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivitaiMetadata {
    /// Parent model display name.
    pub name: Option<String>,
    pub version_name: Option<String>,
    /// Parent model type as reported by the service (e.g. `LORA`, `Checkpoint`).
    pub model_type: Option<String>,
    pub base_model: Option<String>,
    pub creator: Option<String>,
    pub license: Option<String>,
    /// Trigger words joined with `", "`.
    pub trigger_words: Option<String>,
    /// Tags joined with `", "`.
    pub tags: Option<String>,
    pub model_id: Option<i64>,
    pub version_id: Option<i64>,
    pub model_url: Option<String>,
}

/// Outcome of one enrichment query, to be merged into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CivitaiMerge {
    /// The service matched the full hash.
    Found(CivitaiMetadata),
    /// The service definitively has no version for the full hash.
    NotFound,
}
