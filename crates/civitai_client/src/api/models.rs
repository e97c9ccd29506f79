//! API response types for civitai.com.
//!
//! Only the fields the catalog uses are modeled. Fields whose shape varies
//! between API revisions are kept as raw JSON and normalized later.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response from `GET /api/v1/model-versions/by-hash/{hash}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVersion {
    /// Version ID
    pub id: i64,

    /// Parent model ID
    pub model_id: Option<i64>,

    /// Version name (e.g. "v2.0")
    pub name: Option<String>,

    /// Base model family (e.g. "SDXL 1.0")
    pub base_model: Option<String>,

    /// Trigger words, either an array or a comma separated string
    #[serde(default)]
    pub trained_words: Option<Value>,

    /// Older responses use this name for the trigger words
    #[serde(default)]
    pub trigger_words: Option<Value>,

    /// Parent model summary embedded in the version
    pub model: Option<VersionModel>,
}

/// Parent model summary embedded in a version response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VersionModel {
    /// Model name
    pub name: Option<String>,

    /// Model type (e.g. "LORA", "Checkpoint")
    #[serde(rename = "type")]
    pub model_type: Option<String>,
}

/// Response from `GET /api/v1/models/{id}`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDetail {
    /// Model ID
    pub id: i64,

    /// Model name
    pub name: Option<String>,

    /// Model type
    #[serde(rename = "type")]
    pub model_type: Option<String>,

    /// Tags, as plain strings or `{ "name": .. }` objects
    #[serde(default)]
    pub tags: Vec<Value>,

    /// Uploader, as a `{ "username": .. }` object or a plain string
    pub creator: Option<Value>,

    /// Structured license, when the model declares one
    pub license: Option<Value>,

    /// Commercial use permission, a string or an array of allowed uses
    pub allow_commercial_use: Option<Value>,

    /// Whether the model may be used without crediting the creator
    pub allow_no_credit: Option<bool>,

    /// Whether derivatives may be shared
    pub allow_derivatives: Option<bool>,

    /// Whether derivatives may use a different license
    pub allow_different_license: Option<bool>,
}
