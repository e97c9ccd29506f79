//! Civitai metadata service.

use async_trait::async_trait;

use self::models::{ModelDetail, ModelVersion};

pub mod client;
pub mod models;

/// A failed request that says nothing definitive about the model.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by the service")]
    RateLimited,

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Lookups against the model sharing service.
///
/// `Ok(None)` is a definitive not-found; every error is treated as transient.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Finds the model version whose file has the given full SHA-256.
    async fn version_by_hash(&self, full_hash: &str) -> Result<Option<ModelVersion>, ServiceError>;

    /// Fetches the parent model of a version.
    async fn model_by_id(&self, model_id: i64) -> Result<Option<ModelDetail>, ServiceError>;

    /// Site root used to build model page URLs, without trailing slash.
    fn site_url(&self) -> &str;
}
