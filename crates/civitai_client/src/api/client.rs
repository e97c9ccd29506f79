//! HTTP client for the civitai.com API.

use core::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use config::Config;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{ModelDetail, ModelVersion};
use super::{MetadataService, ServiceError};

/// Client for the Civitai REST API.
///
/// Requests are not paced here; the enrichment job owns the pacing.
#[derive(Debug, Clone)]
pub struct CivitaiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CivitaiClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("model-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    /// Creates a client from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.civitai_base_url,
            config.civitai_api_key.clone(),
            config.request_timeout,
        )
    }

    /// GETs a JSON document. A 404 is a definitive `None`.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, ServiceError> {
        debug!("Fetching {url}");

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|error| ServiceError::Malformed(error.to_string()))
    }
}

#[async_trait]
impl MetadataService for CivitaiClient {
    async fn version_by_hash(&self, full_hash: &str) -> Result<Option<ModelVersion>, ServiceError> {
        let url = format!("{}/api/v1/model-versions/by-hash/{full_hash}", self.base_url);
        self.get_json(&url).await
    }

    async fn model_by_id(&self, model_id: i64) -> Result<Option<ModelDetail>, ServiceError> {
        let url = format!("{}/api/v1/models/{model_id}", self.base_url);
        self.get_json(&url).await
    }

    fn site_url(&self) -> &str {
        &self.base_url
    }
}
