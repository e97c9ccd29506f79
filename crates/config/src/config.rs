use core::time::Duration;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Context;
use model_structs::ModelType;

/// Default `SQLite` catalog location.
const DEFAULT_DATABASE_URL: &str = "sqlite://model_manager.sqlite";

/// Default models base directory.
const DEFAULT_BASE_MODELS_PATH: &str = "./models";

/// Default Civitai site root.
const DEFAULT_CIVITAI_BASE_URL: &str = "https://civitai.com";

/// Lowest allowed pause between two Civitai lookups.
pub const MIN_REQUEST_DELAY: Duration = Duration::from_millis(200);

/// Default HTTP timeout for Civitai requests, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Model file extensions recognized for every type.
pub const MODEL_EXTENSIONS: [&str; 4] = ["ckpt", "safetensors", "pt", "bin"];

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// `SQLite` connection URL for the catalog.
    pub database_url: String,

    /// Base directory holding one folder per model type.
    pub base_models_path: PathBuf,

    /// Optional Civitai API key.
    pub civitai_api_key: Option<String>,

    /// Civitai site root, without trailing slash.
    pub civitai_base_url: String,

    /// Fixed pause between Civitai lookups; never below [`MIN_REQUEST_DELAY`].
    pub request_delay: Duration,

    /// HTTP timeout for Civitai requests.
    pub request_timeout: Duration,

    /// Directory for the debug log file, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables (after reading `.env`).
    ///
    /// Environment variables, all optional:
    /// - `DATABASE_URL`: catalog location (default: `sqlite://model_manager.sqlite`)
    /// - `BASE_MODELS_PATH`: models base directory (default: `./models`)
    /// - `CIVITAI_API_KEY`: bearer token for Civitai
    /// - `CIVITAI_BASE_URL`: Civitai site root (default: `https://civitai.com`)
    /// - `CIVITAI_REQUEST_DELAY_MS`: pause between lookups (default and floor: 200)
    /// - `CIVITAI_TIMEOUT_SECS`: HTTP timeout (default: 30)
    /// - `MODEL_MANAGER_LOG_DIR`: enables the file log layer
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url =
            non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());

        let base_models_path = non_empty("BASE_MODELS_PATH")
            .map_or_else(|| PathBuf::from(DEFAULT_BASE_MODELS_PATH), PathBuf::from);

        let civitai_base_url = non_empty("CIVITAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_CIVITAI_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        let request_delay = match non_empty("CIVITAI_REQUEST_DELAY_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("Invalid CIVITAI_REQUEST_DELAY_MS: {raw}"))?,
            ),
            None => MIN_REQUEST_DELAY,
        }
        .max(MIN_REQUEST_DELAY);

        let request_timeout = Duration::from_secs(match non_empty("CIVITAI_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid CIVITAI_TIMEOUT_SECS: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        });

        Ok(Self {
            database_url,
            base_models_path,
            civitai_api_key: non_empty("CIVITAI_API_KEY"),
            civitai_base_url,
            request_delay,
            request_timeout,
            log_dir: non_empty("MODEL_MANAGER_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Root directories to scan, per model type.
    #[must_use]
    pub fn model_roots(&self) -> BTreeMap<ModelType, Vec<PathBuf>> {
        ModelType::all()
            .map(|model_type| {
                (
                    model_type,
                    vec![self.base_models_path.join(model_type.as_folder_name())],
                )
            })
            .collect()
    }

    /// Recognized file extensions (lowercase, without dot), per model type.
    #[must_use]
    pub fn model_extensions(&self) -> BTreeMap<ModelType, BTreeSet<String>> {
        ModelType::all()
            .map(|model_type| {
                let extensions = MODEL_EXTENSIONS.iter().map(|ext| (*ext).to_owned()).collect();
                (model_type, extensions)
            })
            .collect()
    }
}
