use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model_type::ModelType;

/// Number of hex characters kept from the id digest.
const MODEL_ID_LEN: usize = 16;

/// One catalogued model file, as stored in the `models` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ModelRecord {
    pub id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub path: String,
    pub size: i64,
    pub mtime: i64,
    pub identification_hash: String,
    pub full_hash: Option<String>,

    // Local fields, written by the scanner only
    pub name_local: String,
    pub trigger_local: Option<String>,
    pub tags_local: Option<String>,
    pub architecture_local: Option<String>,

    // Civitai fields, written by enrichment only
    pub name_civitai: Option<String>,
    pub version_name_civitai: Option<String>,
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

    pub scanned_at: DateTime<Utc>,
}

impl ModelRecord {
    /// Filesystem attributes recorded at the last scan.
    #[must_use]
    pub const fn attributes(&self) -> FileAttributes {
        FileAttributes {
            size: self.size,
            mtime: self.mtime,
        }
    }

    /// Local metadata recorded at the last scan.
    #[must_use]
    pub fn local_metadata(&self) -> LocalMetadata {
        LocalMetadata {
            name: self.name_local.clone(),
            trigger: self.trigger_local.clone(),
            tags: self.tags_local.clone(),
            architecture: self.architecture_local.clone(),
        }
    }

    /// Whether enrichment has been attempted for this record.
    #[must_use]
    pub const fn civitai_checked(&self) -> bool {
        self.civitai_checked_at.is_some()
    }
}

/// Size and modification time as observed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileAttributes {
    pub size: i64,
    /// Seconds since the Unix epoch.
    pub mtime: i64,
}

impl FileAttributes {
    /// Reads the attributes from filesystem metadata.
    #[must_use]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let mtime = metadata
            .modified()
            .ok()
            .map_or(0, |time| DateTime::<Utc>::from(time).timestamp());

        Self {
            size: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
            mtime,
        }
    }
}

/// Metadata derived from the file itself at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMetadata {
    /// File stem.
    pub name: String,
    pub trigger: Option<String>,
    pub tags: Option<String>,
    pub architecture: Option<String>,
}

/// Input for inserting or refreshing a record from a scan.
#[derive(Debug, Clone)]
pub struct UpsertModel {
    pub id: String,
    pub model_type: ModelType,
    pub path: String,
    pub attributes: FileAttributes,
    pub identification_hash: String,
    pub local: LocalMetadata,
}

/// Derives the stable model id from its type bucket and path relative to the scan root.
///
/// Path components are joined with `/` regardless of platform, so the id does not
/// depend on how the absolute path is displayed.
#[must_use]
pub fn model_id(model_type: ModelType, relative_path: &Path) -> String {
    let relative = relative_path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/");

    let digest = Sha256::digest(format!("{}:{relative}", model_type.as_str()));
    let mut id = hex::encode(digest);
    id.truncate(MODEL_ID_LEN);
    id
}

/// Normalizes a path for display and search (forward slashes).
#[must_use]
pub fn display_path(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    if cfg!(windows) {
        path_str.replace('\\', "/")
    } else {
        path_str.into_owned()
    }
}
