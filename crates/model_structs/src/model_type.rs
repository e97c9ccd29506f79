use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Model type bucket. Stored as snake case text in the catalog.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ModelType {
    Checkpoint,
    DiffusionModel,
    Lora,
    Embedding,
}

impl ModelType {
    /// Returns the catalog string representation for this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::DiffusionModel => "diffusion_model",
            Self::Lora => "lora",
            Self::Embedding => "embedding",
        }
    }

    /// Returns the default folder name (below the models base path) for this type.
    #[must_use]
    pub const fn as_folder_name(self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoints",
            Self::DiffusionModel => "diffusion_models",
            Self::Lora => "loras",
            Self::Embedding => "embeddings",
        }
    }

    /// Human-readable section label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Checkpoint => "Checkpoints",
            Self::DiffusionModel => "Diffusion Models",
            Self::Lora => "LoRAs",
            Self::Embedding => "Embeddings",
        }
    }

    /// Whether trigger words are meaningful for this type.
    #[must_use]
    pub const fn uses_trigger_words(self) -> bool {
        matches!(self, Self::Lora | Self::Embedding)
    }

    /// Returns an iterator over all model types.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "checkpoint" | "checkpoints" => Ok(Self::Checkpoint),
            "diffusion_model" | "diffusion_models" => Ok(Self::DiffusionModel),
            "lora" | "loras" => Ok(Self::Lora),
            "embedding" | "embeddings" => Ok(Self::Embedding),
            _ => Err(anyhow::anyhow!("Invalid model type: {s}")),
        }
    }
}
