//! Local metadata read from the model file itself.
//!
//! Safetensors files carry a JSON header; training tools store trigger words and
//! tag frequencies in its `__metadata__` entry.

use core::fmt;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use model_structs::LocalMetadata;
use serde_json::{Map, Value};
use tracing::debug;

/// Headers larger than this are not parsed.
const MAX_HEADER_LEN: u64 = 100_000_000;

/// Tags kept from `ss_tag_frequency`.
const MAX_TAGS: usize = 50;

/// `__metadata__` keys holding trigger words, in priority order.
const TRIGGER_KEYS: [&str; 3] = ["ss_trigger_word", "activation_text", "trigger_word"];

/// Model architecture guessed from tensor names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    StableCascade,
    Pony,
    Flux,
    Sdxl,
    Sd1Or2,
    Unknown,
}

impl Architecture {
    /// Detects the architecture from the tensor names of a safetensors header.
    pub fn detect<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        let keys: Vec<&str> = keys.into_iter().collect();
        let lower: Vec<String> = keys.iter().map(|key| key.to_lowercase()).collect();

        if lower.iter().any(|key| key.contains("cascade") || key.contains("effnet")) {
            Self::StableCascade
        } else if lower.iter().any(|key| key.contains("pony")) {
            Self::Pony
        } else if keys.contains(&"model.diffusion_model.joint_blocks.0.x_block.attn.qkv.weight")
            || lower
                .iter()
                .any(|key| key.contains("double_blocks") || key.contains("single_blocks"))
        {
            Self::Flux
        } else if keys
            .iter()
            .any(|key| key.contains("down_blocks.2.attentions.1.transformer_blocks.9"))
        {
            Self::Sdxl
        } else if keys
            .iter()
            .any(|key| key.contains("cond_stage_model.transformer.text_model.embeddings"))
        {
            Self::Sd1Or2
        } else {
            Self::Unknown
        }
    }

    /// Display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StableCascade => "Stable Cascade",
            Self::Pony => "Pony",
            Self::Flux => "Flux",
            Self::Sdxl => "SDXL",
            Self::Sd1Or2 => "SD 1.x/2.x",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads the local metadata for a model file.
///
/// The name is always the file stem. Trigger words, tags and architecture are
/// only filled for readable safetensors headers; any parse failure leaves them
/// empty.
#[must_use]
pub fn read_local_metadata(path: &Path) -> LocalMetadata {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let is_safetensors = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("safetensors"));
    if !is_safetensors {
        return LocalMetadata {
            name,
            ..LocalMetadata::default()
        };
    }

    let header = match read_header(path) {
        Ok(Some(header)) => header,
        Ok(None) => {
            debug!(path = %path.display(), "No usable safetensors header");
            return LocalMetadata {
                name,
                ..LocalMetadata::default()
            };
        }
        Err(error) => {
            debug!(path = %path.display(), "Failed to read safetensors header: {error}");
            return LocalMetadata {
                name,
                ..LocalMetadata::default()
            };
        }
    };

    let metadata = header.get("__metadata__").and_then(Value::as_object);
    let architecture = Architecture::detect(
        header
            .keys()
            .map(String::as_str)
            .filter(|key| *key != "__metadata__"),
    );

    LocalMetadata {
        name,
        trigger: metadata.and_then(trigger_words),
        tags: metadata.and_then(tag_summary),
        architecture: Some(architecture.to_string()),
    }
}

/// Reads and parses the JSON header. `Ok(None)` for headers that are
/// oversized, truncated or not a JSON object.
fn read_header(path: &Path) -> io::Result<Option<Map<String, Value>>> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut len_bytes = [0_u8; 8];
    if file.read_exact(&mut len_bytes).is_err() {
        return Ok(None);
    }
    let header_len = u64::from_le_bytes(len_bytes);
    if header_len > MAX_HEADER_LEN || header_len > file_len.saturating_sub(8) {
        return Ok(None);
    }

    let mut raw = Vec::new();
    file.take(header_len).read_to_end(&mut raw)?;

    Ok(serde_json::from_slice::<Value>(&raw)
        .ok()
        .and_then(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        }))
}

fn trigger_words(metadata: &Map<String, Value>) -> Option<String> {
    TRIGGER_KEYS.iter().find_map(|key| {
        metadata
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

/// Union of the tag names of every dataset in `ss_tag_frequency`, sorted,
/// first [`MAX_TAGS`], joined with `", "`.
fn tag_summary(metadata: &Map<String, Value>) -> Option<String> {
    let raw = metadata.get("ss_tag_frequency")?.as_str()?;
    let datasets: HashMap<String, HashMap<String, Value>> = serde_json::from_str(raw).ok()?;

    let tags: BTreeSet<&str> = datasets
        .values()
        .flat_map(|tags| tags.keys().map(String::as_str))
        .collect();
    if tags.is_empty() {
        return None;
    }

    Some(tags.into_iter().take(MAX_TAGS).collect::<Vec<_>>().join(", "))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;

    fn write_safetensors(dir: &tempfile::TempDir, name: &str, header: &Value) -> PathBuf {
        let json = serde_json::to_vec(header).unwrap();
        let mut bytes = (json.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(&json);
        bytes.extend_from_slice(&[0_u8; 32]);

        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_reads_trigger_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        let tag_frequency = json!({
            "10_style": {"watercolor": 12, "paper": 3},
            "5_extra": {"brush": 1, "paper": 2}
        })
        .to_string();
        let path = write_safetensors(
            &dir,
            "watercolor_v2.safetensors",
            &json!({
                "__metadata__": {
                    "activation_text": "wtrclr",
                    "trigger_word": "ignored",
                    "ss_tag_frequency": tag_frequency
                },
                "lora_unet_down_blocks_0.alpha": {"dtype": "F16", "shape": [], "data_offsets": [0, 2]}
            }),
        );

        let local = read_local_metadata(&path);
        assert_eq!(local.name, "watercolor_v2");
        assert_eq!(local.trigger.as_deref(), Some("wtrclr"));
        assert_eq!(local.tags.as_deref(), Some("brush, paper, watercolor"));
        assert_eq!(local.architecture.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_empty_trigger_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_safetensors(
            &dir,
            "a.safetensors",
            &json!({"__metadata__": {"ss_trigger_word": " ", "trigger_word": "sks"}}),
        );
        assert_eq!(read_local_metadata(&path).trigger.as_deref(), Some("sks"));
    }

    #[test]
    fn test_tags_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let many: Map<String, Value> = (0..80).map(|i| (format!("tag{i:03}"), json!(1))).collect();
        let tag_frequency = json!({ "set": many }).to_string();
        let path = write_safetensors(
            &dir,
            "a.safetensors",
            &json!({"__metadata__": {"ss_tag_frequency": tag_frequency}}),
        );

        let tags = read_local_metadata(&path).tags.unwrap();
        assert_eq!(tags.split(", ").count(), MAX_TAGS);
        assert!(tags.starts_with("tag000, tag001"));
    }

    #[test]
    fn test_garbage_header_yields_name_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.safetensors");
        let mut bytes = 16_u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"not json at all!");
        fs::write(&path, bytes).unwrap();

        let local = read_local_metadata(&path);
        assert_eq!(local.name, "broken");
        assert!(local.trigger.is_none());
        assert!(local.architecture.is_none());

        let oversized = dir.path().join("huge.safetensors");
        fs::write(&oversized, u64::MAX.to_le_bytes()).unwrap();
        assert!(read_local_metadata(&oversized).tags.is_none());
    }

    #[test]
    fn test_other_extensions_skip_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embedding.pt");
        fs::write(&path, b"\x00\x01").unwrap();

        let local = read_local_metadata(&path);
        assert_eq!(local.name, "embedding");
        assert!(local.architecture.is_none());
    }

    #[test]
    fn test_detects_architectures() {
        assert_eq!(
            Architecture::detect(["model.diffusion_model.double_blocks.0.img_attn.qkv.weight"]),
            Architecture::Flux
        );
        assert_eq!(
            Architecture::detect([
                "model.diffusion_model.down_blocks.2.attentions.1.transformer_blocks.9.attn1.to_q.weight"
            ]),
            Architecture::Sdxl
        );
        assert_eq!(
            Architecture::detect([
                "cond_stage_model.transformer.text_model.embeddings.position_ids"
            ]),
            Architecture::Sd1Or2
        );
        assert_eq!(Architecture::detect(["EffNet.encoder.weight"]), Architecture::StableCascade);
        assert_eq!(Architecture::detect(["first_stage_model.decoder"]), Architecture::Unknown);
    }
}
