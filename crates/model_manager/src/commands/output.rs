//! Terminal rendering of model listings.

use core::fmt::Write as _;

use anyhow::Result;
use model_structs::ModelListing;

/// Prints listings as pretty JSON.
pub(crate) fn print_json(rows: &[&ModelListing]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(rows)?);
    Ok(())
}

/// Prints listings grouped under one heading per type.
///
/// Rows must already be ordered by type.
pub(crate) fn print_table(rows: &[&ModelListing]) {
    print!("{}", render_table(rows));
}

pub(crate) fn render_table(rows: &[&ModelListing]) -> String {
    if rows.is_empty() {
        return "No models found.\n".to_owned();
    }

    let mut out = String::new();
    let mut current = None;

    for row in rows {
        if current != Some(row.model_type) {
            let count = rows
                .iter()
                .filter(|other| other.model_type == row.model_type)
                .count();
            if current.is_some() {
                out.push('\n');
            }
            let _ = writeln!(out, "{} ({count})", row.model_type.label());
            current = Some(row.model_type);
        }

        let status = if row.name_civitai.is_some() {
            "civitai"
        } else if row.civitai_not_found {
            "not found"
        } else if row.civitai_checked_at.is_some() {
            "checked"
        } else {
            "local"
        };

        let _ = writeln!(out, "  {}  {}  [{status}]", row.id, row.name);
        if let Some(base_model) = &row.base_model {
            let _ = writeln!(out, "      base: {base_model}");
        }
        if row.model_type.uses_trigger_words()
            && let Some(trigger) = &row.trigger
        {
            let _ = writeln!(out, "      trigger: {trigger}");
        }
        let _ = writeln!(out, "      {}", row.path);
    }

    out
}

#[cfg(test)]
mod tests {
    use model_structs::ModelType;

    use super::*;

    fn listing(model_type: ModelType, name: &str) -> ModelListing {
        ModelListing {
            id: format!("id-{name}"),
            model_type,
            name: name.to_owned(),
            path: format!("/models/{}/{name}.safetensors", model_type.as_folder_name()),
            size: 0,
            mtime: 0,
            hash: None,
            trigger: Some("sks".to_owned()),
            tags: None,
            name_local: name.to_owned(),
            trigger_local: Some("sks".to_owned()),
            tags_local: None,
            architecture_local: None,
            name_civitai: None,
            version_name: None,
            type_civitai: None,
            base_model: None,
            creator: None,
            license: None,
            trigger_civitai: None,
            tags_civitai: None,
            civitai_model_id: None,
            civitai_version_id: None,
            civitai_model_url: None,
            civitai_checked_at: None,
            civitai_not_found: false,
        }
    }

    #[test]
    fn test_table_groups_by_type() {
        let rows = [
            listing(ModelType::Checkpoint, "base"),
            listing(ModelType::Lora, "style"),
            listing(ModelType::Lora, "detail"),
        ];
        let refs: Vec<&ModelListing> = rows.iter().collect();
        let table = render_table(&refs);

        assert!(table.starts_with("Checkpoints (1)\n"));
        assert!(table.contains("\nLoRAs (2)\n"));
        assert_eq!(table.matches("trigger: sks").count(), 2);
        assert!(table.contains("  id-style  style  [local]"));
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(render_table(&[]), "No models found.\n");
    }
}
