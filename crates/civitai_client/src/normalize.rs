//! Maps the service's response shapes onto [`CivitaiMetadata`].

use model_structs::CivitaiMetadata;
use serde_json::Value;

use crate::api::models::{ModelDetail, ModelVersion};

/// Builds the canonical metadata for a matched version and its parent model.
///
/// Parent detail fields win over the summary embedded in the version.
pub(crate) fn normalize(
    version: &ModelVersion,
    detail: Option<&ModelDetail>,
    site_url: &str,
) -> CivitaiMetadata {
    let embedded = version.model.as_ref();
    let model_id = version.model_id.or_else(|| detail.map(|detail| detail.id));

    CivitaiMetadata {
        name: detail
            .and_then(|detail| non_empty(detail.name.as_deref()))
            .or_else(|| embedded.and_then(|model| non_empty(model.name.as_deref()))),
        version_name: non_empty(version.name.as_deref()),
        model_type: detail
            .and_then(|detail| non_empty(detail.model_type.as_deref()))
            .or_else(|| embedded.and_then(|model| non_empty(model.model_type.as_deref()))),
        base_model: non_empty(version.base_model.as_deref()),
        creator: detail.and_then(|detail| detail.creator.as_ref()).and_then(creator),
        license: detail.and_then(license),
        trigger_words: version
            .trained_words
            .as_ref()
            .and_then(joined_words)
            .or_else(|| version.trigger_words.as_ref().and_then(joined_words)),
        tags: detail.and_then(|detail| tags(&detail.tags)),
        model_id,
        version_id: Some(version.id),
        model_url: model_id.map(|id| model_url(site_url, id, version.id)),
    }
}

/// Canonical model page URL for a version.
pub(crate) fn model_url(site_url: &str, model_id: i64, version_id: i64) -> String {
    format!(
        "{}/models/{model_id}?modelVersionId={version_id}",
        site_url.trim_end_matches('/')
    )
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Joins an array of words or a comma separated string with `", "`.
fn joined_words(value: &Value) -> Option<String> {
    let words: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|word| !word.is_empty())
            .map(str::to_owned)
            .collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|word| !word.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    };

    (!words.is_empty()).then(|| words.join(", "))
}

fn tags(values: &[Value]) -> Option<String> {
    let tags: Vec<&str> = values
        .iter()
        .filter_map(|value| match value {
            Value::String(tag) => Some(tag.as_str()),
            Value::Object(tag) => tag.get("name").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect();

    (!tags.is_empty()).then(|| tags.join(", "))
}

fn creator(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => non_empty(Some(name)),
        Value::Object(creator) => non_empty(creator.get("username").and_then(Value::as_str)),
        _ => None,
    }
}

/// A declared license verbatim, otherwise a summary of the permission flags.
fn license(detail: &ModelDetail) -> Option<String> {
    match &detail.license {
        Some(Value::String(license)) if !license.trim().is_empty() => {
            return Some(license.trim().to_owned());
        }
        Some(value @ (Value::Object(_) | Value::Array(_))) => return Some(value.to_string()),
        _ => {}
    }

    let mut pairs = Vec::new();
    if let Some(commercial) = detail.allow_commercial_use.as_ref().and_then(commercial_use) {
        pairs.push(format!("allowCommercialUse: {commercial}"));
    }
    for (key, flag) in [
        ("allowNoCredit", detail.allow_no_credit),
        ("allowDerivatives", detail.allow_derivatives),
        ("allowDifferentLicense", detail.allow_different_license),
    ] {
        if let Some(flag) = flag {
            pairs.push(format!("{key}: {flag}"));
        }
    }

    (!pairs.is_empty()).then(|| pairs.join(", "))
}

fn commercial_use(value: &Value) -> Option<String> {
    match value {
        Value::Array(uses) => {
            let uses: Vec<&str> = uses.iter().filter_map(Value::as_str).collect();
            Some(if uses.is_empty() {
                "None".to_owned()
            } else {
                uses.join("/")
            })
        }
        Value::String(single) => non_empty(Some(single)),
        Value::Bool(allowed) => Some(allowed.to_string()),
        _ => None,
    }
}
