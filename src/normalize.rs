//! Collapses the inference service's success bodies into one reply.
//!
//! Upstream answers with a list of generations, a bare generation object, or
//! an error object, depending on the model and deployment. Each layout is
//! recognised by a detector in [`SHAPE_DETECTORS`]; the first one that
//! matches decides the reply.

use serde_json::Value;

use crate::models::NormalizedReply;

pub const ASSISTANT_MARKER: &str = "Assistant:";

pub const INVALID_BODY_REPLY: &str =
    "Hugging-face-style inference service returned an invalid response.";
pub const UNKNOWN_SHAPE_REPLY: &str = "No valid response received from model.";

#[derive(Debug, thiserror::Error)]
#[error("upstream body is not valid JSON: {0}")]
pub struct FormatError(#[from] serde_json::Error);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Generated(String),
    ModelError(String),
}

pub type ShapeDetector = fn(&Value) -> Option<Extracted>;

/// Evaluated in order; first match wins.
pub const SHAPE_DETECTORS: &[(&str, ShapeDetector)] = &[
    ("generation_list", detect_generation_list),
    ("generation_object", detect_generation_object),
    ("error_object", detect_error_object),
];

pub fn normalize(raw: &[u8]) -> Result<NormalizedReply, FormatError> {
    let value: Value = serde_json::from_slice(raw)?;
    Ok(normalize_value(&value))
}

pub fn normalize_value(value: &Value) -> NormalizedReply {
    let detected = SHAPE_DETECTORS
        .iter()
        .find_map(|(name, detect)| detect(value).map(|extracted| (*name, extracted)));
    match detected {
        Some((shape, Extracted::Generated(text))) => {
            tracing::debug!(shape, "upstream generation extracted");
            NormalizedReply::ok(trim_prompt_echo(&text))
        }
        Some((shape, Extracted::ModelError(message))) => {
            tracing::debug!(shape, "upstream reported a model error");
            NormalizedReply::warning(format!("Model error: {}", message))
        }
        None => NormalizedReply::warning(UNKNOWN_SHAPE_REPLY),
    }
}

/// Keeps what follows the last `Assistant:` marker. Text without the marker
/// is returned unchanged.
pub fn trim_prompt_echo(text: &str) -> String {
    match text.rfind(ASSISTANT_MARKER) {
        Some(idx) => text[idx + ASSISTANT_MARKER.len()..].trim().to_string(),
        None => text.to_string(),
    }
}

fn generated_text(value: &Value) -> Option<String> {
    value
        .get("generated_text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn detect_generation_list(value: &Value) -> Option<Extracted> {
    let first = value.as_array()?.first()?;
    generated_text(first).map(Extracted::Generated)
}

fn detect_generation_object(value: &Value) -> Option<Extracted> {
    if !value.is_object() {
        return None;
    }
    generated_text(value).map(Extracted::Generated)
}

fn detect_error_object(value: &Value) -> Option<Extracted> {
    let candidate = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let error = candidate.as_object()?.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(Extracted::ModelError(message))
}
