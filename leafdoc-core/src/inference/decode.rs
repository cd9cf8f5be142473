//! Decoding model output into typed results.
//!
//! The model is asked for JSON but nothing forces it to comply, so every
//! field is checked before an [`AnalysisResult`] is produced. Decode
//! failures are structural and never retried here.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::AnalysisResult;

use super::wire::GenerateResponse;

/// Advised remedy count; values outside are accepted with a warning.
const REMEDY_RANGE: std::ops::RangeInclusive<usize> = 3..=5;

/// Text of the first part of the first candidate.
pub fn extract_text(envelope: &GenerateResponse) -> Result<&str> {
    envelope
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.first())
        .and_then(|part| part.text.as_deref())
        .filter(|text| !text.trim().is_empty())
        .ok_or(Error::EmptyResponse)
}

/// Free-text reply for chat.
pub fn decode_text(envelope: &GenerateResponse) -> Result<String> {
    extract_text(envelope).map(|text| text.trim().to_string())
}

/// Validate the envelope's text as an [`AnalysisResult`].
pub fn decode_analysis(envelope: &GenerateResponse) -> Result<AnalysisResult> {
    let text = extract_text(envelope)?;
    let object = parse_object(text)?;

    let health_percentage = parse_health(&object)?;
    let predicted_disease = parse_disease(&object)?;
    let remedies = parse_remedies(&object)?;

    if !(0..=100).contains(&health_percentage) {
        tracing::warn!(health_percentage, "Model returned out-of-range health value");
    }
    if !REMEDY_RANGE.contains(&remedies.len()) {
        tracing::warn!(count = remedies.len(), "Model returned unexpected remedy count");
    }

    Ok(AnalysisResult {
        health_percentage,
        predicted_disease,
        remedies,
    })
}

fn parse_object(text: &str) -> Result<Map<String, Value>> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(first_err) => {
            let inner = embedded_object(text).ok_or_else(|| {
                Error::SchemaViolation(format!("response is not JSON: {}", first_err))
            })?;
            serde_json::from_str::<Value>(inner)
                .map_err(|e| Error::SchemaViolation(format!("response is not JSON: {}", e)))?
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::SchemaViolation(format!(
            "response must be a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

/// Slice between the first `{` and the last `}`, for fenced replies.
fn embedded_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn required<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    object
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| Error::SchemaViolation(format!("missing field `{}`", field)))
}

fn parse_health(object: &Map<String, Value>) -> Result<i64> {
    let value = required(object, "health_percentage")?;
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        _ => Err(Error::SchemaViolation(format!(
            "`health_percentage` must be an integer, got {}",
            value
        ))),
    }
}

fn parse_disease(object: &Map<String, Value>) -> Result<String> {
    let value = required(object, "predicted_disease")?;
    match value.as_str().map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        Some(_) => Err(Error::SchemaViolation(
            "`predicted_disease` must not be empty".to_string(),
        )),
        None => Err(Error::SchemaViolation(format!(
            "`predicted_disease` must be a string, got {}",
            json_type(value)
        ))),
    }
}

fn parse_remedies(object: &Map<String, Value>) -> Result<Vec<String>> {
    let value = required(object, "home_remedies")?;
    let items = value.as_array().ok_or_else(|| {
        Error::SchemaViolation(format!(
            "`home_remedies` must be an array, got {}",
            json_type(value)
        ))
    })?;

    let mut remedies = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let text = item.as_str().ok_or_else(|| {
            Error::SchemaViolation(format!(
                "`home_remedies[{}]` must be a string, got {}",
                idx,
                json_type(item)
            ))
        })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::SchemaViolation(format!(
                "`home_remedies[{}]` must not be empty",
                idx
            )));
        }
        remedies.push(text.to_string());
    }
    Ok(remedies)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::wire::{Candidate, Content};

    fn envelope(text: &str) -> GenerateResponse {
        GenerateResponse::with_text(text)
    }

    #[test]
    fn test_decode_valid_analysis() {
        let result = decode_analysis(&envelope(
            r#"{"health_percentage": 72, "predicted_disease": "Leaf Blight",
                "home_remedies": ["Moderate infection", "Remove affected leaves", "Apply neem oil"]}"#,
        ))
        .unwrap();

        assert_eq!(result.health_percentage, 72);
        assert_eq!(result.predicted_disease, "Leaf Blight");
        assert_eq!(result.remedies.len(), 3);
        assert_eq!(result.summary(), Some("Moderate infection"));
        assert!(!result.is_healthy());
    }

    #[test]
    fn test_decode_rejects_wrong_health_type() {
        let err = decode_analysis(&envelope(
            r#"{"health_percentage": "high", "predicted_disease": "Rust", "home_remedies": ["a","b","c"]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(ref m) if m.contains("health_percentage")));

        let err = decode_analysis(&envelope(
            r#"{"health_percentage": 72.5, "predicted_disease": "Rust", "home_remedies": ["a","b","c"]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
    }

    #[test]
    fn test_decode_accepts_integral_float_and_out_of_range() {
        let result = decode_analysis(&envelope(
            r#"{"health_percentage": 140.0, "predicted_disease": "healthy", "home_remedies": ["Thriving","Water weekly","Keep in sun"]}"#,
        ))
        .unwrap();
        assert_eq!(result.health_percentage, 140);
        assert!(result.is_healthy());
    }

    #[test]
    fn test_decode_no_candidates_is_empty_response() {
        let err = decode_analysis(&GenerateResponse::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyResponse));

        let blocked = GenerateResponse {
            candidates: vec![Candidate {
                content: None,
                finish_reason: Some("SAFETY".to_string()),
            }],
        };
        assert!(matches!(decode_analysis(&blocked), Err(Error::EmptyResponse)));

        let blank = GenerateResponse {
            candidates: vec![Candidate {
                content: Some(Content::text(Some("model"), "   ")),
                finish_reason: None,
            }],
        };
        assert!(matches!(decode_text(&blank), Err(Error::EmptyResponse)));
    }

    #[test]
    fn test_decode_tolerates_code_fence() {
        let result = decode_analysis(&envelope(
            "```json\n{\"health_percentage\": 10, \"predicted_disease\": \"Mildew\", \"home_remedies\": [\"Severe\", \"Prune\", \"Fungicide\"]}\n```",
        ))
        .unwrap();
        assert_eq!(result.predicted_disease, "Mildew");
    }

    #[test]
    fn test_decode_rejects_non_json_and_non_objects() {
        assert!(matches!(
            decode_analysis(&envelope("The plant looks sick.")),
            Err(Error::SchemaViolation(_))
        ));
        assert!(matches!(
            decode_analysis(&envelope("[1, 2, 3]")),
            Err(Error::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_and_mistyped_fields() {
        let err = decode_analysis(&envelope(
            r#"{"health_percentage": 50, "home_remedies": ["a","b","c"]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(ref m) if m.contains("predicted_disease")));

        let err = decode_analysis(&envelope(
            r#"{"health_percentage": 50, "predicted_disease": "Rot", "home_remedies": ["a", 2, "c"]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(ref m) if m.contains("home_remedies[1]")));

        let err = decode_analysis(&envelope(
            r#"{"health_percentage": 50, "predicted_disease": "Rot", "home_remedies": "water it"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));
    }

    #[test]
    fn test_decode_rejects_blank_remedy_entry() {
        let err = decode_analysis(&envelope(
            r#"{"health_percentage": 40, "predicted_disease": "Powdery Mildew",
                "home_remedies": ["  ", "Spray diluted milk", "Improve airflow"]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(ref m) if m.contains("home_remedies[0]")));
    }

    #[test]
    fn test_decode_text_trims_reply() {
        let text = decode_text(&envelope("  Water every other day.\n")).unwrap();
        assert_eq!(text, "Water every other day.");
    }
}
