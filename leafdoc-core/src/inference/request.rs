//! Request construction for both supported call shapes.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::types::{ChatTurn, Role};

use super::wire::{Content, GenerateRequest, GenerationConfig, Part};

/// Mime type assumed when the image source provides none.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

pub const ANALYSIS_INSTRUCTION: &str = "You are a plant pathologist. Examine the leaf in this photo and report: \
health_percentage as a whole number from 0 to 100, predicted_disease as a short disease name \
(use \"Healthy\" if no disease is visible), and home_remedies as 3 to 5 short, actionable \
strings whose first entry summarizes the plant's current status.";

/// Response schema matching [`crate::types::AnalysisResult`].
pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "health_percentage": {
                "type": "INTEGER",
                "description": "Overall plant health from 0 to 100"
            },
            "predicted_disease": {
                "type": "STRING",
                "description": "Short disease name, or Healthy"
            },
            "home_remedies": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "minItems": 3,
                "maxItems": 5
            }
        },
        "required": ["health_percentage", "predicted_disease", "home_remedies"]
    })
}

/// Builds single-turn image analysis requests.
#[derive(Debug, Clone)]
pub struct MultimodalRequestBuilder {
    instruction: String,
    schema: Value,
}

impl Default for MultimodalRequestBuilder {
    fn default() -> Self {
        Self::new(ANALYSIS_INSTRUCTION, analysis_schema())
    }
}

impl MultimodalRequestBuilder {
    pub fn new(instruction: impl Into<String>, schema: Value) -> Self {
        Self {
            instruction: instruction.into(),
            schema,
        }
    }

    /// Encode `image_bytes` with this builder's instruction and schema.
    pub fn build(&self, image_bytes: &[u8], mime_type: Option<&str>) -> Result<GenerateRequest> {
        build_analysis_request(image_bytes, mime_type, &self.instruction, &self.schema)
    }
}

/// Build a single-turn image analysis request.
///
/// Fails with [`Error::Encoding`] only when there is nothing to encode. A
/// non-image mime type is passed through and left to the endpoint.
pub fn build_analysis_request(
    image_bytes: &[u8],
    mime_type: Option<&str>,
    instruction: &str,
    schema: &Value,
) -> Result<GenerateRequest> {
    if image_bytes.is_empty() {
        return Err(Error::Encoding("image is empty".to_string()));
    }

    let mime_type = mime_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE);
    if !mime_type.starts_with("image/") {
        tracing::warn!(mime_type, "Encoding image with a non-image mime type");
    }

    Ok(GenerateRequest {
        contents: vec![Content {
            role: Some(Role::User.as_str().to_string()),
            parts: vec![
                Part::text(instruction),
                Part::inline(mime_type, BASE64.encode(image_bytes)),
            ],
        }],
        generation_config: Some(GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: schema.clone(),
        }),
        system_instruction: None,
    })
}

/// Build a multi-turn chat request.
///
/// `history` is the caller's materialized view; turns without text are
/// skipped. `utterance` becomes the final user turn.
pub fn build_chat_request(
    history: &[ChatTurn],
    utterance: &str,
    system_instruction: &str,
) -> GenerateRequest {
    let mut contents: Vec<Content> = history
        .iter()
        .filter(|turn| turn.has_text())
        .map(|turn| Content::text(Some(turn.role.as_str()), turn.text.clone()))
        .collect();
    contents.push(Content::text(Some(Role::User.as_str()), utterance));

    GenerateRequest {
        contents,
        generation_config: None,
        system_instruction: Some(Content::text(None, system_instruction)),
    }
}

/// Guess an image mime type from a file extension.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
