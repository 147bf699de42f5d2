//! Screening Stage
//!
//! One low-temperature model round-trip that classifies a free-text request
//! into a [`Category`] and suggests a single capability with arguments.
//! The model answers with a JSON envelope inside a fenced block; pulling it
//! out is isolated in [`extract_payload`].

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::capabilities::CapabilityDeclaration;
use crate::error::PipelineError;
use crate::instructions;
use crate::model::{ChatMessage, CompletionRequest, ModelClient, ModelError};

/// Keeps classification near-deterministic
pub const SCREENING_TEMPERATURE: f32 = 0.2;

const FENCE_OPEN: &str = "```json";
const FENCE: &str = "```";

/// Models sometimes echo the tool namespace back (`functions.list_files`).
/// Every occurrence is stripped, including inside longer words.
static NAMESPACE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"functions\.").unwrap());

/// Request categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "modification")]
    Modification,
    #[serde(rename = "troubleshooting")]
    Troubleshooting,
    #[serde(rename = "information")]
    Information,
    #[serde(rename = "file system interaction")]
    FileSystemInteraction,
    #[serde(rename = "illogical")]
    Illogical,
    #[serde(rename = "irrelevant")]
    Irrelevant,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Modification,
        Category::Troubleshooting,
        Category::Information,
        Category::FileSystemInteraction,
        Category::Illogical,
        Category::Irrelevant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Modification => "modification",
            Category::Troubleshooting => "troubleshooting",
            Category::Information => "information",
            Category::FileSystemInteraction => "file system interaction",
            Category::Illogical => "illogical",
            Category::Irrelevant => "irrelevant",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

/// Classification of a single request. Fields the model left out stay
/// `None` so evaluation can reject them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreeningResult {
    pub category: Option<Category>,
    /// `Some("")` means the model found no applicable capability
    pub recommended_capability: Option<String>,
    pub recommended_parameters: Map<String, Value>,
}

/// Classify `request` against `candidates`
pub async fn screen(
    client: &dyn ModelClient,
    model: &str,
    request: &str,
    candidates: &[CapabilityDeclaration],
) -> Result<ScreeningResult, PipelineError> {
    if request.trim().is_empty() {
        return Err(PipelineError::EmptyRequest);
    }
    if candidates.is_empty() {
        return Err(PipelineError::NoCapabilities);
    }

    let messages = vec![
        ChatMessage::system(instructions::SCREENING),
        ChatMessage::user(format!("```request: {}```", request)),
    ];
    let completion = CompletionRequest::new(model, messages)
        .with_tools(candidates.iter().map(|d| d.to_tool_spec()).collect())
        .with_temperature(SCREENING_TEMPERATURE);

    let reply = client.complete(completion).await.map_err(|e| {
        error!("Failed to get screening response from model: {}", e);
        PipelineError::ModelResponse(e)
    })?;

    let raw = reply
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(PipelineError::ModelResponse(ModelError::NoContent))?;
    debug!("Raw screening response: {}", raw);

    let payload = extract_payload(&raw).inspect_err(|e| error!("{}", e))?;
    let result = interpret_payload(&payload)?;

    info!(
        "Screened request: category={:?}, capability={:?}",
        result.category.map(|c| c.as_str()),
        result.recommended_capability
    );
    Ok(result)
}

/// Pull the JSON object out of free-form model text.
///
/// Takes everything after the first ```` ```json ```` marker up to the next
/// fence (or the end of the text), drops non-ASCII characters and removes
/// every `functions.` occurrence before parsing.
pub fn extract_payload(raw: &str) -> Result<Value, PipelineError> {
    let start = raw
        .find(FENCE_OPEN)
        .ok_or_else(|| PipelineError::ResponseParsing("no ```json block in model response".to_string()))?;

    let body = &raw[start + FENCE_OPEN.len()..];
    let body = body.find(FENCE).map_or(body, |end| &body[..end]);

    let ascii: String = body.chars().filter(|c| c.is_ascii()).collect();
    let cleaned = NAMESPACE_PREFIX.replace_all(&ascii, "");

    serde_json::from_str(cleaned.trim())
        .map_err(|e| PipelineError::ResponseParsing(format!("invalid JSON in model response: {}", e)))
}

/// Map the screening envelope onto a [`ScreeningResult`]
pub fn interpret_payload(payload: &Value) -> Result<ScreeningResult, PipelineError> {
    if !payload.is_object() {
        return Err(PipelineError::ResponseParsing(
            "screening payload is not a JSON object".to_string(),
        ));
    }

    let category = match payload.pointer("/request_breakdown/category") {
        Some(Value::String(s)) => Some(s.parse::<Category>().map_err(PipelineError::ResponseParsing)?),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(PipelineError::ResponseParsing(format!(
                "category must be a string, got {}",
                other
            )))
        }
    };

    let recommended_capability = match payload.get("exact_tool_name") {
        None => None,
        Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) if s.trim() == "null" => Some(String::new()),
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => {
            return Err(PipelineError::ResponseParsing(format!(
                "exact_tool_name must be a string, got {}",
                other
            )))
        }
    };

    let recommended_parameters = payload
        .get("exact_tool_params")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    Ok(ScreeningResult {
        category,
        recommended_capability,
        recommended_parameters,
    })
}
