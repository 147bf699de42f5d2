//! Capability Contract
//!
//! A capability is a named unit the model can ask us to run. Each one
//! exposes a [`CapabilityDeclaration`] (name, description, JSON schema,
//! usage note) and an async handler.
//!
//! # Layout
//!
//! ```text
//! capabilities/                 (directory scanned at startup)
//!   ├── list_files/             → CapabilityId::ListFiles
//!   ├── set_website_availability/
//!   └── _drafts/                (ignored: private prefix)
//! ```
//!
//! Directory names are resolved against the closed [`CapabilityId`]
//! enumeration; the handler code itself is compiled in.

pub mod list_files;
pub mod registry;
pub mod website;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub use list_files::ListFiles;
pub use registry::{CapabilityFilter, CapabilityRegistry, SharedRegistry};
pub use website::SetWebsiteAvailability;

/// Reserved argument key under which the execution context is merged
pub const CONTEXT_KEY: &str = "config";

/// Fatal capability failure. Recoverable problems are reported in the
/// returned payload instead.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Failed to initialise capability: {0}")]
    Init(String),

    #[error("Failed to serialize capability result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the model sees about a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDeclaration {
    /// Capability name (snake_case, unique)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for arguments
    pub parameters: Value,
    /// When the capability should and should not be used
    #[serde(default)]
    pub context: String,
}

impl CapabilityDeclaration {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            context: String::new(),
        }
    }

    /// Add a string parameter
    pub fn with_string_param(self, name: &str, description: &str, required: bool) -> Self {
        self.with_param(
            name,
            json!({
                "type": "string",
                "description": description
            }),
            required,
        )
    }

    /// Add a string parameter restricted to `values`
    pub fn with_enum_param(self, name: &str, description: &str, values: &[&str], required: bool) -> Self {
        self.with_param(
            name,
            json!({
                "type": "string",
                "enum": values,
                "description": description
            }),
            required,
        )
    }

    /// Add a parameter with an arbitrary schema
    pub fn with_param(mut self, name: &str, schema: Value, required: bool) -> Self {
        if let Some(props) = self.parameters.get_mut("properties") {
            props[name] = schema;
        }
        if required {
            if let Some(Value::Array(list)) = self.parameters.get_mut("required") {
                list.push(Value::String(name.to_string()));
            }
        }
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = context.to_string();
        self
    }

    /// Names of required parameters
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|list| list.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Format as an OpenAI-style function tool. The usage note rides along
    /// in the description so strict providers accept the payload.
    pub fn to_tool_spec(&self) -> Value {
        let description = if self.context.is_empty() {
            self.description.clone()
        } else {
            format!("{} Usage: {}", self.description, self.context)
        };

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": description,
                "parameters": self.parameters
            }
        })
    }
}

/// Per-request settings the caller hands to capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Store / tenant identifier
    #[serde(default)]
    pub store_id: String,
    /// Full `Authorization` header value (e.g. `Bearer ...`)
    #[serde(default)]
    pub authorization_header: String,
    /// Base URL of the backend the capability talks to
    #[serde(default)]
    pub endpoint: String,
}

impl ExecutionContext {
    pub fn new(store_id: &str, authorization_header: &str, endpoint: &str) -> Self {
        Self {
            store_id: store_id.to_string(),
            authorization_header: authorization_header.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Names of fields that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.store_id.trim().is_empty() {
            missing.push("store_id");
        }
        if self.authorization_header.trim().is_empty() {
            missing.push("authorization_header");
        }
        if self.endpoint.trim().is_empty() {
            missing.push("endpoint");
        }
        missing
    }

    /// Merge into model-supplied arguments under [`CONTEXT_KEY`]. Any value
    /// the model put there is overwritten.
    pub fn merge_into(&self, mut arguments: Map<String, Value>) -> Map<String, Value> {
        arguments.insert(
            CONTEXT_KEY.to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        arguments
    }
}

/// Outcome status reported back to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
    Failed,
}

/// Structured capability result: `{status, message}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub status: ToolStatus,
    pub message: Value,
}

impl ToolResponse {
    pub fn success(message: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            message,
        }
    }

    pub fn error(message: Value) -> Self {
        Self {
            status: ToolStatus::Error,
            message,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Failed,
            message: Value::String(message.into()),
        }
    }

    pub fn into_value(self) -> Value {
        json!({
            "status": self.status,
            "message": self.message
        })
    }
}

/// Every capability implements this
#[async_trait]
pub trait Capability: Send + Sync {
    /// Pure; called once at bootstrap
    fn declaration(&self) -> CapabilityDeclaration;

    /// Run with model-supplied arguments. `arguments` already carries the
    /// context under [`CONTEXT_KEY`].
    async fn invoke(
        &self,
        arguments: Map<String, Value>,
        context: &ExecutionContext,
    ) -> Result<Value, CapabilityError>;
}

/// Built-in capability identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityId {
    ListFiles,
    SetWebsiteAvailability,
}

impl CapabilityId {
    pub const ALL: [CapabilityId; 2] = [CapabilityId::ListFiles, CapabilityId::SetWebsiteAvailability];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityId::ListFiles => "list_files",
            CapabilityId::SetWebsiteAvailability => "set_website_availability",
        }
    }

    /// Construct the handler for this identifier
    pub fn instantiate(&self) -> Result<Arc<dyn Capability>, CapabilityError> {
        Ok(match self {
            CapabilityId::ListFiles => Arc::new(ListFiles),
            CapabilityId::SetWebsiteAvailability => Arc::new(SetWebsiteAvailability::new()?),
        })
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("Unknown capability: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_builder() {
        let decl = CapabilityDeclaration::new("toggle", "Toggle a thing")
            .with_enum_param("state", "On or off", &["on", "off"], true)
            .with_string_param("note", "Optional note", false)
            .with_context("Only for toggling.");

        assert_eq!(decl.required(), vec!["state"]);
        assert_eq!(decl.parameters["properties"]["state"]["enum"][1], "off");
        assert_eq!(decl.context, "Only for toggling.");
    }

    #[test]
    fn test_tool_spec_format() {
        let decl = CapabilityDeclaration::new("list_files", "Lists files.")
            .with_string_param("directory", "Path", true)
            .with_context("Directory listing only.");

        let spec = decl.to_tool_spec();
        assert_eq!(spec["type"], "function");
        assert_eq!(spec["function"]["name"], "list_files");
        assert_eq!(spec["function"]["parameters"]["required"][0], "directory");
        assert!(spec["function"]["description"]
            .as_str()
            .unwrap()
            .ends_with("Usage: Directory listing only."));
    }

    #[test]
    fn test_context_merge_overwrites_model_value() {
        let ctx = ExecutionContext::new("42", "Bearer abc", "https://api.example.com");
        let mut args = Map::new();
        args.insert("directory".to_string(), json!("/tmp"));
        args.insert(CONTEXT_KEY.to_string(), json!({"store_id": "spoofed"}));

        let merged = ctx.merge_into(args);
        assert_eq!(merged["directory"], "/tmp");
        assert_eq!(merged[CONTEXT_KEY]["store_id"], "42");
        assert_eq!(merged[CONTEXT_KEY]["authorization_header"], "Bearer abc");
    }

    #[test]
    fn test_missing_context_fields() {
        let ctx = ExecutionContext::new("42", "", " ");
        assert_eq!(ctx.missing_fields(), vec!["authorization_header", "endpoint"]);
        assert!(ExecutionContext::new("1", "Bearer x", "http://x").missing_fields().is_empty());
    }

    #[test]
    fn test_tool_response_shape() {
        let value = ToolResponse::error(json!({"error": "boom"})).into_value();
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"]["error"], "boom");

        let value = ToolResponse::failed("API error: 500").into_value();
        assert_eq!(value["status"], "failed");
    }

    #[test]
    fn test_capability_id_roundtrip_names() {
        for id in CapabilityId::ALL {
            assert_eq!(id.as_str().parse::<CapabilityId>().unwrap(), id);
            let handler = id.instantiate().unwrap();
            assert_eq!(handler.declaration().name, id.as_str());
        }
        assert!("make_pizza".parse::<CapabilityId>().is_err());
    }
}
