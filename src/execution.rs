//! Execution Stage
//!
//! Two model rounds around a capability call:
//!
//! ```text
//! [system, user] ──► round 1 (tools offered, tool_choice=auto, T=0)
//!                        │ tool_calls
//!                        ▼
//!                  invoke each offered capability, append tool results
//!                        │
//!                        ▼
//!                  round 2 (no tools) ──► final answer
//! ```
//!
//! Nothing is retried. A handler error ends the request.

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::capabilities::{CapabilityDeclaration, CapabilityRegistry, ExecutionContext, ToolResponse};
use crate::error::PipelineError;
use crate::instructions;
use crate::model::{ChatMessage, CompletionRequest, ModelClient, ModelError, ToolCall, ToolChoice};

/// Dispatch must be deterministic
pub const EXECUTION_TEMPERATURE: f32 = 0.0;

/// Inputs for one execution
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    /// Overrides the automatic instruction choice
    pub system_instructions: Option<&'a str>,
    pub request: &'a str,
    /// Declarations offered to the model
    pub declarations: &'a [CapabilityDeclaration],
    /// Names the model is allowed to invoke
    pub capability_names: &'a [String],
    pub context: &'a ExecutionContext,
}

/// Final answer plus the last capability actually invoked
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub answer: String,
    pub capability: Option<String>,
}

/// Run the two-round dialogue
pub async fn execute(
    client: &dyn ModelClient,
    model: &str,
    registry: &CapabilityRegistry,
    request: ExecutionRequest<'_>,
) -> Result<ExecutionOutcome, PipelineError> {
    if request.request.trim().is_empty() {
        return Err(PipelineError::EmptyRequest);
    }
    if request.declarations.is_empty() || request.capability_names.is_empty() {
        return Err(PipelineError::NoCapabilities);
    }

    let system = request
        .system_instructions
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| instructions::for_capabilities(request.capability_names));

    let mut conversation = vec![ChatMessage::system(system), ChatMessage::user(request.request)];

    info!("Processing request with capabilities {:?}", request.capability_names);

    let round_one = CompletionRequest::new(model, conversation.clone())
        .with_tools(request.declarations.iter().map(|d| d.to_tool_spec()).collect())
        .with_tool_choice(ToolChoice::Auto)
        .with_temperature(EXECUTION_TEMPERATURE);

    let reply = client.complete(round_one).await.map_err(|e| {
        error!("Round one completion failed: {}", e);
        PipelineError::ModelResponse(e)
    })?;

    if reply.tool_calls.is_empty() {
        error!(
            "No capability requested in round one (reply: {:?})",
            reply.content
        );
        return Err(PipelineError::UnexpectedState(
            "model did not request the validated capability".to_string(),
        ));
    }

    let calls = reply.tool_calls.clone();
    conversation.push(reply.into_message());

    let mut invoked = None;
    for call in &calls {
        let name = &call.function.name;

        if !request.capability_names.iter().any(|n| n == name) {
            warn!("Model requested capability '{}' which was not offered", name);
            conversation.push(not_offered(call));
            continue;
        }

        let content = invoke(registry, call, request.context).await?;
        conversation.push(ChatMessage::tool(&call.id, name, content));
        invoked = Some(name.clone());
    }

    let reply = client
        .complete(CompletionRequest::new(model, conversation))
        .await
        .map_err(|e| {
            error!("Round two completion failed: {}", e);
            PipelineError::ModelResponse(e)
        })?;

    let answer = reply
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or(PipelineError::ModelResponse(ModelError::NoContent))?;

    info!("Final answer produced (capability: {:?})", invoked);

    Ok(ExecutionOutcome {
        answer,
        capability: invoked,
    })
}

/// Call one capability and serialize its result
async fn invoke(
    registry: &CapabilityRegistry,
    call: &ToolCall,
    context: &ExecutionContext,
) -> Result<String, PipelineError> {
    let name = &call.function.name;
    let handler = registry
        .handler(name)
        .ok_or_else(|| PipelineError::CapabilityNotFound(name.clone()))?;

    let arguments = context.merge_into(parse_arguments(&call.function.arguments)?);
    debug!("Invoking '{}' with {} argument(s)", name, arguments.len());

    let failed = |source| PipelineError::CapabilityFailed {
        capability: name.clone(),
        source,
    };

    let result = handler.invoke(arguments, context).await.map_err(|e| {
        error!("Capability '{}' failed: {}", name, e);
        failed(e)
    })?;

    let content = serde_json::to_string(&result).map_err(|e| failed(e.into()))?;
    debug!("Capability '{}' responded: {}", name, content);
    Ok(content)
}

/// Tool result for a call naming a capability outside the offered set. The
/// call is answered so the conversation stays well formed.
fn not_offered(call: &ToolCall) -> ChatMessage {
    let payload = ToolResponse::error(json!({
        "error": format!("Capability '{}' is not available", call.function.name)
    }));
    ChatMessage::tool(&call.id, &call.function.name, payload.into_value().to_string())
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, PipelineError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(PipelineError::ResponseParsing(format!(
            "capability arguments must be a JSON object, got {}",
            other
        ))),
        Err(e) => Err(PipelineError::ResponseParsing(format!(
            "invalid capability arguments: {}",
            e
        ))),
    }
}
