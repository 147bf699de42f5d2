//! Shared test doubles: a scripted model, a recording capability and a fake
//! store settings backend.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Form, Path, State},
    http::{HeaderMap, StatusCode},
    routing::put,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use storebot::{
    AssistantReply, Capability, CapabilityDeclaration, CapabilityError, CompletionRequest,
    ExecutionContext, ModelClient, ModelError, ToolResponse,
};

/// Replays canned replies in order and records every request
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<AssistantReply, ModelError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<AssistantReply, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(replies: Vec<AssistantReply>) -> Self {
        Self::new(replies.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantReply, ModelError> {
        self.requests.lock().push(request);
        self.replies.lock().pop_front().unwrap_or(Err(ModelError::NoChoices))
    }
}

/// Screening envelope wrapped in a fenced block, as the model sends it
pub fn screening_reply(category: &str, tool: &str, params: Value) -> AssistantReply {
    let exists = if tool == "null" { "false" } else { "true" };
    let body = json!({
        "request_breakdown": {
            "category": category,
            "wants_to": "",
            "by_specifying": "",
            "so_that": ""
        },
        "exact_tool_exists": exists,
        "exact_tool_name": tool,
        "exact_tool_params": params
    });
    AssistantReply::text(&format!("Sure.\n```json\n{}\n```", body))
}

/// Capability that records the arguments of every invocation
pub struct RecordingCapability {
    name: &'static str,
    calls: Mutex<Vec<Map<String, Value>>>,
}

impl RecordingCapability {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    fn declaration(&self) -> CapabilityDeclaration {
        CapabilityDeclaration::new(self.name, "Records its arguments")
            .with_string_param("value", "Anything", false)
    }

    async fn invoke(
        &self,
        arguments: Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<Value, CapabilityError> {
        self.calls.lock().push(arguments);
        Ok(ToolResponse::success(json!({"recorded": true})).into_value())
    }
}

/// One request received by the fake settings backend
#[derive(Debug, Clone)]
pub struct BackendHit {
    pub store_id: String,
    pub authorization: Option<String>,
    pub passport: Option<String>,
    pub form: HashMap<String, String>,
}

type BackendState = (Arc<Mutex<Vec<BackendHit>>>, StatusCode);

/// Serve `PUT /settings/{store_id}` on an ephemeral port, answering with
/// `status`. Returns the base URL and the recorded hits.
pub async fn spawn_backend(status: StatusCode) -> (String, Arc<Mutex<Vec<BackendHit>>>) {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/settings/{store_id}", put(update_settings))
        .with_state((hits.clone(), status));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), hits)
}

async fn update_settings(
    State((hits, status)): State<BackendState>,
    Path(store_id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    };

    let online = form.get("online").cloned();
    hits.lock().push(BackendHit {
        store_id: store_id.clone(),
        authorization: header("authorization"),
        passport: header("passport"),
        form,
    });

    (status, Json(json!({"store_id": store_id, "online": online})))
}
