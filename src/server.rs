//! HTTP Server
//!
//! Axum front end for the assistant with CORS, request tracing and graceful
//! shutdown.
//!
//! # Endpoints
//!
//! - `GET /` - Service name and version
//! - `GET /health-check/server` - Liveness
//! - `POST /command/execute` - Run a command (bearer token, `sub` = store id)
//! - `POST /admin/reload` - Rescan the capability directory (admin token)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assistant::{Assistant, CommandStatus};
use crate::capabilities::{CapabilityFilter, ExecutionContext};
use crate::config::Config;

/// Longest accepted command
pub const MAX_COMMAND_CHARS: usize = 160;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid token")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Bearer token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Store id
    pub sub: String,
    /// May trigger a registry reload
    #[serde(default)]
    pub admin: bool,
    /// Expiration
    pub exp: i64,
}

/// HS256 bearer token verification
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verified claims plus the raw token from an `Authorization` header
    pub fn verify(&self, headers: &HeaderMap) -> Result<(Claims, String), ApiError> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Forbidden)?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            ApiError::Forbidden
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(ApiError::Forbidden);
        }

        Ok((data.claims, token.to_string()))
    }
}

/// State shared by all handlers
pub struct AppState {
    pub assistant: Assistant,
    pub tokens: TokenVerifier,
    /// Base URL handed to capabilities
    pub tools_base_url: String,
    pub capabilities_dir: PathBuf,
    pub filter: CapabilityFilter,
}

impl AppState {
    pub fn new(assistant: Assistant, jwt_secret: &str, config: &Config) -> Self {
        Self {
            assistant,
            tokens: TokenVerifier::new(jwt_secret),
            tools_base_url: config.tools_base_url.clone(),
            capabilities_dir: config.capabilities_dir.clone(),
            filter: config.filter.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub id: Uuid,
    pub status: CommandStatus,
    pub tk: String,
    pub request: String,
    pub response: String,
}

/// Build the router with all routes and middleware
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health-check/server", get(server_health))
        .route("/command/execute", post(execute_command))
        .route("/admin/reload", post(reload_capabilities))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Start the server and run until a shutdown signal
pub async fn run(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    info!("Starting HTTP server on {}", addr);
    if !addr.ip().is_loopback() {
        warn!("Server bound to {} - make sure it sits behind TLS", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn server_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn execute_command(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> Result<Response, ApiError> {
    let (claims, token) = state.tokens.verify(&headers)?;

    let command = req.command.trim();
    if command.is_empty() {
        return Err(ApiError::BadRequest("No command provided".to_string()));
    }
    if command.chars().count() > MAX_COMMAND_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Command longer than {} characters",
            MAX_COMMAND_CHARS
        )));
    }

    let id = Uuid::new_v4();
    info!(request_id = %id, store_id = %claims.sub, "Executing command");

    let context = ExecutionContext::new(
        &claims.sub,
        &format!("Bearer {}", token),
        &state.tools_base_url,
    );

    let outcome = state.assistant.handle(command, &context).await.map_err(|e| {
        error!(request_id = %id, "Error executing command '{}': {}", command, e);
        ApiError::Internal("Error executing command".to_string())
    })?;

    let body = CommandResponse {
        id,
        status: outcome.status,
        tk: outcome.tk,
        request: command.to_string(),
        response: outcome.response,
    };

    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    Ok(response)
}

async fn reload_capabilities(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (claims, _) = state.tokens.verify(&headers)?;
    if !claims.admin {
        return Err(ApiError::Forbidden);
    }

    let count = state
        .assistant
        .registry()
        .reload(&state.capabilities_dir, &state.filter)
        .map_err(|e| {
            error!("Capability reload failed: {}", e);
            ApiError::Internal("Capability reload failed".to_string())
        })?;

    info!("Capability registry reloaded by '{}' ({} entries)", claims.sub, count);
    Ok(Json(json!({ "status": "Success", "capabilities": count })))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn bearer(secret: &str, claims: &Claims) -> HeaderMap {
        let token = encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            admin: false,
            exp: chrono::Utc::now().timestamp() + 600,
        }
    }

    #[test]
    fn test_verify_valid_token() {
        let verifier = TokenVerifier::new("secret");
        let (claims, token) = verifier.verify(&bearer("secret", &claims("store-1"))).unwrap();
        assert_eq!(claims.sub, "store-1");
        assert!(!claims.admin);
        assert!(!token.is_empty());
    }

    #[test]
    fn test_verify_rejects_bad_tokens() {
        let verifier = TokenVerifier::new("secret");

        assert!(matches!(
            verifier.verify(&HeaderMap::new()),
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            verifier.verify(&bearer("other-secret", &claims("store-1"))),
            Err(ApiError::Forbidden)
        ));

        let mut expired = claims("store-1");
        expired.exp = chrono::Utc::now().timestamp() - 3600;
        assert!(matches!(
            verifier.verify(&bearer("secret", &expired)),
            Err(ApiError::Forbidden)
        ));

        assert!(matches!(
            verifier.verify(&bearer("secret", &claims(" "))),
            Err(ApiError::Forbidden)
        ));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
