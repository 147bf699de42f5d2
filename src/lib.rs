//! StoreBot
//!
//! Natural-language operations assistant for store owners. A free-text
//! command is classified by a model, checked against a registry of
//! capabilities, and carried out through a two-round tool-calling dialogue.
//!
//! # Features
//!
//! - **Screening**: Low-temperature classification into a fixed category set
//! - **Evaluation**: Category allowlist and hallucination check against the registry
//! - **Execution**: Two-round tool calling with caller context merged into arguments
//! - **Capability Registry**: Directory scan at startup, atomic reload
//! - **HTTP API**: Bearer-authenticated command endpoint
//!
//! # Architecture
//!
//! ```text
//! Client ──► HTTP API ──► Assistant ──► Model API
//!             (axum)         │
//!                            ├── Screening (classify + recommend)
//!                            ├── Evaluation (validate)
//!                            ├── Execution (2 rounds)
//!                            └── Registry ──► Capabilities
//!                                               ├── list_files
//!                                               └── set_website_availability
//! ```

pub mod assistant;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod execution;
pub mod instructions;
pub mod model;
pub mod screening;
pub mod server;

pub use assistant::{capability_token, Assistant, CommandOutcome, CommandStatus, GENERIC_REJECTION};
pub use capabilities::{
    Capability, CapabilityDeclaration, CapabilityError, CapabilityFilter, CapabilityId,
    CapabilityRegistry, ExecutionContext, SharedRegistry, ToolResponse, ToolStatus,
};
pub use config::Config;
pub use error::{BootstrapError, PipelineError};
pub use evaluation::{evaluate, Evaluation};
pub use execution::{execute, ExecutionOutcome, ExecutionRequest};
pub use model::{
    AssistantReply, ChatMessage, CompletionRequest, ModelClient, ModelError, OpenAiClient,
    ToolCall, ToolChoice,
};
pub use screening::{extract_payload, screen, Category, ScreeningResult};
pub use server::{AppState, Claims, TokenVerifier};
