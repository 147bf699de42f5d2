//! Request Pipeline
//!
//! Wires the three stages together for one command:
//!
//! ```text
//! command ──► screen (all declarations)
//!                 │
//!                 ▼
//!             evaluate (category allowlist, registry lookup)
//!                 │ exactly one declaration
//!                 ▼
//!             execute (two model rounds)
//! ```
//!
//! Unsupported categories end as a polite rejection, everything else that
//! goes wrong is returned as an error.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::capabilities::{ExecutionContext, SharedRegistry};
use crate::error::PipelineError;
use crate::evaluation::evaluate;
use crate::execution::{execute, ExecutionRequest};
use crate::model::ModelClient;
use crate::screening::{screen, Category};

/// Reply for requests outside the supported categories
pub const GENERIC_REJECTION: &str = "Sorry, I can't help with that. Please contact support.";

/// Length of the capability token reported to callers
const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandStatus {
    Success,
    Error,
}

/// Result of one handled command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub response: String,
    /// Capability actually invoked; `None` on rejection
    pub capability: Option<String>,
    /// Opaque capability token; empty on rejection
    pub tk: String,
}

impl CommandOutcome {
    fn completed(answer: String, capability: &str) -> Self {
        Self {
            status: CommandStatus::Success,
            response: answer,
            capability: Some(capability.to_string()),
            tk: capability_token(capability),
        }
    }

    fn rejected() -> Self {
        Self {
            status: CommandStatus::Error,
            response: GENERIC_REJECTION.to_string(),
            capability: None,
            tk: String::new(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == CommandStatus::Error
    }
}

/// First 32 hex chars of the SHA-256 of a capability name
pub fn capability_token(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(TOKEN_LEN);
    digest
}

/// Screening, evaluation and execution over a shared registry
#[derive(Clone)]
pub struct Assistant {
    client: Arc<dyn ModelClient>,
    model: String,
    registry: SharedRegistry,
    supported: Vec<Category>,
}

impl Assistant {
    pub fn new(
        client: Arc<dyn ModelClient>,
        model: &str,
        registry: SharedRegistry,
        supported: Vec<Category>,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            registry,
            supported,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn supported_categories(&self) -> &[Category] {
        &self.supported
    }

    /// Run one command through the full pipeline
    pub async fn handle(
        &self,
        command: &str,
        context: &ExecutionContext,
    ) -> Result<CommandOutcome, PipelineError> {
        let registry = self.registry.current();
        let candidates = registry.declarations();

        let screening = screen(self.client.as_ref(), &self.model, command, &candidates).await?;

        let evaluation = match evaluate(&registry, &screening, &self.supported) {
            Ok(evaluation) => evaluation,
            Err(e) if e.is_rejection() => {
                warn!("Request rejected: {}", e);
                return Ok(CommandOutcome::rejected());
            }
            Err(e) => return Err(e),
        };

        info!("Validated capability '{}'", evaluation.capability);

        let names = evaluation.capability_names();
        let outcome = execute(
            self.client.as_ref(),
            &self.model,
            &registry,
            ExecutionRequest {
                system_instructions: None,
                request: command,
                declarations: &evaluation.declarations,
                capability_names: &names,
                context,
            },
        )
        .await?;

        let Some(invoked) = outcome.capability else {
            error!(
                "Capability '{}' was validated but never invoked",
                evaluation.capability
            );
            return Err(PipelineError::UnexpectedState(format!(
                "validated capability '{}' was not invoked",
                evaluation.capability
            )));
        };

        Ok(CommandOutcome::completed(outcome.answer, &invoked))
    }
}
