//! Evaluation Stage
//!
//! Checks a screening result before anything runs. The category must be one
//! the caller is willing to act on and the recommended capability must exist
//! in the registry.

use tracing::{info, warn};

use crate::capabilities::{CapabilityDeclaration, CapabilityRegistry};
use crate::error::PipelineError;
use crate::screening::{Category, ScreeningResult};

/// A validated capability, ready for execution
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Exactly one declaration
    pub declarations: Vec<CapabilityDeclaration>,
    pub capability: String,
}

impl Evaluation {
    /// Names offered to the execution round
    pub fn capability_names(&self) -> Vec<String> {
        vec![self.capability.clone()]
    }
}

/// Validate `screening` against the registry and the caller's allowlist.
///
/// The category check runs before the capability check.
pub fn evaluate(
    registry: &CapabilityRegistry,
    screening: &ScreeningResult,
    supported_categories: &[Category],
) -> Result<Evaluation, PipelineError> {
    let category = screening
        .category
        .ok_or(PipelineError::MissingField("request_category"))?;
    let capability = screening
        .recommended_capability
        .as_deref()
        .ok_or(PipelineError::MissingField("recommended_capability"))?;

    if !supported_categories.contains(&category) {
        info!("Rejecting unsupported category '{}'", category);
        return Err(PipelineError::UnsupportedCategory(category));
    }

    let declaration = match registry.lookup(capability) {
        Some(decl) if !capability.is_empty() => decl.clone(),
        _ => {
            warn!("Recommended capability '{}' does not exist", capability);
            return Err(PipelineError::CapabilityNotFound(capability.to_string()));
        }
    };

    Ok(Evaluation {
        declarations: vec![declaration],
        capability: capability.to_string(),
    })
}
