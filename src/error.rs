//! Pipeline Error Taxonomy
//!
//! Every stage returns [`PipelineError`]. The transport layer decides the
//! final user-facing status; only [`PipelineError::UnsupportedCategory`] is
//! meant to be rendered as a polite rejection instead of a failure.

use std::path::PathBuf;

use crate::capabilities::CapabilityError;
use crate::model::ModelError;
use crate::screening::Category;

/// Errors raised by the screening, evaluation and execution stages
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No request provided")]
    EmptyRequest,

    #[error("No capabilities available for the request")]
    NoCapabilities,

    #[error("Failed to get response from model: {0}")]
    ModelResponse(#[from] ModelError),

    #[error("Error processing model response: {0}")]
    ResponseParsing(String),

    #[error("Screening result is missing field '{0}'")]
    MissingField(&'static str),

    #[error("The request category is not supported. Category: '{0}'")]
    UnsupportedCategory(Category),

    #[error("The recommended capability does not exist. Capability: '{0}'")]
    CapabilityNotFound(String),

    #[error("Unexpected pipeline state: {0}")]
    UnexpectedState(String),

    #[error("Capability '{capability}' failed: {source}")]
    CapabilityFailed {
        capability: String,
        #[source]
        source: CapabilityError,
    },
}

impl PipelineError {
    /// True when the caller should answer with a generic "can't help" reply
    pub fn is_rejection(&self) -> bool {
        matches!(self, PipelineError::UnsupportedCategory(_))
    }
}

/// Registry bootstrap failure
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Capability root {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
