//! Domain-level error taxonomy for Arbiter.

use crate::ir::IrError;

/// Arbiter domain errors.
///
/// These are contract violations and local failures. Expected validation
/// outcomes (schema failures, rule violations, tool crashes) are reported as
/// [`crate::ValidationError`] records instead.
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("invalid fragment path '{path}': {reason}")]
    InvalidFragmentPath { path: String, reason: String },

    #[error("malformed resolved tree: {0}")]
    MalformedResolved(String),

    #[error("NaN/Infinity not permitted in canonical JSON")]
    NonFiniteNumber,

    #[error("invalid assertion '{description}': {reason}")]
    InvalidAssertion { description: String, reason: String },

    #[error("no resolved tree: lowering requires a successful validation")]
    NotResolved,

    #[error("unknown IR kind: {0}")]
    UnknownIrKind(String),

    #[error("lowering error: {0}")]
    Lowering(#[from] IrError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Arbiter domain operations.
pub type Result<T> = std::result::Result<T, ArbiterError>;
