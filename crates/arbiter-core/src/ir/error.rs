//! Error types for IR lowering.

/// Errors produced while lowering one IR kind.
///
/// A lowering error is scoped to the kind being produced; other kinds lowered
/// from the same tree are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("section '{section}' is malformed: {reason}")]
    MalformedSection { section: String, reason: String },

    #[error("entry '{entry}' in section '{section}' is malformed: {reason}")]
    MalformedEntry {
        section: String,
        entry: String,
        reason: String,
    },
}

/// Result type for IR lowering.
pub type IrResult<T> = std::result::Result<T, IrError>;
