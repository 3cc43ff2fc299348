//! Validation outcome records exposed to every caller of the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::resolved::ResolvedSpec;

/// Origin class of a validation error.
///
/// Callers distinguish "cannot be parsed" (`Schema`/`Execution`) from
/// "parses but violates a rule" (`Assertion`) using only this tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The source fails structural or type validation in the evaluator.
    Schema,
    /// The source is valid but violates a business rule.
    Assertion,
    /// An external process could not be run, timed out, or crashed.
    Execution,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Schema => "schema",
            ErrorKind::Assertion => "assertion",
            ErrorKind::Execution => "execution",
        };
        f.write_str(s)
    }
}

/// A single validation error record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ValidationError {
    /// Error of `kind` with no details.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Resolution failure reported by the evaluator.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    /// Business-rule violation found after a successful resolution.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, message)
    }

    /// An external tool did not run to completion.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    /// Attach structured context (file/line, query, captured stderr, ...).
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Outcome of one `validate` call.
///
/// # Invariants
///
/// - `success == false` implies `hash` is empty and `resolved` is absent.
/// - `success == true` implies `hash` is the spec hash of `resolved`.
///
/// Assertion errors never flip `success`; they are appended alongside a
/// populated `resolved` and `hash`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedSpec>,

    pub hash: String,

    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// A successful resolution.
    pub fn resolved(resolved: ResolvedSpec, hash: String) -> Self {
        Self {
            success: true,
            resolved: Some(resolved),
            hash,
            errors: Vec::new(),
        }
    }

    /// A terminal failure carrying the given errors.
    pub fn failed(errors: Vec<ValidationError>) -> Self {
        Self {
            success: false,
            resolved: None,
            hash: String::new(),
            errors,
        }
    }

    /// A terminal failure carrying one error.
    pub fn failure(error: ValidationError) -> Self {
        Self::failed(vec![error])
    }

    /// Append non-terminal errors (assertion findings).
    pub fn with_errors(mut self, errors: impl IntoIterator<Item = ValidationError>) -> Self {
        self.errors.extend(errors);
        self
    }

    /// Errors of one kind, in report order.
    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn has_schema_errors(&self) -> bool {
        self.errors_of(ErrorKind::Schema).next().is_some()
    }

    pub fn has_assertion_errors(&self) -> bool {
        self.errors_of(ErrorKind::Assertion).next().is_some()
    }

    pub fn has_execution_errors(&self) -> bool {
        self.errors_of(ErrorKind::Execution).next().is_some()
    }

    /// Resolved with no findings at all.
    pub fn is_clean(&self) -> bool {
        self.success && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failed_result_has_empty_hash_and_no_tree() {
        let result = ValidationResult::failure(ValidationError::schema("unexpected EOF"));
        assert!(!result.success);
        assert!(result.hash.is_empty());
        assert!(result.resolved.is_none());
        assert!(result.has_schema_errors());
        assert!(!result.is_clean());
    }

    #[test]
    fn test_assertion_errors_keep_resolution() {
        let spec = ResolvedSpec::from_value(json!({ "services": {} })).unwrap();
        let hash = spec.spec_hash().unwrap();
        let result = ValidationResult::resolved(spec, hash.clone())
            .with_errors(vec![ValidationError::assertion("too many services")]);

        assert!(result.success);
        assert_eq!(result.hash, hash);
        assert!(result.resolved.is_some());
        assert!(result.has_assertion_errors());
        assert!(!result.has_schema_errors());
        assert!(!result.is_clean());
    }

    #[test]
    fn test_error_serializes_type_tag() {
        let err = ValidationError::execution("evaluator not found")
            .with_details(json!({ "binary": "cue" }));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["type"], "execution");
        assert_eq!(value["details"]["binary"], "cue");
    }

    #[test]
    fn test_failed_result_omits_resolved_field() {
        let result = ValidationResult::failure(ValidationError::schema("bad"));
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("resolved").is_none());
        assert_eq!(value["hash"], "");
        assert_eq!(value["errors"][0]["type"], "schema");
    }
}
