//! The resolved specification tree produced by merging all fragments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::digest;
use crate::domain::error::{ArbiterError, Result};

/// An immutable, arbitrarily nested key-value tree.
///
/// The root is always a JSON object. There are no mutating accessors; every
/// hash and IR is derived from the same snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ResolvedSpec(Value);

impl ResolvedSpec {
    /// Wrap a JSON value, rejecting non-object roots.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_object() {
            Ok(Self(value))
        } else {
            Err(ArbiterError::MalformedResolved(format!(
                "root must be an object, got {}",
                json_type_name(&value)
            )))
        }
    }

    /// Parse an evaluator export.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Borrow the underlying tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Look up a top-level section.
    pub fn section(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Byte-stable serialization shared by hashing and snapshots.
    pub fn canonical_json(&self) -> Result<String> {
        digest::canonical_json(&self.0)
    }

    /// Deterministic SHA-256 hash of the canonical form.
    pub fn spec_hash(&self) -> Result<String> {
        digest::compute_digest(&self.0)
    }
}

impl TryFrom<Value> for ResolvedSpec {
    type Error = ArbiterError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<ResolvedSpec> for Value {
    fn from(spec: ResolvedSpec) -> Self {
        spec.0
    }
}

/// Human-readable JSON type name for diagnostics.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_object_root() {
        let err = ResolvedSpec::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("got array"));
    }

    #[test]
    fn test_parse_and_hash_ignore_formatting() {
        let compact = ResolvedSpec::parse(br#"{"b":1,"a":2}"#).unwrap();
        let pretty = ResolvedSpec::parse(b"{\n  \"a\": 2,\n  \"b\": 1\n}").unwrap();
        assert_eq!(compact, pretty);
        assert_eq!(compact.spec_hash().unwrap(), pretty.spec_hash().unwrap());
    }

    #[test]
    fn test_deserialize_enforces_object_root() {
        let ok: std::result::Result<ResolvedSpec, _> = serde_json::from_str(r#"{"a":1}"#);
        assert!(ok.is_ok());
        let bad: std::result::Result<ResolvedSpec, _> = serde_json::from_str("42");
        assert!(bad.is_err());
    }

    #[test]
    fn test_serializes_transparently() {
        let spec = ResolvedSpec::from_value(json!({ "services": {} })).unwrap();
        assert_eq!(serde_json::to_string(&spec).unwrap(), r#"{"services":{}}"#);
    }
}
