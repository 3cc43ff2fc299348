//! Business-rule assertion configuration.

use serde::{Deserialize, Serialize};

/// Enforcement policy of an assertion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    /// Value must be `<= threshold`.
    #[serde(alias = "max", alias = "upper")]
    UpperBound,

    /// Value must be `>= threshold`.
    #[serde(alias = "min", alias = "lower")]
    LowerBound,

    /// Value must be `> 0`.
    #[serde(alias = "exists")]
    Existence,
}

impl AssertionKind {
    pub fn name(&self) -> &'static str {
        match self {
            AssertionKind::UpperBound => "upper_bound",
            AssertionKind::LowerBound => "lower_bound",
            AssertionKind::Existence => "existence",
        }
    }
}

impl std::fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One configured rule check, evaluated by an external query against the
/// resolved tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionConfig {
    /// Query expression handed verbatim to the query tool.
    pub query: String,

    /// Human-readable rule name, used as the error message prefix.
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AssertionKind>,
}

impl AssertionConfig {
    pub fn upper_bound(
        query: impl Into<String>,
        description: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            query: query.into(),
            description: description.into(),
            threshold: Some(threshold),
            kind: Some(AssertionKind::UpperBound),
        }
    }

    pub fn lower_bound(
        query: impl Into<String>,
        description: impl Into<String>,
        threshold: f64,
    ) -> Self {
        Self {
            query: query.into(),
            description: description.into(),
            threshold: Some(threshold),
            kind: Some(AssertionKind::LowerBound),
        }
    }

    pub fn existence(query: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            description: description.into(),
            threshold: None,
            kind: Some(AssertionKind::Existence),
        }
    }

    /// The policy this config enforces.
    ///
    /// An explicit `type` always wins. Untyped configs with a threshold are
    /// upper bounds; untyped configs without one are existence checks.
    pub fn policy(&self) -> AssertionKind {
        match (self.kind, self.threshold) {
            (Some(kind), _) => kind,
            (None, Some(_)) => AssertionKind::UpperBound,
            (None, None) => AssertionKind::Existence,
        }
    }
}
