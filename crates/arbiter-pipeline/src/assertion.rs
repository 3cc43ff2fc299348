//! Assertion commands: one tagged variant per enforcement policy.

use arbiter_core::{ArbiterError, AssertionConfig, AssertionKind, Result, ValidationError};

/// A compiled assertion, ready to be evaluated against a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum AssertionCommand {
    /// Fails when the value is above `threshold`.
    UpperBound {
        query: String,
        description: String,
        threshold: f64,
    },
    /// Fails when the value is below `threshold`.
    LowerBound {
        query: String,
        description: String,
        threshold: f64,
    },
    /// Fails unless the value is positive.
    Existence { query: String, description: String },
}

impl AssertionCommand {
    pub fn query(&self) -> &str {
        match self {
            AssertionCommand::UpperBound { query, .. }
            | AssertionCommand::LowerBound { query, .. }
            | AssertionCommand::Existence { query, .. } => query,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            AssertionCommand::UpperBound { description, .. }
            | AssertionCommand::LowerBound { description, .. }
            | AssertionCommand::Existence { description, .. } => description,
        }
    }

    pub fn kind(&self) -> AssertionKind {
        match self {
            AssertionCommand::UpperBound { .. } => AssertionKind::UpperBound,
            AssertionCommand::LowerBound { .. } => AssertionKind::LowerBound,
            AssertionCommand::Existence { .. } => AssertionKind::Existence,
        }
    }

    /// Check a query result. Returns the `assertion` error on violation.
    pub fn check(&self, value: f64) -> Option<ValidationError> {
        let (op, threshold, violated) = match self {
            AssertionCommand::UpperBound { threshold, .. } => {
                ("<=", *threshold, value > *threshold)
            }
            AssertionCommand::LowerBound { threshold, .. } => {
                (">=", *threshold, value < *threshold)
            }
            // Reported like a lower bound of 0.
            AssertionCommand::Existence { .. } => (">=", 0.0, value <= 0.0),
        };

        violated.then(|| {
            ValidationError::assertion(format!(
                "{}: expected {op} {}, got {}",
                self.description(),
                format_number(threshold),
                format_number(value)
            ))
            .with_details(serde_json::json!({
                "query": self.query(),
                "kind": self.kind().name(),
                "threshold": threshold,
                "value": value,
            }))
        })
    }
}

/// Selects the command variant for a config's policy.
pub struct AssertionBuilder;

impl AssertionBuilder {
    pub fn build(config: &AssertionConfig) -> Result<AssertionCommand> {
        let query = config.query.trim();
        if query.is_empty() {
            return Err(ArbiterError::InvalidAssertion {
                description: config.description.clone(),
                reason: "query is empty".to_string(),
            });
        }

        let threshold = || {
            config
                .threshold
                .filter(|t| t.is_finite())
                .ok_or_else(|| ArbiterError::InvalidAssertion {
                    description: config.description.clone(),
                    reason: format!("{} requires a finite threshold", config.policy()),
                })
        };

        let query = query.to_string();
        let description = config.description.clone();
        Ok(match config.policy() {
            AssertionKind::UpperBound => AssertionCommand::UpperBound {
                query,
                description,
                threshold: threshold()?,
            },
            AssertionKind::LowerBound => AssertionCommand::LowerBound {
                query,
                description,
                threshold: threshold()?,
            },
            AssertionKind::Existence => AssertionCommand::Existence { query, description },
        })
    }
}

/// First numeric token of the query tool's stdout; `0` when there is none.
pub fn parse_query_value(stdout: &str) -> f64 {
    stdout
        .split(|c: char| c.is_whitespace() || c == ',' || c == '[' || c == ']')
        .find_map(|token| token.trim_matches('"').parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Integral values print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::ErrorKind;

    #[test]
    fn test_upper_bound_message() {
        let cmd = AssertionBuilder::build(&AssertionConfig::upper_bound(
            ".services | length",
            "Too many services",
            5.0,
        ))
        .unwrap();
        assert!(cmd.check(5.0).is_none());

        let err = cmd.check(6.0).unwrap();
        assert_eq!(err.kind, ErrorKind::Assertion);
        assert_eq!(err.message, "Too many services: expected <= 5, got 6");
    }

    #[test]
    fn test_lower_bound_message() {
        let config = AssertionConfig::lower_bound(".owners | length", "Owners", 2.0);
        let cmd = AssertionBuilder::build(&config).unwrap();
        assert!(cmd.check(2.0).is_none());
        assert_eq!(cmd.check(1.0).unwrap().message, "Owners: expected >= 2, got 1");
    }

    #[test]
    fn test_existence_uses_zero_threshold() {
        let config = AssertionConfig::existence(".services | length", "Has services");
        let cmd = AssertionBuilder::build(&config).unwrap();
        assert!(cmd.check(1.0).is_none());
        assert_eq!(cmd.check(0.0).unwrap().message, "Has services: expected >= 0, got 0");
    }

    #[test]
    fn test_bound_without_threshold_rejected() {
        let config = AssertionConfig {
            query: ".x".to_string(),
            description: "x".to_string(),
            threshold: None,
            kind: Some(AssertionKind::LowerBound),
        };
        let err = AssertionBuilder::build(&config).unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidAssertion { .. }));
    }

    #[test]
    fn test_parse_query_value() {
        assert_eq!(parse_query_value("6\n"), 6.0);
        assert_eq!(parse_query_value("  2.5 "), 2.5);
        assert_eq!(parse_query_value("\"3\""), 3.0);
        assert_eq!(parse_query_value("[4]"), 4.0);
        assert_eq!(parse_query_value("null"), 0.0);
        assert_eq!(parse_query_value(""), 0.0);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.25), "0.25");
    }
}
