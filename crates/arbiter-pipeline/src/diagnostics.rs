//! Evaluator diagnostic parser.
//!
//! Normalizes the evaluator's stderr into `schema` [`ValidationError`]s. Two
//! line shapes are recognised:
//!
//! ```text
//! services.cue:4:2: expected '}', found 'EOF'
//! services.api.port: conflicting values 8080 and 9090:
//!     ./services.cue:3:10
//!     ./overrides.cue:2:10
//! ```
//!
//! A located line starts a diagnostic with its own position; an unlocated
//! line starts one whose position comes from the indented lines under it.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use arbiter_core::ValidationError;

/// Source position referenced by a diagnostic.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Position {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// One evaluator diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub positions: Vec<Position>,
}

impl Diagnostic {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            positions: Vec::new(),
        }
    }

    pub fn into_validation_error(self) -> ValidationError {
        let error = ValidationError::schema(self.message);
        let Some(primary) = self.positions.first() else {
            return error;
        };
        error.with_details(serde_json::json!({
            "file": primary.file,
            "line": primary.line,
            "column": primary.column,
            "positions": self.positions,
        }))
    }
}

fn located_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<file>[^\s:][^:]*):(?P<line>\d+)(?::(?P<col>\d+))?:\s*(?P<msg>.+)$")
            .unwrap_or_else(|e| unreachable!("invalid diagnostic pattern: {e}"))
    })
}

fn position_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s+(?P<file>[^\s:][^:]*):(?P<line>\d+)(?::(?P<col>\d+))?\s*$")
            .unwrap_or_else(|e| unreachable!("invalid position pattern: {e}"))
    })
}

fn position(caps: &regex::Captures<'_>) -> Option<Position> {
    let file = caps.name("file")?.as_str();
    Some(Position {
        file: file.strip_prefix("./").unwrap_or(file).to_string(),
        line: caps.name("line")?.as_str().parse().ok()?,
        column: caps.name("col").and_then(|c| c.as_str().parse().ok()),
    })
}

/// Parse evaluator stderr into diagnostics, in output order.
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut out: Vec<Diagnostic> = Vec::new();

    for raw in stderr.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let indented = line.starts_with(char::is_whitespace);
        if indented {
            if let Some(current) = out.last_mut() {
                if let Some(pos) = position_line().captures(line).and_then(|c| position(&c)) {
                    current.positions.push(pos);
                } else {
                    current.message.push_str("; ");
                    current.message.push_str(line.trim());
                }
                continue;
            }
        }

        let line = line.trim();
        match located_line().captures(line) {
            Some(caps) => {
                let message = caps.name("msg").map_or(line, |m| m.as_str()).trim();
                let mut diagnostic = Diagnostic::new(message);
                diagnostic.positions.extend(position(&caps));
                out.push(diagnostic);
            }
            None => out.push(Diagnostic::new(line.trim_end_matches(':'))),
        }
    }

    out
}

/// `schema` errors for a failed evaluator run. Never empty.
pub fn schema_errors(stderr: &str, exit_code: i32) -> Vec<ValidationError> {
    let errors: Vec<ValidationError> = parse_diagnostics(stderr)
        .into_iter()
        .map(Diagnostic::into_validation_error)
        .collect();

    if errors.is_empty() {
        vec![ValidationError::schema(format!(
            "evaluator exited with code {exit_code} and no diagnostics"
        ))]
    } else {
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::ErrorKind;

    #[test]
    fn test_located_line() {
        let diags = parse_diagnostics("services.cue:4:2: expected '}', found 'EOF'\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "expected '}', found 'EOF'");
        assert_eq!(
            diags[0].positions,
            vec![Position {
                file: "services.cue".to_string(),
                line: 4,
                column: Some(2)
            }]
        );
    }

    #[test]
    fn test_unlocated_message_with_positions() {
        let stderr = "services.api.port: conflicting values 8080 and 9090:\n    ./services.cue:3:10\n    ./overrides.cue:2:10\n";
        let diags = parse_diagnostics(stderr);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "services.api.port: conflicting values 8080 and 9090");
        assert_eq!(diags[0].positions.len(), 2);
        assert_eq!(diags[0].positions[1].file, "overrides.cue");

        let err = diags[0].clone().into_validation_error();
        let details = err.details.expect("details");
        assert_eq!(details["file"], "services.cue");
        assert_eq!(details["line"], 3);
        assert_eq!(details["positions"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_multiple_diagnostics_in_order() {
        let stderr = "a.cue:1:1: first\nb.cue:2: second\nthird problem\n";
        let diags = parse_diagnostics(stderr);
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[1].positions[0].column, None);
        assert!(diags[2].positions.is_empty());
    }

    #[test]
    fn test_empty_stderr_names_exit_code() {
        let errors = schema_errors("  \n", 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::Schema);
        assert!(errors[0].message.contains("code 3"));
        assert!(errors[0].details.is_none());
    }
}
