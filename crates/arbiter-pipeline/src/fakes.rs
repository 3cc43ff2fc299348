//! In-process fakes for the external tools (testing only)
//!
//! [`FakeToolchain`] implements [`ProcessRunner`] and answers for both the
//! evaluator and the query tool, so pipeline behaviour can be tested without
//! either installed. It reads and writes the same files the real tools
//! would, and records every call.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::PipelineConfig;
use crate::runner::{ProcessOutput, ProcessRequest, ProcessRunner, RunnerError};

// ---------------------------------------------------------------------------
// FakeToolchain
// ---------------------------------------------------------------------------

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub binary: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Fake evaluator plus fake query tool.
///
/// Evaluator: every argument naming a file in the working directory is a
/// fragment. `package` and `//` lines are ignored, the remainder must be a
/// JSON value. Fragments are deep-merged; conflicting scalars and unbalanced
/// delimiters are reported as located diagnostics with exit code 1.
///
/// Query tool: supports `.a.b` and `.a.b | length`.
///
/// Any other binary fails to spawn.
#[derive(Debug)]
pub struct FakeToolchain {
    evaluator_binary: String,
    query_binary: String,
    evaluator_delay: Duration,
    query_delay: Duration,
    failing_queries: BTreeSet<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        let config = PipelineConfig::default();
        Self {
            evaluator_binary: config.evaluator_binary,
            query_binary: config.query_binary,
            evaluator_delay: Duration::ZERO,
            query_delay: Duration::ZERO,
            failing_queries: BTreeSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer to these binary names instead of the default ones.
    pub fn with_binaries(mut self, evaluator: impl Into<String>, query: impl Into<String>) -> Self {
        self.evaluator_binary = evaluator.into();
        self.query_binary = query.into();
        self
    }

    pub fn with_evaluator_delay(mut self, delay: Duration) -> Self {
        self.evaluator_delay = delay;
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Make the query tool exit non-zero for this exact query.
    pub fn with_failing_query(mut self, query: impl Into<String>) -> Self {
        self.failing_queries.insert(query.into());
        self
    }

    /// Every call made so far, in call order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls made to one binary.
    pub fn calls_to(&self, binary: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.binary == binary)
            .collect()
    }

    fn record(&self, request: &ProcessRequest) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                binary: request.binary.clone(),
                args: request.args.clone(),
                cwd: request.cwd.clone(),
            });
    }
}

/// Sleep for `delay`, failing like a real runner if the request's timeout
/// is shorter.
async fn simulate_work(request: &ProcessRequest, delay: Duration) -> Result<(), RunnerError> {
    if request.timeout > Duration::ZERO && delay >= request.timeout {
        tokio::time::sleep(request.timeout).await;
        return Err(RunnerError::Timeout {
            binary: request.binary.clone(),
            timeout_ms: request.timeout.as_millis() as u64,
        });
    }
    if delay > Duration::ZERO {
        tokio::time::sleep(delay).await;
    }
    Ok(())
}

#[async_trait]
impl ProcessRunner for FakeToolchain {
    async fn run(&self, request: &ProcessRequest) -> Result<ProcessOutput, RunnerError> {
        let start = Instant::now();
        self.record(request);

        let (exit_code, stdout, stderr) = if request.binary == self.evaluator_binary {
            simulate_work(request, self.evaluator_delay).await?;
            evaluate(request).await
        } else if request.binary == self.query_binary {
            simulate_work(request, self.query_delay).await?;
            if request.args.first().is_some_and(|q| self.failing_queries.contains(q)) {
                (5, String::new(), "jq: error: simulated failure\n".to_string())
            } else {
                query(request).await
            }
        } else {
            return Err(RunnerError::Spawn {
                binary: request.binary.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        };

        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Fake evaluator
// ---------------------------------------------------------------------------

async fn evaluate(request: &ProcessRequest) -> (i32, String, String) {
    let Some(cwd) = &request.cwd else {
        return (1, String::new(), "no working directory\n".to_string());
    };

    let mut diagnostics = Vec::new();
    let mut merged: Option<Value> = None;

    for arg in &request.args {
        let path = cwd.join(arg);
        if !path.is_file() {
            continue;
        }
        let source = match tokio::fs::read_to_string(&path).await {
            Ok(source) => source,
            Err(e) => {
                diagnostics.push(format!("{arg}: {e}"));
                continue;
            }
        };

        let body = strip_headers(&source);
        if let Some(diagnostic) = check_delimiters(arg, &body) {
            diagnostics.push(diagnostic);
            continue;
        }
        let value = if body.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            match serde_json::from_str::<Value>(&body) {
                Ok(value) => value,
                Err(e) => {
                    diagnostics.push(format!("{arg}:{}:{}: {e}", e.line(), e.column()));
                    continue;
                }
            }
        };

        merged = Some(match merged.take() {
            None => value,
            Some(acc) => merge(acc, value, "", arg, &mut diagnostics),
        });
    }

    if !diagnostics.is_empty() {
        return (1, String::new(), diagnostics.join("\n") + "\n");
    }
    let merged = merged.unwrap_or_else(|| Value::Object(Map::new()));
    match serde_json::to_string_pretty(&merged) {
        Ok(json) => (0, json + "\n", String::new()),
        Err(e) => (1, String::new(), format!("{e}\n")),
    }
}

/// Blank out `package` and comment lines, keeping line numbers intact.
fn strip_headers(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("package ") || trimmed.starts_with("//") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Report the first unbalanced `{}`/`[]` outside string literals.
fn check_delimiters(file: &str, body: &str) -> Option<String> {
    let mut stack: Vec<(char, usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (line_idx, line) in body.lines().enumerate() {
        for (col_idx, c) in line.chars().enumerate() {
            let (line_no, col_no) = (line_idx + 1, col_idx + 1);
            if in_string {
                match (escaped, c) {
                    (true, _) => escaped = false,
                    (false, '\\') => escaped = true,
                    (false, '"') => in_string = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '"' => in_string = true,
                '{' | '[' => stack.push((c, line_no, col_no)),
                '}' | ']' => {
                    let expected = if c == '}' { '{' } else { '[' };
                    match stack.pop() {
                        Some((open, _, _)) if open == expected => {}
                        _ => return Some(format!("{file}:{line_no}:{col_no}: unexpected '{c}'")),
                    }
                }
                _ => {}
            }
        }
    }

    let (open, line, col) = stack.pop()?;
    let close = if open == '{' { '}' } else { ']' };
    Some(format!(
        "{file}:{line}:{col}: expected '{close}' to close '{open}', found EOF"
    ))
}

/// Deep-merge `incoming` into `acc`. Objects merge by key; equal values
/// unify; anything else is a conflict.
fn merge(
    acc: Value,
    incoming: Value,
    path: &str,
    file: &str,
    diagnostics: &mut Vec<String>,
) -> Value {
    match (acc, incoming) {
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let next = match left.remove(&key) {
                    Some(existing) => merge(existing, value, &child_path, file, diagnostics),
                    None => value,
                };
                left.insert(key, next);
            }
            Value::Object(left)
        }
        (left, right) if left == right => left,
        (left, right) => {
            let at = if path.is_empty() { "<root>" } else { path };
            diagnostics.push(format!(
                "{at}: conflicting values {left} and {right}:\n    ./{file}:1:1"
            ));
            left
        }
    }
}

// ---------------------------------------------------------------------------
// Fake query tool
// ---------------------------------------------------------------------------

async fn query(request: &ProcessRequest) -> (i32, String, String) {
    let [expression, snapshot] = request.args.as_slice() else {
        return (2, String::new(), "usage: jq <filter> <file>\n".to_string());
    };

    let document: Value = match tokio::fs::read_to_string(snapshot).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => return (2, String::new(), format!("jq: error: {e}\n")),
        },
        Err(e) => return (2, String::new(), format!("jq: error: could not open {snapshot}: {e}\n")),
    };

    match run_filter(expression, &document) {
        Some(value) => (0, format!("{value}\n"), String::new()),
        None => (3, String::new(), format!("jq: error: unsupported filter {expression}\n")),
    }
}

fn run_filter(expression: &str, document: &Value) -> Option<Value> {
    let mut stages = expression.split('|').map(str::trim);
    let path = stages.next()?;
    let mut current = select(path, document)?;

    for stage in stages {
        current = match stage {
            "length" => length(&current),
            _ => return None,
        };
    }
    Some(current)
}

fn select(path: &str, document: &Value) -> Option<Value> {
    let rest = path.strip_prefix('.')?;
    let mut current = document;
    for key in rest.split('.').filter(|k| !k.is_empty()) {
        match current.get(key) {
            Some(next) => current = next,
            None => return Some(Value::Null),
        }
    }
    Some(current.clone())
}

fn length(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) => Value::from(0),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i.unsigned_abs()),
            None => Value::from(n.as_f64().map_or(0.0, f64::abs)),
        },
        Value::String(s) => Value::from(s.chars().count()),
        Value::Array(items) => Value::from(items.len()),
        Value::Object(map) => Value::from(map.len()),
    }
}
