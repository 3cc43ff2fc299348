//! Pipeline configuration: external tool locations and execution limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one [`crate::Pipeline`].
///
/// The pipeline never reads the environment; callers (the CLI, an HTTP
/// service) build this and hand it in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Schema-language evaluator binary.
    pub evaluator_binary: String,
    /// Arguments placed before the fragment file list.
    pub evaluator_args: Vec<String>,
    /// Query tool binary, invoked as `<query_binary> <query> <snapshot>`.
    pub query_binary: String,
    /// Per-process wall-clock limit (milliseconds). `0` disables the limit.
    pub timeout_ms: u64,
    /// Concurrency ceiling for the parallel assertion strategy.
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            evaluator_binary: "cue".to_string(),
            evaluator_args: vec!["export".to_string(), "--out".to_string(), "json".to_string()],
            query_binary: "jq".to_string(),
            timeout_ms: 30_000,
            max_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn with_evaluator(mut self, binary: impl Into<String>, args: Vec<String>) -> Self {
        self.evaluator_binary = binary.into();
        self.evaluator_args = args;
        self
    }

    pub fn with_query_binary(mut self, binary: impl Into<String>) -> Self {
        self.query_binary = binary.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
