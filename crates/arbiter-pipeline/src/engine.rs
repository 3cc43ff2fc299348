//! Assertion Engine: runs a battery of assertion commands against one
//! snapshot of the resolved tree.
//!
//! The tree is canonicalized once per [`AssertionEngine::run`] into a
//! snapshot file that every query reads. How the commands are scheduled is
//! up to the [`ExecutionStrategy`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use arbiter_core::obs::{emit_assertion_evaluated, emit_process_failed};
use arbiter_core::{AssertionConfig, ResolvedSpec, ValidationError};

use crate::assertion::{parse_query_value, AssertionBuilder, AssertionCommand};
use crate::config::PipelineConfig;
use crate::runner::{ProcessRequest, ProcessRunner};

/// Everything one query invocation needs. Shared by all commands of a run.
pub struct QueryContext {
    runner: Arc<dyn ProcessRunner>,
    query_binary: String,
    snapshot_path: PathBuf,
    timeout: Duration,
}

impl QueryContext {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        query_binary: impl Into<String>,
        snapshot_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            query_binary: query_binary.into(),
            snapshot_path: snapshot_path.into(),
            timeout,
        }
    }

    /// Run one command's query and check the result.
    ///
    /// A query that cannot be run, times out, or exits non-zero yields an
    /// `execution` error; a rule violation yields an `assertion` error.
    pub async fn evaluate(&self, command: &AssertionCommand) -> Option<ValidationError> {
        let request = ProcessRequest::new(
            &self.query_binary,
            vec![
                command.query().to_string(),
                self.snapshot_path.to_string_lossy().into_owned(),
            ],
        )
        .with_timeout(self.timeout);

        let output = match self.runner.run(&request).await {
            Ok(output) => output,
            Err(e) => {
                emit_process_failed(&self.query_binary, &e);
                let message = format!("{}: query failed: {e}", command.description());
                return Some(
                    ValidationError::execution(message)
                        .with_details(json!({ "query": command.query() })),
                );
            }
        };

        if !output.success() {
            return Some(
                ValidationError::execution(format!(
                    "{}: query exited with code {}: {}",
                    command.description(),
                    output.exit_code,
                    output.stderr.trim()
                ))
                .with_details(json!({
                    "query": command.query(),
                    "exit_code": output.exit_code,
                    "stderr": output.stderr,
                })),
            );
        }

        let value = parse_query_value(&output.stdout);
        let violation = command.check(value);
        emit_assertion_evaluated(
            command.description(),
            command.kind().name(),
            violation.is_none(),
        );
        violation
    }
}

/// Scheduling policy for a battery of assertion commands.
///
/// Implementations must return the findings of every command; one command's
/// failure never discards another's result.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        context: Arc<QueryContext>,
        commands: Vec<AssertionCommand>,
    ) -> Vec<ValidationError>;
}

/// One command at a time, findings in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

#[async_trait]
impl ExecutionStrategy for Sequential {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn execute(
        &self,
        context: Arc<QueryContext>,
        commands: Vec<AssertionCommand>,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for command in &commands {
            errors.extend(context.evaluate(command).await);
        }
        errors
    }
}

/// Up to `max_concurrent` commands in flight, settled together.
///
/// Findings are reported in declaration order regardless of completion order.
#[derive(Debug, Clone, Copy)]
pub struct Parallel {
    pub max_concurrent: usize,
}

impl Parallel {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }
}

impl Default for Parallel {
    fn default() -> Self {
        Self::new(PipelineConfig::default().max_concurrency)
    }
}

#[async_trait]
impl ExecutionStrategy for Parallel {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn execute(
        &self,
        context: Arc<QueryContext>,
        commands: Vec<AssertionCommand>,
    ) -> Vec<ValidationError> {
        // Semaphore enforces max_concurrent
        let sem = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let total = commands.len();

        let mut join_set = JoinSet::new();
        for (idx, command) in commands.into_iter().enumerate() {
            let context = Arc::clone(&context);
            let sem = Arc::clone(&sem);
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                (idx, context.evaluate(&command).await)
            });
        }

        let mut slots: Vec<Option<ValidationError>> = vec![None; total];
        let mut lost = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, finding)) => slots[idx] = finding,
                Err(e) => {
                    warn!(error = %e, "Assertion task did not complete");
                    lost.push(e);
                }
            }
        }

        let mut errors: Vec<ValidationError> = slots.into_iter().flatten().collect();
        // A panicked task cannot report its index, so it is reported by cause.
        errors.extend(lost.into_iter().map(|e| {
            ValidationError::execution(format!("assertion task did not complete: {e}"))
        }));
        errors
    }
}

/// Look up a strategy by its CLI name.
pub fn strategy_by_name(name: &str, max_concurrent: usize) -> Option<Arc<dyn ExecutionStrategy>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sequential" => Some(Arc::new(Sequential)),
        "parallel" => Some(Arc::new(Parallel::new(max_concurrent))),
        _ => None,
    }
}

/// Compiles assertion configs and runs them against a resolved tree.
#[derive(Clone)]
pub struct AssertionEngine {
    runner: Arc<dyn ProcessRunner>,
    config: PipelineConfig,
}

impl AssertionEngine {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: PipelineConfig) -> Self {
        Self { runner, config }
    }

    /// Run every config and collect all findings.
    ///
    /// Configs that do not compile are reported as `assertion` errors ahead
    /// of the query findings; the rest of the battery still runs.
    #[instrument(skip_all, fields(assertions = configs.len(), strategy = strategy.name()))]
    pub async fn run(
        &self,
        resolved: &ResolvedSpec,
        configs: &[AssertionConfig],
        strategy: &dyn ExecutionStrategy,
    ) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut commands = Vec::with_capacity(configs.len());
        for config in configs {
            match AssertionBuilder::build(config) {
                Ok(command) => commands.push(command),
                Err(e) => errors.push(
                    ValidationError::assertion(e.to_string())
                        .with_details(json!({ "query": config.query })),
                ),
            }
        }
        if commands.is_empty() {
            return errors;
        }

        let snapshot = match self.write_snapshot(resolved).await {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "Failed to write assertion snapshot");
                errors.push(ValidationError::execution(format!(
                    "failed to write assertion snapshot: {e}"
                )));
                return errors;
            }
        };

        let context = Arc::new(QueryContext::new(
            Arc::clone(&self.runner),
            &self.config.query_binary,
            snapshot.path(),
            self.config.timeout(),
        ));
        errors.extend(strategy.execute(context, commands).await);
        drop(snapshot);

        debug!(findings = errors.len(), "Assertion battery finished");
        errors
    }

    async fn write_snapshot(
        &self,
        resolved: &ResolvedSpec,
    ) -> anyhow::Result<tempfile::NamedTempFile> {
        let canonical = resolved.canonical_json()?;
        let file = tempfile::Builder::new()
            .prefix("arbiter-snapshot-")
            .suffix(".json")
            .tempfile()?;
        tokio::fs::write(file.path(), canonical.as_bytes()).await?;
        Ok(file)
    }
}
