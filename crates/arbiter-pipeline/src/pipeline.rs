//! Pipeline Orchestrator: resolution, then assertions, then IR on demand.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{warn, Instrument};
use uuid::Uuid;

use arbiter_core::obs::{emit_validation_finished, emit_validation_started, validation_span};
use arbiter_core::{
    ir, ArbiterError, AssertionConfig, Fragment, IrDocument, IrKind, ResolvedSpec, Result,
    ValidationError, ValidationResult,
};

use crate::config::PipelineConfig;
use crate::engine::{AssertionEngine, ExecutionStrategy, Parallel};
use crate::resolver::FragmentResolver;
use crate::runner::ProcessRunner;

/// The entry point external collaborators call.
///
/// A `Pipeline` holds no per-call state, so one instance can serve any
/// number of concurrent `validate` calls.
#[derive(Clone)]
pub struct Pipeline {
    resolver: FragmentResolver,
    engine: AssertionEngine,
    assertions: Vec<AssertionConfig>,
    strategy: Arc<dyn ExecutionStrategy>,
}

impl Pipeline {
    /// Build a pipeline with no assertions and the parallel strategy.
    pub fn new(runner: Arc<dyn ProcessRunner>, config: PipelineConfig) -> Self {
        Self {
            resolver: FragmentResolver::new(Arc::clone(&runner), config.clone()),
            engine: AssertionEngine::new(runner, config.clone()),
            assertions: Vec::new(),
            strategy: Arc::new(Parallel::new(config.max_concurrency)),
        }
    }

    pub fn with_assertions(mut self, assertions: Vec<AssertionConfig>) -> Self {
        self.assertions = assertions;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ExecutionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn assertions(&self) -> &[AssertionConfig] {
        &self.assertions
    }

    pub fn strategy(&self) -> &dyn ExecutionStrategy {
        self.strategy.as_ref()
    }

    /// Resolve `fragments` and, if that succeeds, run the assertion battery.
    ///
    /// Assertion findings are appended to `errors` without clearing
    /// `resolved` or `hash`.
    pub async fn validate(&self, project_id: &str, fragments: &[Fragment]) -> ValidationResult {
        let run_id = Uuid::new_v4().to_string();
        self.run_validation(project_id, fragments)
            .instrument(validation_span(project_id, &run_id))
            .await
    }

    /// [`Pipeline::validate`] bounded by a whole-call deadline.
    ///
    /// On expiry the in-flight call is dropped, which kills any child process
    /// and removes the scratch directory and snapshot, and a single
    /// `execution` error is returned.
    pub async fn validate_within(
        &self,
        project_id: &str,
        fragments: &[Fragment],
        deadline: Duration,
    ) -> ValidationResult {
        match tokio::time::timeout(deadline, self.validate(project_id, fragments)).await {
            Ok(result) => result,
            Err(_) => {
                let deadline_ms = deadline.as_millis() as u64;
                warn!(project_id = %project_id, deadline_ms, "Validation exceeded deadline");
                ValidationResult::failure(ValidationError::execution(format!(
                    "validation of '{project_id}' exceeded deadline of {deadline_ms}ms"
                )))
            }
        }
    }

    async fn run_validation(&self, project_id: &str, fragments: &[Fragment]) -> ValidationResult {
        let start = Instant::now();
        emit_validation_started(project_id, fragments.len());

        let mut result = self.resolver.resolve(project_id, fragments).await;
        if result.success && !self.assertions.is_empty() {
            if let Some(resolved) = &result.resolved {
                let findings = self
                    .engine
                    .run(resolved, &self.assertions, self.strategy.as_ref())
                    .await;
                result.errors.extend(findings);
            }
        }

        emit_validation_finished(
            project_id,
            result.success,
            result.errors.len(),
            start.elapsed().as_millis() as u64,
        );
        result
    }

    /// Lower a resolved tree into one IR kind.
    pub fn lower(&self, kind: IrKind, resolved: &ResolvedSpec) -> Result<IrDocument> {
        Ok(ir::lower(kind, resolved)?)
    }

    /// Lower the tree of a previous validation.
    ///
    /// Fails with [`ArbiterError::NotResolved`] when that validation did not
    /// produce a tree.
    pub fn lower_result(&self, kind: IrKind, result: &ValidationResult) -> Result<IrDocument> {
        match (&result.resolved, result.success) {
            (Some(resolved), true) => self.lower(kind, resolved),
            _ => Err(ArbiterError::NotResolved),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Sequential;
    use crate::fakes::FakeToolchain;
    use arbiter_core::ErrorKind;

    fn fragments() -> Vec<Fragment> {
        vec![
            Fragment::new(
                "services.cue",
                "package spec\n{\"services\": {\"api\": {}, \"db\": {}}}",
            ),
            Fragment::new("capabilities.cue", "package spec\n{\"capabilities\": [\"login\"]}"),
        ]
    }

    #[tokio::test]
    async fn test_assertion_findings_keep_resolution() {
        let fake = Arc::new(FakeToolchain::new());
        let pipeline = Pipeline::new(fake, PipelineConfig::default())
            .with_assertions(vec![AssertionConfig::upper_bound(
                ".services | length",
                "Service count",
                1.0,
            )])
            .with_strategy(Arc::new(Sequential));

        let result = pipeline.validate("demo", &fragments()).await;
        assert!(result.success);
        assert!(!result.hash.is_empty());
        assert!(result.resolved.is_some());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Assertion);
    }

    #[tokio::test]
    async fn test_no_assertions_after_failed_resolution() {
        let fake = Arc::new(FakeToolchain::new());
        let pipeline = Pipeline::new(fake.clone(), PipelineConfig::default()).with_assertions(vec![
            AssertionConfig::existence(".services | length", "Has services"),
        ]);

        let result = pipeline
            .validate("demo", &[Fragment::new("broken.cue", "{\"services\": {")])
            .await;
        assert!(!result.success);
        assert!(result.has_schema_errors());
        assert!(!result.has_assertion_errors());
        assert_eq!(fake.calls().len(), 1, "only the evaluator should run");
    }

    #[tokio::test]
    async fn test_lower_result_requires_resolution() {
        let fake = Arc::new(FakeToolchain::new());
        let pipeline = Pipeline::new(fake, PipelineConfig::default());

        let failed = ValidationResult::failure(ValidationError::schema("bad"));
        assert!(matches!(
            pipeline.lower_result(IrKind::Flows, &failed),
            Err(ArbiterError::NotResolved)
        ));

        let ok = pipeline.validate("demo", &fragments()).await;
        let doc = pipeline.lower_result(IrKind::Capabilities, &ok).unwrap();
        assert_eq!(doc.graph().unwrap().nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_within_deadline() {
        let fake = Arc::new(FakeToolchain::new().with_evaluator_delay(Duration::from_secs(5)));
        let pipeline = Pipeline::new(fake, PipelineConfig::default());

        let result = pipeline
            .validate_within("slow", &fragments(), Duration::from_millis(50))
            .await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Execution);
        assert!(result.errors[0].message.contains("50ms"));
    }
}
