//! Structured observability hooks for validation run lifecycle events.
//!
//! - [`validation_span`] scopes every event of one run by `project_id` and `run_id`
//! - `emit_*` functions log the key lifecycle events with an `event` field

use tracing::{info, warn, Span};

/// Span tagging everything logged during one validation run.
///
/// Attach with `tracing::Instrument::instrument` so the span follows the
/// future across await points.
///
/// ```ignore
/// pipeline_step().instrument(validation_span("billing", &run_id)).await
/// ```
pub fn validation_span(project_id: &str, run_id: &str) -> Span {
    tracing::info_span!("arbiter.validation", project_id = %project_id, run_id = %run_id)
}

/// Emit event: validation started for a project with its fragment count.
pub fn emit_validation_started(project_id: &str, fragment_count: usize) {
    info!(
        event = "validation.started",
        project_id = %project_id,
        fragments = fragment_count,
    );
}

/// Emit event: validation finished with outcome and error tally.
pub fn emit_validation_finished(
    project_id: &str,
    success: bool,
    error_count: usize,
    duration_ms: u64,
) {
    info!(
        event = "validation.finished",
        project_id = %project_id,
        success = success,
        errors = error_count,
        duration_ms = duration_ms,
    );
}

/// Emit event: one assertion evaluated.
pub fn emit_assertion_evaluated(description: &str, kind: &str, passed: bool) {
    info!(
        event = "assertion.evaluated",
        description = %description,
        kind = %kind,
        passed = passed,
    );
}

/// Emit event: an external tool could not be run to completion (warning level).
pub fn emit_process_failed(binary: &str, error: &dyn std::fmt::Display) {
    warn!(event = "process.failed", binary = %binary, error = %error);
}

/// Emit event: one IR document lowered, with its node/edge (or item) count.
pub fn emit_ir_lowered(kind: &str, elements: usize) {
    info!(event = "ir.lowered", kind = %kind, elements = elements);
}
