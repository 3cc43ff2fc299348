//! Fragment Resolver: merges a project's fragments through the external
//! evaluator and hashes the result.
//!
//! Each call owns a fresh scratch directory. It is a [`tempfile::TempDir`],
//! so it is removed on every exit path, including a cancelled future.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use arbiter_core::obs::emit_process_failed;
use arbiter_core::{Fragment, ResolvedSpec, ValidationError, ValidationResult};

use crate::config::PipelineConfig;
use crate::diagnostics::schema_errors;
use crate::runner::{ProcessRequest, ProcessRunner};

/// Resolves fragments into a [`ValidationResult`].
///
/// Expected failures (bad paths, evaluator diagnostics, missing binary,
/// timeout) are returned as error records, never as `Err`.
#[derive(Clone)]
pub struct FragmentResolver {
    runner: Arc<dyn ProcessRunner>,
    config: PipelineConfig,
}

impl FragmentResolver {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: PipelineConfig) -> Self {
        Self { runner, config }
    }

    #[instrument(skip(self, fragments), fields(fragments = fragments.len()))]
    pub async fn resolve(&self, project_id: &str, fragments: &[Fragment]) -> ValidationResult {
        let files = match layout(fragments) {
            Ok(files) => files,
            Err(errors) => return ValidationResult::failed(errors),
        };

        let workspace = match write_workspace(project_id, &files).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "Failed to prepare scratch workspace");
                return ValidationResult::failure(ValidationError::execution(format!(
                    "failed to prepare scratch workspace: {e}"
                )));
            }
        };

        let mut args = self.config.evaluator_args.clone();
        args.extend(files.keys().map(|p| p.to_string_lossy().into_owned()));
        let request = ProcessRequest::new(&self.config.evaluator_binary, args)
            .in_dir(workspace.path())
            .with_timeout(self.config.timeout());

        let output = match self.runner.run(&request).await {
            Ok(output) => output,
            Err(e) => {
                emit_process_failed(&self.config.evaluator_binary, &e);
                return ValidationResult::failure(
                    ValidationError::execution(format!("evaluator failed: {e}"))
                        .with_details(json!({ "binary": self.config.evaluator_binary })),
                );
            }
        };
        drop(workspace);

        if !output.success() {
            debug!(exit_code = output.exit_code, "Evaluator rejected fragments");
            return ValidationResult::failed(schema_errors(&output.stderr, output.exit_code));
        }

        let resolved = match ResolvedSpec::parse(output.stdout.as_bytes()) {
            Ok(resolved) => resolved,
            Err(e) => {
                return ValidationResult::failure(ValidationError::schema(format!(
                    "evaluator produced an unusable export: {e}"
                )))
            }
        };

        match resolved.spec_hash() {
            Ok(hash) => {
                debug!(hash = %hash, "Fragments resolved");
                ValidationResult::resolved(resolved, hash)
            }
            Err(e) => ValidationResult::failure(ValidationError::schema(format!(
                "resolved tree cannot be canonicalized: {e}"
            ))),
        }
    }
}

/// Map fragments to their normalized relative paths, sorted by path.
///
/// Every bad or duplicate path is reported, not just the first.
fn layout(fragments: &[Fragment]) -> Result<BTreeMap<PathBuf, &str>, Vec<ValidationError>> {
    if fragments.is_empty() {
        return Err(vec![ValidationError::schema("no fragments to resolve")]);
    }

    let mut files = BTreeMap::new();
    let mut errors = Vec::new();
    for fragment in fragments {
        match fragment.relative_path() {
            Ok(path) => {
                if files.insert(path, fragment.content.as_str()).is_some() {
                    errors.push(
                        ValidationError::schema(format!(
                            "duplicate fragment path '{}'",
                            fragment.path
                        ))
                        .with_details(json!({ "file": fragment.path })),
                    );
                }
            }
            Err(e) => errors.push(
                ValidationError::schema(e.to_string())
                    .with_details(json!({ "file": fragment.path })),
            ),
        }
    }

    if errors.is_empty() {
        Ok(files)
    } else {
        Err(errors)
    }
}

async fn write_workspace(
    project_id: &str,
    files: &BTreeMap<PathBuf, &str>,
) -> std::io::Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix(&format!("arbiter-{}-", scratch_label(project_id)))
        .tempdir()?;

    for (relative, content) in files {
        let target = dir.path().join(relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
    }
    Ok(dir)
}

/// Filesystem-safe, bounded form of a project id.
fn scratch_label(project_id: &str) -> String {
    let label: String = project_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(32)
        .collect();
    if label.is_empty() {
        "project".to_string()
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeToolchain;
    use arbiter_core::ErrorKind;

    fn resolver(fake: &Arc<FakeToolchain>) -> FragmentResolver {
        FragmentResolver::new(fake.clone(), PipelineConfig::default())
    }

    #[test]
    fn test_scratch_label() {
        assert_eq!(scratch_label("billing/v2 api"), "billing_v2_api");
        assert_eq!(scratch_label(""), "project");
        assert_eq!(scratch_label(&"x".repeat(100)).len(), 32);
    }

    #[test]
    fn test_layout_sorts_and_rejects_duplicates() {
        let frags = [Fragment::new("b.cue", "b"), Fragment::new("a.cue", "a")];
        let ok = layout(&frags).unwrap();
        let paths: Vec<_> = ok.keys().cloned().collect();
        assert_eq!(paths, vec![PathBuf::from("a.cue"), PathBuf::from("b.cue")]);

        let errors = layout(&[
            Fragment::new("a.cue", "1"),
            Fragment::new("./a.cue", "2"),
            Fragment::new("../x.cue", "3"),
        ])
        .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.kind == ErrorKind::Schema));
    }

    #[tokio::test]
    async fn test_resolve_success_sets_hash() {
        let fake = Arc::new(FakeToolchain::new());
        let result = resolver(&fake)
            .resolve(
                "demo",
                &[Fragment::new("a.cue", "package spec\n{\"name\": \"demo\"}")],
            )
            .await;
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.hash.len(), 64);
        assert_eq!(result.resolved.unwrap().section("name"), Some(&json!("demo")));
    }

    #[tokio::test]
    async fn test_evaluator_receives_sorted_paths() {
        let fake = Arc::new(FakeToolchain::new());
        resolver(&fake)
            .resolve(
                "demo",
                &[
                    Fragment::new("z/last.cue", "{}"),
                    Fragment::new("first.cue", "{}"),
                ],
            )
            .await;
        let calls = fake.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            vec!["export", "--out", "json", "first.cue", "z/last.cue"]
        );
    }

    #[tokio::test]
    async fn test_bad_path_spawns_nothing() {
        let fake = Arc::new(FakeToolchain::new());
        let result = resolver(&fake)
            .resolve("demo", &[Fragment::new("/etc/passwd", "{}")])
            .await;
        assert!(!result.success);
        assert!(result.hash.is_empty());
        assert_eq!(result.errors[0].kind, ErrorKind::Schema);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_evaluator_is_execution_error() {
        let fake = Arc::new(FakeToolchain::new());
        let config = PipelineConfig::default().with_evaluator("not-installed", vec![]);
        let result = FragmentResolver::new(fake, config)
            .resolve("demo", &[Fragment::new("a.cue", "{}")])
            .await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Execution);
    }

    #[tokio::test]
    async fn test_non_object_export_is_schema_error() {
        let fake = Arc::new(FakeToolchain::new());
        let result = resolver(&fake)
            .resolve("demo", &[Fragment::new("a.cue", "[1, 2]")])
            .await;
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::Schema);
    }
}
