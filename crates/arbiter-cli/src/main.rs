//! Arbiter - specification validation and IR lowering CLI
//!
//! ## Commands
//!
//! - `validate`: resolve a directory of fragments and run assertions
//! - `lower`: project a resolved tree into IR documents

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{debug, info, Level};

use arbiter_core::{AssertionConfig, Fragment, IrKind, ResolvedSpec, ValidationResult};
use arbiter_pipeline::{strategy_by_name, Pipeline, PipelineConfig, TokioProcessRunner};

/// File extension of fragment sources picked up by `validate`.
const FRAGMENT_EXTENSION: &str = "cue";

#[derive(Parser)]
#[command(name = "arbiter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resolve, check and lower declarative project specifications", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a directory of fragments and run the assertion battery
    Validate {
        /// Directory containing the project's fragment files
        dir: PathBuf,

        /// Project id (default: the directory name)
        #[arg(long)]
        project: Option<String>,

        /// JSON file holding an array of assertion configs
        #[arg(long)]
        assertions: Option<PathBuf>,

        /// Assertion execution strategy
        #[arg(long, default_value = "parallel", value_parser = ["sequential", "parallel"])]
        strategy: String,

        /// Whole-call deadline in milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,

        /// Print the full validation result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        tools: ToolArgs,
    },

    /// Lower a resolved tree (or a saved validation result) into IR
    Lower {
        /// IR kind: capabilities, flows, dependencies, coverage, or all
        kind: String,

        /// Resolved tree JSON, or a validation result JSON with a `resolved` field
        resolved: PathBuf,
    },
}

/// External tool settings, overridable from the environment.
#[derive(Args)]
struct ToolArgs {
    /// Schema-language evaluator binary
    #[arg(long, env = "ARBITER_EVALUATOR")]
    evaluator: Option<String>,

    /// Query tool binary
    #[arg(long, env = "ARBITER_QUERY_TOOL")]
    query_tool: Option<String>,

    /// Per-process timeout in milliseconds
    #[arg(long, env = "ARBITER_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Concurrency ceiling for the parallel strategy
    #[arg(long, env = "ARBITER_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,
}

impl ToolArgs {
    fn into_config(self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(evaluator) = self.evaluator {
            config.evaluator_binary = evaluator;
        }
        if let Some(query_tool) = self.query_tool {
            config = config.with_query_binary(query_tool);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config = config.with_timeout_ms(timeout_ms);
        }
        if let Some(max_concurrency) = self.max_concurrency {
            config = config.with_max_concurrency(max_concurrency);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    arbiter_core::telemetry::init_tracing(cli.log_json, level);

    match cli.command {
        Commands::Validate {
            dir,
            project,
            assertions,
            strategy,
            deadline_ms,
            json,
            tools,
        } => {
            cmd_validate(
                &dir,
                project,
                assertions.as_deref(),
                &strategy,
                deadline_ms,
                json,
                tools.into_config(),
            )
            .await
        }
        Commands::Lower { kind, resolved } => cmd_lower(&kind, &resolved),
    }
}

async fn cmd_validate(
    dir: &Path,
    project: Option<String>,
    assertions: Option<&Path>,
    strategy: &str,
    deadline_ms: Option<u64>,
    json: bool,
    config: PipelineConfig,
) -> Result<ExitCode> {
    let project_id = match project {
        Some(id) => id,
        None => project_name(dir)?,
    };
    let fragments = collect_fragments(dir)?;
    info!(project_id = %project_id, fragments = fragments.len(), "Validating");

    let strategy = strategy_by_name(strategy, config.max_concurrency)
        .with_context(|| format!("Unknown strategy: {strategy}"))?;
    let configs: Vec<AssertionConfig> = match assertions {
        Some(path) => read_json_file(path)?,
        None => Vec::new(),
    };

    let pipeline = Pipeline::new(Arc::new(TokioProcessRunner::new()), config)
        .with_assertions(configs)
        .with_strategy(strategy);

    let result = match deadline_ms {
        Some(ms) => {
            pipeline
                .validate_within(&project_id, &fragments, Duration::from_millis(ms))
                .await
        }
        None => pipeline.validate(&project_id, &fragments).await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render_validation_text(&project_id, &result));
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_lower(kind: &str, path: &Path) -> Result<ExitCode> {
    let resolved = read_resolved(path)?;

    if kind.eq_ignore_ascii_case("all") {
        let mut out = Map::new();
        for (kind, doc) in arbiter_core::lower_all(&resolved) {
            let value = match doc {
                Ok(doc) => serde_json::to_value(&doc)?,
                Err(e) => json!({ "kind": kind, "error": e.to_string() }),
            };
            out.insert(kind.to_string(), value);
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
        return Ok(ExitCode::SUCCESS);
    }

    let kind: IrKind = kind.parse()?;
    let doc = arbiter_core::lower(kind, &resolved)
        .with_context(|| format!("Failed to lower {kind}"))?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(ExitCode::SUCCESS)
}

fn render_validation_text(project_id: &str, result: &ValidationResult) -> String {
    let mut lines = Vec::new();
    if result.success {
        lines.push(format!("{project_id}: resolved (hash {})", result.hash));
    } else {
        lines.push(format!("{project_id}: failed"));
    }
    for error in &result.errors {
        let location = error
            .details
            .as_ref()
            .and_then(|d| Some((d.get("file")?.as_str()?, d.get("line")?.as_u64()?)))
            .map(|(file, line)| format!(" ({file}:{line})"))
            .unwrap_or_default();
        lines.push(format!("  [{}] {}{location}", error.kind, error.message));
    }
    lines.join("\n")
}

fn project_name(dir: &Path) -> Result<String> {
    let canonical = dir
        .canonicalize()
        .with_context(|| format!("Failed to open directory: {:?}", dir))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Cannot derive a project id from the directory; pass --project")
}

/// Read every fragment file under `root`, paths relative to `root`.
fn collect_fragments(root: &Path) -> Result<Vec<Fragment>> {
    let mut files = Vec::new();
    walk(root, &mut files).with_context(|| format!("Failed to scan {:?}", root))?;
    files.sort();

    let mut fragments = Vec::with_capacity(files.len());
    for file in files {
        let relative = file
            .strip_prefix(root)
            .with_context(|| format!("{:?} is outside {:?}", file, root))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read fragment: {:?}", file))?;
        debug!(path = %path, bytes = content.len(), "Collected fragment");
        fragments.push(Fragment::new(path, content));
    }

    if fragments.is_empty() {
        bail!("No .{FRAGMENT_EXTENSION} files found under {:?}", root);
    }
    Ok(fragments)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if file_type.is_dir() && !hidden {
            walk(&path, out)?;
        } else if file_type.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(FRAGMENT_EXTENSION)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Accept either a bare tree or a saved validation result.
fn read_resolved(path: &Path) -> Result<ResolvedSpec> {
    let value: Value = read_json_file(path)?;
    let tree = match (value.get("success"), value.get("resolved")) {
        (Some(Value::Bool(false)), _) => {
            return Err(arbiter_core::ArbiterError::NotResolved)
                .with_context(|| format!("{:?} holds a failed validation", path))
        }
        (Some(Value::Bool(true)), Some(resolved)) => resolved.clone(),
        _ => value,
    };
    ResolvedSpec::from_value(tree).with_context(|| format!("Invalid resolved tree in {:?}", path))
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}
