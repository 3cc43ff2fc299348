//! Arbiter Pipeline - specification validation over external tools
//!
//! Provides the validation orchestrator that:
//! - Resolves a project's fragments through an external evaluator
//! - Checks business-rule assertions through an external query tool
//! - Lowers resolved trees into IR documents on demand

pub mod assertion;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod fakes;
pub mod pipeline;
pub mod resolver;
pub mod runner;

// Re-export key types
pub use assertion::{parse_query_value, AssertionBuilder, AssertionCommand};
pub use config::PipelineConfig;
pub use engine::{
    strategy_by_name, AssertionEngine, ExecutionStrategy, Parallel, QueryContext, Sequential,
};
pub use pipeline::Pipeline;
pub use resolver::FragmentResolver;
pub use runner::{ProcessOutput, ProcessRequest, ProcessRunner, RunnerError, TokioProcessRunner};
