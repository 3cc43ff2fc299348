//! Arbiter Core Library
//!
//! Domain model, canonical spec hashing and IR lowering. Everything here is
//! pure; the process-driving pipeline lives in `arbiter-pipeline`.

pub mod domain;
pub mod ir;
pub mod obs;
pub mod telemetry;

pub use domain::{
    canonical_json, compute_digest, sha256_hex, ArbiterError, AssertionConfig, AssertionKind,
    ErrorKind, Fragment, ResolvedSpec, Result, ValidationError, ValidationResult,
};

pub use ir::{
    lower, lower_all, CoverageDocument, CoverageStatus, CoverageSummary, FlowDocument,
    GraphDocument, IrData, IrDocument, IrError, IrKind, IrResult,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
