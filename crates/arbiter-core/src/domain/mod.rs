//! Domain models for Arbiter.
//!
//! Canonical definitions for the core entities:
//! - `Fragment`: one authored unit of specification source
//! - `ResolvedSpec`: the merged, immutable specification tree
//! - `ValidationResult` / `ValidationError`: outcome of a validation run
//! - `AssertionConfig`: a configured business-rule check

pub mod assertion;
pub mod digest;
pub mod error;
pub mod fragment;
pub mod resolved;
pub mod validation;

pub use assertion::{AssertionConfig, AssertionKind};
pub use digest::{canonical_json, compute_digest, sha256_hex};
pub use error::{ArbiterError, Result};
pub use fragment::Fragment;
pub use resolved::ResolvedSpec;
pub use validation::{ErrorKind, ValidationError, ValidationResult};
