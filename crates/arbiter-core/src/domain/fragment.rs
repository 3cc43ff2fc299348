//! Source fragments: the unit of authored specification input.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{ArbiterError, Result};

/// One independently-editable unit of specification source.
///
/// Fragments are immutable once handed to a validation run. Their order within
/// a project carries no meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Fragment {
    /// Path relative to the project root, e.g. `services/api.cue`.
    pub path: String,

    /// Raw source text.
    pub content: String,
}

impl Fragment {
    /// Create a new fragment.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Return the fragment path as a normalized relative path.
    ///
    /// Rejects empty paths, absolute paths, and any `..` component so a
    /// fragment can never be written outside its scratch workspace.
    pub fn relative_path(&self) -> Result<PathBuf> {
        let invalid = |reason: &str| ArbiterError::InvalidFragmentPath {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        if self.path.trim().is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut normalized = PathBuf::new();
        for component in Path::new(&self.path).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => return Err(invalid("path escapes the workspace")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("path must be relative"))
                }
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(invalid("path has no file name"));
        }
        Ok(normalized)
    }
}
