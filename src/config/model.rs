// src/config/model.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

/// Merged template variables: name to arbitrarily nested value.
pub type VariableEnvironment = Map<String, Value>;

/// Where a configuration document lives and which workspace owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    /// Innermost workspace root containing `path`, if any.
    pub workspace_root: Option<PathBuf>,
}

impl ConfigLocation {
    pub fn new(path: impl Into<PathBuf>, workspace_root: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            workspace_root,
        }
    }

    /// Directory containing the config file.
    pub fn config_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Base directory for relative paths in this document: the workspace
    /// root when there is one, else the config file's own directory.
    pub fn resolution_base(&self) -> &Path {
        self.workspace_root
            .as_deref()
            .unwrap_or_else(|| self.config_dir())
    }
}

/// A transform entry as written in a config document, normalized from any
/// of the accepted shapes but not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSpec {
    pub source: String,
    pub target: String,
    /// Present only for directory transforms.
    pub recursive: Option<bool>,
}

impl TransformSpec {
    pub fn file(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            recursive: None,
        }
    }

    pub fn directory(source: impl Into<String>, target: impl Into<String>, recursive: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            recursive: Some(recursive),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.recursive.is_some()
    }
}

/// A spec together with the document it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedSpec {
    pub spec: TransformSpec,
    pub origin: Arc<ConfigLocation>,
}

/// One parsed configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    pub vars: VariableEnvironment,
    pub transforms: Vec<TransformSpec>,
}

/// Result of merging every discovered document.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
    pub vars: VariableEnvironment,
    pub file_specs: Vec<ScopedSpec>,
    pub directory_specs: Vec<ScopedSpec>,
    /// Documents merged successfully.
    pub loaded: usize,
    /// Documents skipped because they failed to parse.
    pub failed: usize,
}
