// src/transform/mod.rs

//! Transforms: resolved source-template to target-file mappings.
//!
//! - [`resolve`] turns raw config specs into [`FileTransform`]s and
//!   [`DirectoryTransform`]s.
//! - [`expand`] materializes directory transforms into file transforms,
//!   either by a full scan or one template at a time.
//! - [`cycle`] removes every transform that touches a cycle in the
//!   source -> target graph.

use std::fmt;
use std::path::PathBuf;

use crate::paths::CanonicalPath;

pub mod cycle;
pub mod expand;
pub mod resolve;

pub use cycle::{CycleReport, remove_cycles};
pub use expand::{DerivedSet, expand_directory, strip_template_extension};
pub use resolve::{ResolvedTransforms, build_file_transform, resolve_all};

/// One template file rendered into one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransform {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Directories the render engine searches, in priority order.
    pub search_paths: Vec<PathBuf>,
    /// Name of `source` relative to the first search path containing it.
    pub lookup_name: String,
    pub description: String,
}

impl FileTransform {
    pub fn source_key(&self) -> CanonicalPath {
        CanonicalPath::new(&self.source)
    }

    pub fn target_key(&self) -> CanonicalPath {
        CanonicalPath::new(&self.target)
    }
}

impl fmt::Display for FileTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// A source directory whose templates each map into a target directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTransform {
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
    pub recursive: bool,
    pub workspace_root: Option<PathBuf>,
    pub description: String,
}

impl fmt::Display for DirectoryTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
