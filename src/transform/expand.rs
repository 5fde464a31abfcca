// src/transform/expand.rs

//! Materializing directory transforms into file transforms.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::settings::Settings;
use crate::errors::{Result, RetemplateError};
use crate::fs::FileSystem;
use crate::paths::{self, CanonicalPath};
use crate::transform::resolve::build_file_transform;
use crate::transform::{DirectoryTransform, FileTransform};

/// Strip `ext` (compared case-insensitively) from the end of `file_name`.
///
/// Returns `None` when the name does not carry the extension. A name that
/// is only the extension yields an empty stem.
pub fn strip_template_extension(file_name: &str, ext: &str) -> Option<String> {
    if ext.is_empty() || file_name.len() < ext.len() {
        return None;
    }
    let split = file_name.len() - ext.len();
    if !file_name.is_char_boundary(split) {
        return None;
    }
    let (stem, suffix) = file_name.split_at(split);
    suffix.eq_ignore_ascii_case(ext).then(|| stem.to_string())
}

/// Outcome of a full directory scan.
#[derive(Debug, Default)]
pub struct Expansion {
    pub transforms: Vec<FileTransform>,
    /// Templates that were found but could not become transforms.
    pub rejected: Vec<RetemplateError>,
}

/// Walk `dt.source_dir` and derive one file transform per template file.
///
/// A source directory that does not exist yet expands to nothing. Any IO
/// failure while walking fails the whole directory transform.
pub fn expand_directory(
    fs: &dyn FileSystem,
    settings: &Settings,
    dt: &DirectoryTransform,
) -> Result<Expansion> {
    let mut expansion = Expansion::default();
    if !fs.exists(&dt.source_dir) {
        debug!(dir = ?dt.source_dir, "directory transform source does not exist yet");
        return Ok(expansion);
    }

    let ext = settings.normalized_extension();
    let mut templates = Vec::new();
    let mut stack = vec![dt.source_dir.clone()];
    while let Some(dir) = stack.pop() {
        let entries = fs.read_dir(&dir).map_err(|e| RetemplateError::DirectoryScan {
            dir: dir.clone(),
            message: format!("{e:#}"),
        })?;
        for path in entries {
            if fs.is_dir(&path) {
                if dt.recursive {
                    stack.push(path);
                }
            } else if fs.is_file(&path) && has_template_extension(&path, &ext) {
                templates.push(path);
            }
        }
    }
    templates.sort();

    for source in templates {
        match derive_for(fs, settings, dt, &source, &ext) {
            Some(Ok(t)) => expansion.transforms.push(t),
            Some(Err(err)) => expansion.rejected.push(err),
            None => {}
        }
    }
    Ok(expansion)
}

/// Derive the file transform for a single template under `dt`.
///
/// `None` means `source` is not covered by this directory transform (wrong
/// extension, outside the tree, or nested while non-recursive).
pub fn derive_file_transform(
    fs: &dyn FileSystem,
    settings: &Settings,
    dt: &DirectoryTransform,
    source: &Path,
) -> Option<Result<FileTransform>> {
    derive_for(fs, settings, dt, source, &settings.normalized_extension())
}

/// Whether `path` would be a template of `dt`, regardless of whether it
/// currently exists.
pub fn covers(dt: &DirectoryTransform, path: &Path, ext: &str) -> bool {
    relative_template(dt, path, ext).is_some()
}

fn derive_for(
    fs: &dyn FileSystem,
    settings: &Settings,
    dt: &DirectoryTransform,
    source: &Path,
    ext: &str,
) -> Option<Result<FileTransform>> {
    let (rel, stem) = relative_template(dt, source, ext)?;
    let rel_parent = Path::new(&rel).parent().unwrap_or_else(|| Path::new(""));
    let target = paths::normalize(&dt.target_dir.join(rel_parent).join(&stem));
    let source = paths::normalize(source);
    let description = format!("{} ({})", rel, dt.description);

    Some(build_file_transform(
        fs,
        settings,
        source,
        target,
        dt.workspace_root.as_deref(),
        description,
    ))
}

/// Path of `path` relative to the transform's source dir plus the output
/// file name, if `path` is one of its templates.
fn relative_template(dt: &DirectoryTransform, path: &Path, ext: &str) -> Option<(String, String)> {
    let rel = paths::descendant_relative(&dt.source_dir, path)?;
    if !dt.recursive && rel.contains('/') {
        return None;
    }
    let file_name = rel.rsplit('/').next()?;
    let stem = strip_template_extension(file_name, ext)?;
    Some((rel, stem))
}

fn has_template_extension(path: &Path, ext: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| strip_template_extension(n, ext).is_some())
}

/// Derived transforms keyed by canonical source path.
///
/// Explicit transforms take precedence: a derived entry whose source is
/// also an explicit source never appears in [`DerivedSet::visible`].
#[derive(Debug, Clone, Default)]
pub struct DerivedSet {
    entries: BTreeMap<CanonicalPath, FileTransform>,
}

impl DerivedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace everything with a fresh scan result. The first transform per
    /// source wins when several directory transforms cover the same file.
    pub fn replace_all(&mut self, transforms: impl IntoIterator<Item = FileTransform>) {
        self.entries.clear();
        for t in transforms {
            self.entries.entry(t.source_key()).or_insert(t);
        }
    }

    /// Insert or replace the entry for `t`'s source. Returns `true` when the
    /// set changed.
    pub fn upsert(&mut self, t: FileTransform) -> bool {
        let key = t.source_key();
        if self.entries.get(&key) == Some(&t) {
            return false;
        }
        self.entries.insert(key, t);
        true
    }

    /// Remove the entry for `source`. Returns `true` when something was
    /// removed.
    pub fn remove(&mut self, source: &Path) -> bool {
        self.entries.remove(&CanonicalPath::new(source)).is_some()
    }

    pub fn contains(&self, source: &Path) -> bool {
        self.entries.contains_key(&CanonicalPath::new(source))
    }

    /// Derived transforms not shadowed by an explicit transform, in source
    /// path order.
    pub fn visible<'a>(
        &'a self,
        explicit: &'a [FileTransform],
    ) -> impl Iterator<Item = &'a FileTransform> + 'a {
        let explicit_sources: std::collections::HashSet<CanonicalPath> =
            explicit.iter().map(FileTransform::source_key).collect();
        self.entries
            .iter()
            .filter(move |(key, _)| !explicit_sources.contains(*key))
            .map(|(_, t)| t)
    }

    pub fn sources(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.values().map(|t| &t.source)
    }
}
