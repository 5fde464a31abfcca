// src/paths.rs

//! Path canonicalization used for every map key in the engine.
//!
//! Canonicalization is purely lexical (`.` and `..` segments are folded,
//! separators unified) so that it also works for targets that do not exist
//! yet. On platforms whose default filesystems are case-insensitive the key
//! is additionally lower-cased.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Whether canonical keys fold letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    /// Case handling of the platform this binary was built for.
    pub const fn platform() -> Self {
        if cfg!(any(windows, target_os = "macos")) {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Sensitive
        }
    }
}

/// A normalized path string usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    pub fn new(path: &Path) -> Self {
        Self::with_case(path, CaseSensitivity::platform())
    }

    pub fn with_case(path: &Path, case: CaseSensitivity) -> Self {
        let mut key = posix_string(&normalize(path));
        if case == CaseSensitivity::Insensitive {
            key = key.to_lowercase();
        }
        CanonicalPath(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding normal segment. Leading `..` on relative paths are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Resolve a configured path fragment against `base` unless it is already
/// absolute, then normalize it.
pub fn resolve_against(base: &Path, raw: &str) -> PathBuf {
    let raw = Path::new(raw);
    if raw.is_absolute() {
        normalize(raw)
    } else {
        normalize(&base.join(raw))
    }
}

/// Drop later duplicates (by canonical key), keeping first occurrences in
/// order. Returned paths are normalized.
pub fn dedupe_paths<I>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .map(|p| normalize(&p))
        .filter(|p| seen.insert(CanonicalPath::new(p)))
        .collect()
}

/// Path of `path` relative to `root` with forward slashes, but only when it
/// is a proper descendant (not equal, no `..` segments).
pub fn descendant_relative(root: &Path, path: &Path) -> Option<String> {
    let root = normalize(root);
    let path = normalize(path);
    let rel = strip_prefix_folded(&path, &root)?;
    if rel.as_os_str().is_empty()
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(posix_string(&rel))
}

/// `true` when `path` lies strictly inside `dir`.
pub fn is_within(dir: &Path, path: &Path) -> bool {
    descendant_relative(dir, path).is_some()
}

/// Render a path with `/` separators regardless of platform.
pub fn posix_string(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

fn strip_prefix_folded(path: &Path, root: &Path) -> Option<PathBuf> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }
    if CaseSensitivity::platform() == CaseSensitivity::Sensitive {
        return None;
    }

    // Case-insensitive platforms: compare component-wise ignoring case but
    // return the descendant part with its original spelling.
    let mut path_iter = path.components();
    for root_component in root.components() {
        let path_component = path_iter.next()?;
        let a = root_component.as_os_str().to_string_lossy().to_lowercase();
        let b = path_component.as_os_str().to_string_lossy().to_lowercase();
        if a != b {
            return None;
        }
    }
    Some(path_iter.as_path().to_path_buf())
}
