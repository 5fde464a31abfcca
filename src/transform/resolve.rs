// src/transform/resolve.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{MergedConfig, ScopedSpec};
use crate::config::settings::Settings;
use crate::diagnostics::Diagnostics;
use crate::errors::{Result, RetemplateError};
use crate::fs::FileSystem;
use crate::paths::{self, CanonicalPath};
use crate::transform::{DirectoryTransform, FileTransform};

/// Explicit transforms resolved from a merged configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolvedTransforms {
    pub files: Vec<FileTransform>,
    pub directories: Vec<DirectoryTransform>,
}

/// Resolve every spec in `merged`. Specs that fail are reported and dropped.
/// Repeated `(source, target)` pairs collapse onto their first occurrence.
pub fn resolve_all(
    fs: &dyn FileSystem,
    settings: &Settings,
    merged: &MergedConfig,
    diagnostics: &Diagnostics,
) -> ResolvedTransforms {
    let mut resolved = ResolvedTransforms::default();

    let mut seen_pairs = HashSet::new();
    for scoped in &merged.file_specs {
        match resolve_file_spec(fs, settings, scoped) {
            Ok(t) => {
                if seen_pairs.insert((t.source_key(), t.target_key())) {
                    resolved.files.push(t);
                } else {
                    debug!(transform = %t, "dropping duplicate transform");
                }
            }
            Err(err) => diagnostics.report(&err),
        }
    }

    let mut seen_dirs = HashSet::new();
    for scoped in &merged.directory_specs {
        let dt = resolve_directory_spec(scoped);
        let key = (
            CanonicalPath::new(&dt.source_dir),
            CanonicalPath::new(&dt.target_dir),
            dt.recursive,
        );
        if seen_dirs.insert(key) {
            resolved.directories.push(dt);
        }
    }

    resolved
}

/// Resolve a file-transform spec against its document's base directory.
pub fn resolve_file_spec(
    fs: &dyn FileSystem,
    settings: &Settings,
    scoped: &ScopedSpec,
) -> Result<FileTransform> {
    let base = scoped.origin.resolution_base();
    let source = paths::resolve_against(base, &scoped.spec.source);
    let target = paths::resolve_against(base, &scoped.spec.target);
    let description = format!("{} -> {}", scoped.spec.source, scoped.spec.target);
    build_file_transform(
        fs,
        settings,
        source,
        target,
        scoped.origin.workspace_root.as_deref(),
        description,
    )
}

/// Resolve a directory-transform spec. The directories are not required to
/// exist yet.
pub fn resolve_directory_spec(scoped: &ScopedSpec) -> DirectoryTransform {
    let base = scoped.origin.resolution_base();
    DirectoryTransform {
        source_dir: paths::resolve_against(base, &scoped.spec.source),
        target_dir: paths::resolve_against(base, &scoped.spec.target),
        recursive: scoped.spec.recursive.unwrap_or(false),
        workspace_root: scoped.origin.workspace_root.clone(),
        description: format!(
            "{}/ -> {}/",
            scoped.spec.source.trim_end_matches('/'),
            scoped.spec.target.trim_end_matches('/')
        ),
    }
}

/// Validate absolute `source`/`target` and derive search paths and the
/// template lookup name.
pub fn build_file_transform(
    fs: &dyn FileSystem,
    settings: &Settings,
    source: PathBuf,
    target: PathBuf,
    workspace_root: Option<&Path>,
    description: String,
) -> Result<FileTransform> {
    if !fs.is_file(&source) {
        return Err(RetemplateError::MissingSource(source));
    }

    if CanonicalPath::new(&source) == CanonicalPath::new(&target) {
        return Err(RetemplateError::DegenerateTransform {
            source_path: source,
            target,
            reason: "source and target are the same file".to_string(),
        });
    }

    let search_paths = search_paths_for(&source, workspace_root, &settings.search_paths);
    let lookup_name = lookup_name(&source, &search_paths);
    if lookup_name.trim().is_empty() {
        return Err(RetemplateError::DegenerateTransform {
            source_path: source,
            target,
            reason: "empty template lookup name".to_string(),
        });
    }

    Ok(FileTransform {
        source,
        target,
        search_paths,
        lookup_name,
        description,
    })
}

/// Search paths in priority order: the source's directory, the workspace
/// root, then each extra path (relative ones resolved against the
/// workspace root). Duplicates keep their first position.
pub fn search_paths_for(
    source: &Path,
    workspace_root: Option<&Path>,
    extra: &[String],
) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2 + extra.len());
    if let Some(dir) = source.parent() {
        candidates.push(dir.to_path_buf());
    }
    if let Some(root) = workspace_root {
        candidates.push(root.to_path_buf());
    }
    for raw in extra {
        let path = match workspace_root {
            Some(root) => paths::resolve_against(root, raw),
            None => PathBuf::from(raw),
        };
        candidates.push(path);
    }
    paths::dedupe_paths(candidates)
}

/// `source` relative to the first search path it descends from, with
/// forward slashes; the bare file name when none match.
pub fn lookup_name(source: &Path, search_paths: &[PathBuf]) -> String {
    search_paths
        .iter()
        .find_map(|dir| paths::descendant_relative(dir, source))
        .or_else(|| {
            source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_paths_are_ordered_and_deduplicated() {
        let got = search_paths_for(
            Path::new("/w/templates/page.njk"),
            Some(Path::new("/w")),
            &["shared".into(), "/abs/lib".into(), "templates".into(), ".".into()],
        );
        assert_eq!(
            got,
            vec![
                PathBuf::from("/w/templates"),
                PathBuf::from("/w"),
                PathBuf::from("/w/shared"),
                PathBuf::from("/abs/lib"),
            ]
        );
    }

    #[test]
    fn extra_paths_stay_as_is_without_workspace() {
        let got = search_paths_for(Path::new("/t/a.njk"), None, &["rel/dir".into()]);
        assert_eq!(got, vec![PathBuf::from("/t"), PathBuf::from("rel/dir")]);
    }

    #[test]
    fn lookup_name_uses_first_matching_search_path() {
        let sp = vec![PathBuf::from("/w/other"), PathBuf::from("/w")];
        assert_eq!(lookup_name(Path::new("/w/t/sub/a.njk"), &sp), "t/sub/a.njk");
        assert_eq!(lookup_name(Path::new("/elsewhere/b.njk"), &sp), "b.njk");
    }
}
