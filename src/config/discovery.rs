// src/config/discovery.rs

//! Finding configuration documents inside the workspace roots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use crate::config::model::ConfigLocation;
use crate::fs::FileSystem;
use crate::paths::{self, CanonicalPath};

/// Default pattern for configuration documents, relative to a workspace root.
pub const DEFAULT_CONFIG_GLOB: &str = "**/.retemplate.{json,yaml,yml,toml}";

/// Directory names never descended into while scanning.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Lists the configuration documents the engine should merge.
pub trait ConfigSource: Send + Sync {
    /// All current config locations. An error means the list itself could
    /// not be produced; the caller keeps its previous state.
    fn list(&self) -> Result<Vec<ConfigLocation>>;

    /// Whether an event on `path` concerns a configuration document.
    fn is_config_path(&self, path: &Path) -> bool;

    /// Roots that should be watched for config changes.
    fn roots(&self) -> Vec<PathBuf>;
}

/// Walks workspace roots and matches files against a glob.
#[derive(Debug)]
pub struct GlobConfigSource {
    fs: Arc<dyn FileSystem>,
    roots: Vec<PathBuf>,
    matcher: GlobMatcher,
}

impl GlobConfigSource {
    pub fn new(fs: Arc<dyn FileSystem>, roots: Vec<PathBuf>, pattern: &str) -> Result<Self> {
        let matcher = Glob::new(pattern)
            .with_context(|| format!("invalid config glob pattern: {pattern}"))?
            .compile_matcher();
        let roots = paths::dedupe_paths(roots);
        Ok(Self { fs, roots, matcher })
    }

    /// Innermost workspace root containing `path`.
    fn owning_root(&self, path: &Path) -> Option<&PathBuf> {
        self.roots
            .iter()
            .filter(|root| paths::is_within(root, path))
            .max_by_key(|root| root.components().count())
    }

    fn matches(&self, path: &Path) -> bool {
        self.owning_root(path)
            .and_then(|root| paths::descendant_relative(root, path))
            .is_some_and(|rel| self.matcher.is_match(rel))
    }

    fn walk(&self, root: &Path, found: &mut BTreeMap<CanonicalPath, PathBuf>) -> Result<()> {
        // The root itself must be listable; nested failures are skipped.
        let mut stack = vec![self.fs.read_dir(root)?];

        while let Some(entries) = stack.pop() {
            for path in entries {
                if self.fs.is_dir(&path) {
                    let skipped = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| SKIPPED_DIRS.contains(&n));
                    if skipped {
                        continue;
                    }
                    match self.fs.read_dir(&path) {
                        Ok(children) => stack.push(children),
                        Err(err) => warn!(dir = ?path, error = %err, "skipping unreadable directory"),
                    }
                } else if self.fs.is_file(&path) && self.matches(&path) {
                    found.insert(CanonicalPath::new(&path), paths::normalize(&path));
                }
            }
        }
        Ok(())
    }
}

impl ConfigSource for GlobConfigSource {
    fn list(&self) -> Result<Vec<ConfigLocation>> {
        let mut found = BTreeMap::new();
        for root in &self.roots {
            self.walk(root, &mut found)
                .with_context(|| format!("listing config files under {:?}", root))?;
        }

        let locations: Vec<ConfigLocation> = found
            .into_values()
            .map(|path| {
                let root = self.owning_root(&path).cloned();
                ConfigLocation::new(path, root)
            })
            .collect();
        debug!(count = locations.len(), "discovered config documents");
        Ok(locations)
    }

    fn is_config_path(&self, path: &Path) -> bool {
        self.matches(&paths::normalize(path))
    }

    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }
}

/// A fixed list of config files, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    pub locations: Vec<ConfigLocation>,
}

impl ConfigSource for StaticConfigSource {
    fn list(&self) -> Result<Vec<ConfigLocation>> {
        Ok(self.locations.clone())
    }

    fn is_config_path(&self, path: &Path) -> bool {
        let key = CanonicalPath::new(path);
        self.locations
            .iter()
            .any(|loc| CanonicalPath::new(&loc.path) == key)
    }

    fn roots(&self) -> Vec<PathBuf> {
        paths::dedupe_paths(
            self.locations
                .iter()
                .map(|loc| loc.config_dir().to_path_buf()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn finds_configs_and_assigns_innermost_root() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/.retemplate.json", "{}");
        fs.add_file("/w/pkg/.retemplate.yaml", "");
        fs.add_file("/w/pkg/deep/.retemplate.toml", "");
        fs.add_file("/w/node_modules/x/.retemplate.json", "{}");
        fs.add_file("/w/other.json", "{}");

        let source = GlobConfigSource::new(
            Arc::new(fs),
            vec![PathBuf::from("/w"), PathBuf::from("/w/pkg")],
            DEFAULT_CONFIG_GLOB,
        )
        .unwrap();

        let found = source.list().unwrap();
        let summary: Vec<(String, Option<String>)> = found
            .iter()
            .map(|l| {
                (
                    l.path.to_string_lossy().into_owned(),
                    l.workspace_root.as_ref().map(|r| r.to_string_lossy().into_owned()),
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("/w/.retemplate.json".into(), Some("/w".into())),
                ("/w/pkg/.retemplate.yaml".into(), Some("/w/pkg".into())),
                ("/w/pkg/deep/.retemplate.toml".into(), Some("/w/pkg".into())),
            ]
        );

        assert!(source.is_config_path(Path::new("/w/pkg/./.retemplate.yaml")));
        assert!(!source.is_config_path(Path::new("/w/other.json")));
    }

    #[test]
    fn unreadable_root_fails_the_listing() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w");
        fs.deny_read_dir("/w");
        let source =
            GlobConfigSource::new(Arc::new(fs), vec![PathBuf::from("/w")], DEFAULT_CONFIG_GLOB)
                .unwrap();
        assert!(source.list().is_err());
    }
}
