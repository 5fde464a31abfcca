// src/engine/snapshot.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::model::VariableEnvironment;
use crate::paths::CanonicalPath;
use crate::transform::FileTransform;

/// One watched source and every transform it feeds, in active-list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRegistration {
    pub path: PathBuf,
    pub transforms: Vec<FileTransform>,
}

/// Immutable view of everything a render needs.
///
/// A new snapshot replaces the old one wholesale; renders that already
/// captured the previous one keep using it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    pub vars: Arc<VariableEnvironment>,
    pub transforms: Arc<[FileTransform]>,
    registrations: HashMap<CanonicalPath, Arc<WatchRegistration>>,
    /// Registration keys in first-appearance order.
    order: Vec<CanonicalPath>,
}

impl Snapshot {
    pub fn new(version: u64, vars: Arc<VariableEnvironment>, transforms: Vec<FileTransform>) -> Self {
        let mut grouped: HashMap<CanonicalPath, WatchRegistration> = HashMap::new();
        let mut order = Vec::new();
        for t in &transforms {
            let key = t.source_key();
            grouped
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    WatchRegistration {
                        path: t.source.clone(),
                        transforms: Vec::new(),
                    }
                })
                .transforms
                .push(t.clone());
        }

        Self {
            version,
            vars,
            transforms: transforms.into(),
            registrations: grouped
                .into_iter()
                .map(|(k, r)| (k, Arc::new(r)))
                .collect(),
            order,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Registration for the source at `path`, if it is watched.
    pub fn registration(&self, path: &Path) -> Option<Arc<WatchRegistration>> {
        self.registrations.get(&CanonicalPath::new(path)).cloned()
    }

    /// Every registration, in the order its source first appears.
    pub fn registrations(&self) -> impl Iterator<Item = &WatchRegistration> {
        self.order
            .iter()
            .filter_map(|key| self.registrations.get(key).map(Arc::as_ref))
    }
}
