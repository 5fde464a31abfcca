// src/watch/mod.rs

//! File watching.
//!
//! This module is responsible for:
//! - Defining the [`WatchBackend`] seam the engine registers paths with.
//! - Wiring up a cross-platform filesystem watcher (`notify`) behind it.
//!
//! It does **not** know about transforms; it only turns filesystem changes
//! into [`FsEvent`]s. Delivery is at-least-once and may be duplicated.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::types::{FsEventKind, WatchMode};

pub mod watcher;

pub use watcher::NotifyBackend;

/// Which registration produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOrigin {
    /// A per-source registration made by the render scheduler.
    Source,
    /// A workspace root or directory-transform tree.
    Tree,
}

/// One filesystem notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
    pub origin: WatchOrigin,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind, origin: WatchOrigin) -> Self {
        Self {
            path: path.into(),
            kind,
            origin,
        }
    }
}

/// Registers and releases watched paths.
pub trait WatchBackend: Send + Sync {
    fn watch(&self, path: &Path, mode: WatchMode) -> Result<()>;
    fn unwatch(&self, path: &Path) -> Result<()>;
}

/// Accepts every registration and never reports anything. Used for
/// one-shot runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatchBackend;

impl WatchBackend for NullWatchBackend {
    fn watch(&self, _path: &Path, _mode: WatchMode) -> Result<()> {
        Ok(())
    }

    fn unwatch(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
