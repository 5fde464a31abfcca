// src/watch/watcher.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::paths::{self, CanonicalPath};
use crate::types::{FsEventKind, WatchMode};
use crate::watch::{FsEvent, WatchBackend, WatchOrigin};

/// What is currently registered with one backend.
///
/// Single files are watched through their parent directory (editors often
/// replace a file by renaming over it, which a watch on the file itself
/// would miss) and events are filtered down to exactly the registered
/// files. Directories are watched as a whole.
#[derive(Debug, Default)]
struct Registrations {
    /// Registered files and the directory watched on their behalf.
    files: HashMap<CanonicalPath, PathBuf>,
    /// Number of registered files per watched parent directory.
    parents: HashMap<PathBuf, usize>,
    trees: HashMap<PathBuf, WatchMode>,
}

impl Registrations {
    fn accepts(&self, path: &Path) -> bool {
        if self.files.contains_key(&CanonicalPath::new(path)) {
            return true;
        }
        self.trees.iter().any(|(dir, mode)| match mode {
            WatchMode::Recursive => paths::is_within(dir, path) || dir == path,
            WatchMode::NonRecursive => path.parent() == Some(dir.as_path()) || dir == path,
        })
    }
}

/// `notify`-backed [`WatchBackend`].
///
/// Every accepted notification is forwarded as an [`FsEvent`] tagged with
/// this backend's origin. Dropping the backend stops watching.
pub struct NotifyBackend {
    origin: WatchOrigin,
    watcher: Mutex<RecommendedWatcher>,
    registrations: Arc<Mutex<Registrations>>,
}

impl std::fmt::Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl NotifyBackend {
    pub fn new(origin: WatchOrigin, events: mpsc::UnboundedSender<FsEvent>) -> Result<Self> {
        let registrations = Arc::new(Mutex::new(Registrations::default()));

        // Called synchronously on notify's own thread.
        let watcher = RecommendedWatcher::new(
            {
                let registrations = Arc::clone(&registrations);
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        trace!(?event, "received notify event");
                        let regs = lock(&registrations);
                        for (path, kind) in translate(&event) {
                            if !regs.accepts(&path) {
                                continue;
                            }
                            if events.send(FsEvent::new(path, kind, origin)).is_err() {
                                debug!("event receiver dropped; discarding notification");
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        eprintln!("retemplate: file watch error: {err}");
                    }
                }
            },
            Config::default(),
        )
        .context("creating filesystem watcher")?;

        info!(?origin, "file watcher started");
        Ok(Self {
            origin,
            watcher: Mutex::new(watcher),
            registrations,
        })
    }
}

impl WatchBackend for NotifyBackend {
    fn watch(&self, path: &Path, mode: WatchMode) -> Result<()> {
        let path = paths::normalize(path);
        let mut regs = lock(&self.registrations);

        if path.is_dir() {
            if regs.trees.get(&path) == Some(&mode) {
                return Ok(());
            }
            let recursive = match mode {
                WatchMode::Recursive => RecursiveMode::Recursive,
                WatchMode::NonRecursive => RecursiveMode::NonRecursive,
            };
            lock(&self.watcher)
                .watch(&path, recursive)
                .with_context(|| format!("watching directory {:?}", path))?;
            debug!(origin = ?self.origin, dir = ?path, ?mode, "watching tree");
            regs.trees.insert(path, mode);
            return Ok(());
        }

        let key = CanonicalPath::new(&path);
        if regs.files.contains_key(&key) {
            return Ok(());
        }
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .context("watched file has no parent directory")?;
        if !regs.parents.contains_key(&parent) {
            lock(&self.watcher)
                .watch(&parent, RecursiveMode::NonRecursive)
                .with_context(|| format!("watching directory {:?}", parent))?;
        }
        *regs.parents.entry(parent.clone()).or_default() += 1;
        regs.files.insert(key, parent);
        debug!(origin = ?self.origin, file = ?path, "watching file");
        Ok(())
    }

    fn unwatch(&self, path: &Path) -> Result<()> {
        let path = paths::normalize(path);
        let mut regs = lock(&self.registrations);

        if regs.trees.remove(&path).is_some() {
            lock(&self.watcher)
                .unwatch(&path)
                .with_context(|| format!("unwatching directory {:?}", path))?;
            return Ok(());
        }

        let Some(parent) = regs.files.remove(&CanonicalPath::new(&path)) else {
            return Ok(());
        };
        let remaining = match regs.parents.get_mut(&parent) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            regs.parents.remove(&parent);
            // The directory may already be gone; notify drops such watches
            // on its own.
            if let Err(err) = lock(&self.watcher).unwatch(&parent) {
                debug!(dir = ?parent, error = %err, "unwatch failed");
            }
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map one notify event onto per-path engine events. Access and other
/// non-mutating notifications produce nothing.
fn translate(event: &Event) -> Vec<(PathBuf, FsEventKind)> {
    let all = |kind: FsEventKind| -> Vec<(PathBuf, FsEventKind)> {
        event.paths.iter().map(|p| (p.clone(), kind)).collect()
    };

    match event.kind {
        EventKind::Create(_) => all(FsEventKind::Created),
        EventKind::Remove(_) => all(FsEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => all(FsEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => all(FsEventKind::Created),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(event.paths.len());
            let mut it = event.paths.iter();
            if let Some(from) = it.next() {
                out.push((from.clone(), FsEventKind::Deleted));
            }
            out.extend(it.map(|to| (to.clone(), FsEventKind::Created)));
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    FsEventKind::Created
                } else {
                    FsEventKind::Deleted
                };
                (p.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) | EventKind::Any => all(FsEventKind::Changed),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};

    #[test]
    fn translates_event_kinds() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/w/a".into());
        assert_eq!(translate(&create), vec![(PathBuf::from("/w/a"), FsEventKind::Created)]);

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path("/w/a".into());
        assert_eq!(translate(&write), vec![(PathBuf::from("/w/a"), FsEventKind::Changed)]);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path("/w/a".into());
        assert_eq!(translate(&remove), vec![(PathBuf::from("/w/a"), FsEventKind::Deleted)]);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/w/a.tmp".into())
            .add_path("/w/a".into());
        assert_eq!(
            translate(&rename),
            vec![
                (PathBuf::from("/w/a.tmp"), FsEventKind::Deleted),
                (PathBuf::from("/w/a"), FsEventKind::Created),
            ]
        );

        let access = Event::new(EventKind::Access(AccessKind::Any)).add_path("/w/a".into());
        assert!(translate(&access).is_empty());
    }

    #[test]
    fn registrations_filter_to_files_and_trees() {
        let mut regs = Registrations::default();
        regs.files
            .insert(CanonicalPath::new(Path::new("/w/t/a.njk")), PathBuf::from("/w/t"));
        regs.trees.insert(PathBuf::from("/w/flat"), WatchMode::NonRecursive);
        regs.trees.insert(PathBuf::from("/w/deep"), WatchMode::Recursive);

        assert!(regs.accepts(Path::new("/w/t/a.njk")));
        assert!(!regs.accepts(Path::new("/w/t/b.njk")));
        assert!(regs.accepts(Path::new("/w/flat/x.njk")));
        assert!(!regs.accepts(Path::new("/w/flat/sub/x.njk")));
        assert!(regs.accepts(Path::new("/w/deep/sub/x.njk")));
        assert!(regs.accepts(Path::new("/w/deep")));
    }

    #[tokio::test]
    async fn forwards_changes_to_registered_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let watched = root.join("a.njk");
        std::fs::write(&watched, "one").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let backend = NotifyBackend::new(WatchOrigin::Source, tx).unwrap();
        backend.watch(&watched, WatchMode::NonRecursive).unwrap();

        std::fs::write(root.join("other.njk"), "ignored").unwrap();
        std::fs::write(&watched, "two").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                let Some(ev) = rx.recv().await else {
                    panic!("watcher channel closed");
                };
                if ev.kind != FsEventKind::Deleted {
                    return ev;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.path, watched);
        assert_eq!(event.origin, WatchOrigin::Source);
    }
}
