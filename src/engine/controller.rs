// src/engine/controller.rs

//! Reload and re-expansion logic.
//!
//! The [`Engine`] keeps the explicit transforms, directory transforms and
//! the derived set produced by expanding them. Whenever any of those
//! change it recombines them, runs cycle removal over the combined set and
//! hands the result to the [`RenderScheduler`] as a fresh snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::discovery::ConfigSource;
use crate::config::merge::merge_configs;
use crate::config::model::VariableEnvironment;
use crate::config::settings::{Settings, SettingsProvider};
use crate::diagnostics::{DiagnosticSink, Diagnostics};
use crate::engine::scheduler::{RenderScheduler, RenderSummary};
use crate::engine::single_flight::SingleFlight;
use crate::engine::snapshot::Snapshot;
use crate::fs::FileSystem;
use crate::paths;
use crate::render::TemplateRenderer;
use crate::transform::expand::{covers, derive_file_transform};
use crate::transform::{
    CycleReport, DerivedSet, DirectoryTransform, FileTransform, expand_directory, remove_cycles,
    resolve_all,
};
use crate::types::{FsEventKind, WatchMode};
use crate::watch::{FsEvent, WatchBackend, WatchOrigin};

/// Collaborators an [`Engine`] is built from.
pub struct EngineDeps {
    pub fs: Arc<dyn FileSystem>,
    pub settings: Arc<dyn SettingsProvider>,
    pub configs: Arc<dyn ConfigSource>,
    pub renderer: Arc<dyn TemplateRenderer>,
    /// Receives one registration per distinct source path.
    pub source_watcher: Arc<dyn WatchBackend>,
    /// Receives workspace roots and directory-transform trees.
    pub tree_watcher: Arc<dyn WatchBackend>,
    pub sink: Arc<dyn DiagnosticSink>,
}

/// Outcome of one configuration reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Config documents merged.
    pub loaded: usize,
    /// Config documents skipped because they failed to parse.
    pub failed: usize,
    /// Transforms active after the reload.
    pub active: usize,
    /// Transforms dropped for touching a cycle.
    pub cycles_removed: usize,
    /// The config list could not be read; the previous state stays active.
    pub kept_previous: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    vars: Arc<VariableEnvironment>,
    explicit: Vec<FileTransform>,
    directories: Vec<DirectoryTransform>,
    derived: DerivedSet,
    /// Trees currently registered with the tree watcher.
    trees: Vec<(PathBuf, WatchMode)>,
}

pub struct Engine {
    fs: Arc<dyn FileSystem>,
    settings: Arc<dyn SettingsProvider>,
    configs: Arc<dyn ConfigSource>,
    tree_watcher: Arc<dyn WatchBackend>,
    diagnostics: Diagnostics,
    scheduler: RenderScheduler,
    state: Mutex<EngineState>,
    /// Held from the first read to the final publish of every change to
    /// the transform set: reloads, rescans and single-template updates.
    reconfigure: Mutex<()>,
    reloads: SingleFlight<ReloadSummary>,
    rescans: SingleFlight<usize>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(deps: EngineDeps) -> Arc<Self> {
        let diagnostics = Diagnostics::new(deps.sink, Arc::clone(&deps.settings));
        let scheduler = RenderScheduler::new(
            Arc::clone(&deps.fs),
            deps.renderer,
            deps.source_watcher,
            diagnostics.clone(),
        );
        Arc::new(Self {
            fs: deps.fs,
            settings: deps.settings,
            configs: deps.configs,
            tree_watcher: deps.tree_watcher,
            diagnostics,
            scheduler,
            state: Mutex::new(EngineState::default()),
            reconfigure: Mutex::new(()),
            reloads: SingleFlight::new("reload"),
            rescans: SingleFlight::new("rescan"),
        })
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.scheduler.snapshot()
    }

    /// Directory transforms from the last successful reload.
    pub fn directory_transforms(&self) -> Vec<DirectoryTransform> {
        self.lock_state().directories.clone()
    }

    /// Reload every configuration document and rebuild the active set.
    ///
    /// Calls made while a reload is running wait for it and share its
    /// result instead of starting another.
    pub async fn reload(self: &Arc<Self>) -> ReloadSummary {
        let engine = Arc::clone(self);
        self.reloads
            .run(|| async move {
                let diagnostics = engine.diagnostics.clone();
                match tokio::task::spawn_blocking(move || engine.reload_blocking()).await {
                    Ok(summary) => summary,
                    Err(err) => {
                        diagnostics.warn(format!("reload aborted: {err}"));
                        ReloadSummary {
                            kept_previous: true,
                            ..ReloadSummary::default()
                        }
                    }
                }
            })
            .await
    }

    /// Re-expand every directory transform from scratch. Concurrent calls
    /// collapse like [`Engine::reload`]. Returns the size of the derived
    /// set.
    pub async fn rescan_directories(self: &Arc<Self>) -> usize {
        let engine = Arc::clone(self);
        self.rescans
            .run(|| async move {
                match tokio::task::spawn_blocking(move || engine.rescan_blocking()).await {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(error = %err, "directory rescan aborted");
                        0
                    }
                }
            })
            .await
    }

    /// Manual trigger: render every active transform.
    pub async fn render_all(&self) -> RenderSummary {
        self.scheduler.render_all().await
    }

    /// Route one filesystem event.
    ///
    /// Source events go to the scheduler. Tree events on a config document
    /// trigger a reload; tree events on templates under a directory
    /// transform patch the derived set in place.
    pub async fn handle_event(self: &Arc<Self>, event: FsEvent) {
        match event.origin {
            WatchOrigin::Source => {
                self.scheduler.on_source_event(&event.path, event.kind);
            }
            WatchOrigin::Tree => self.handle_tree_event(event).await,
        }
    }

    async fn handle_tree_event(self: &Arc<Self>, event: FsEvent) {
        if self.configs.is_config_path(&event.path) {
            debug!(path = ?event.path, kind = ?event.kind, "config document changed");
            self.reload().await;
            return;
        }

        let path = paths::normalize(&event.path);
        match event.kind {
            FsEventKind::Created | FsEventKind::Changed => {
                if self.fs.is_dir(&path) {
                    if self.overlaps_directory_transform(&path) {
                        self.rescan_directories().await;
                    }
                } else {
                    self.on_blocking_pool(move |engine| engine.upsert_template(&path))
                        .await;
                }
            }
            FsEventKind::Deleted => {
                let removed = {
                    let path = path.clone();
                    self.on_blocking_pool(move |engine| engine.remove_template(&path))
                        .await
                };
                if !removed && self.holds_derived_sources(&path) {
                    self.rescan_directories().await;
                }
            }
        }
    }

    /// Run a single-template update off the async workers. It may wait for
    /// a reload or rescan in progress.
    async fn on_blocking_pool<F>(self: &Arc<Self>, update: F) -> bool
    where
        F: FnOnce(&Engine) -> bool + Send + 'static,
    {
        let engine = Arc::clone(self);
        match tokio::task::spawn_blocking(move || update(&*engine)).await {
            Ok(changed) => changed,
            Err(err) => {
                warn!(error = %err, "template update aborted");
                false
            }
        }
    }

    /// Recompute the derived transform for one template. Returns `true`
    /// when the active set changed.
    pub fn upsert_template(&self, path: &Path) -> bool {
        let settings = self.settings.current();
        let ext = settings.normalized_extension();

        let _reconfigure = self.lock_reconfigure();
        let mut state = self.lock_state();
        let Some(dt) = state
            .directories
            .iter()
            .find(|dt| covers(dt, path, &ext))
            .cloned()
        else {
            return false;
        };

        let transform = match derive_file_transform(&*self.fs, &settings, &dt, path) {
            Some(Ok(t)) => t,
            Some(Err(err)) => {
                self.diagnostics.report(&err);
                return false;
            }
            None => return false,
        };

        let is_new = !state.derived.contains(path);
        if !state.derived.upsert(transform) {
            return false;
        }
        debug!(path = ?path, is_new, "derived transform updated");
        let (snapshot, _) = self.publish(&state);
        drop(state);

        // A template that just appeared has no source watch yet to trigger
        // its first render.
        if is_new {
            if let Some(registration) = snapshot.registration(path) {
                self.scheduler
                    .enqueue(registration, Arc::clone(&snapshot.vars));
            }
        }
        true
    }

    /// Drop the derived transform for `path`. Returns `true` when the
    /// active set changed.
    pub fn remove_template(&self, path: &Path) -> bool {
        let _reconfigure = self.lock_reconfigure();
        let mut state = self.lock_state();
        if !state.derived.remove(path) {
            return false;
        }
        debug!(path = ?path, "derived transform removed");
        let _ = self.publish(&state);
        true
    }

    fn reload_blocking(&self) -> ReloadSummary {
        let _reconfigure = self.lock_reconfigure();
        let locations = match self.configs.list() {
            Ok(locations) => locations,
            Err(err) => {
                self.diagnostics.warn(format!(
                    "could not list configuration files: {err:#}; keeping previous state"
                ));
                return ReloadSummary {
                    active: self.snapshot().transforms.len(),
                    kept_previous: true,
                    ..ReloadSummary::default()
                };
            }
        };

        let merged = merge_configs(&*self.fs, locations, &self.diagnostics);
        let settings = self.settings.current();
        let resolved = resolve_all(&*self.fs, &settings, &merged, &self.diagnostics);

        let explicit = remove_cycles(resolved.files);
        self.report_cycles(&explicit);
        let derived = self.scan(&settings, &resolved.directories);

        let mut state = self.lock_state();
        state.vars = Arc::new(merged.vars);
        state.explicit = explicit.kept;
        state.directories = resolved.directories;
        state.derived.replace_all(derived);
        let (snapshot, combined_removed) = self.publish(&state);
        self.sync_trees(&mut state);
        drop(state);

        let active = snapshot.transforms.len();
        let summary = ReloadSummary {
            loaded: merged.loaded,
            failed: merged.failed,
            active,
            cycles_removed: explicit.removed.len() + combined_removed,
            kept_previous: false,
        };
        self.diagnostics.line(format!(
            "loaded {} config file(s), {} failed",
            summary.loaded, summary.failed
        ));
        self.diagnostics
            .line(format!("{active} active transform(s)"));
        info!(?summary, "reload complete");
        summary
    }

    fn rescan_blocking(&self) -> usize {
        let _reconfigure = self.lock_reconfigure();
        let settings = self.settings.current();
        let directories = self.lock_state().directories.clone();
        let derived = self.scan(&settings, &directories);

        let mut state = self.lock_state();
        state.derived.replace_all(derived);
        let _ = self.publish(&state);
        self.sync_trees(&mut state);
        let count = state.derived.len();
        drop(state);

        self.diagnostics
            .detail(format!("rescanned directory transforms: {count} template(s)"));
        count
    }

    /// Expand every directory transform. One failing directory is reported
    /// and skipped; the others still expand.
    fn scan(&self, settings: &Settings, directories: &[DirectoryTransform]) -> Vec<FileTransform> {
        let mut out = Vec::new();
        for dt in directories {
            match expand_directory(&*self.fs, settings, dt) {
                Ok(expansion) => {
                    for err in &expansion.rejected {
                        self.diagnostics.report(err);
                    }
                    debug!(dir = %dt, count = expansion.transforms.len(), "expanded directory transform");
                    out.extend(expansion.transforms);
                }
                Err(err) => self.diagnostics.report(&err),
            }
        }
        out
    }

    /// Combine explicit and visible derived transforms, drop anything on a
    /// cycle, and install the result. Also returns how many transforms the
    /// cycle pass removed.
    fn publish(&self, state: &EngineState) -> (Arc<Snapshot>, usize) {
        let mut combined = state.explicit.clone();
        combined.extend(state.derived.visible(&state.explicit).cloned());

        let report = remove_cycles(combined);
        self.report_cycles(&report);
        let removed = report.removed.len();
        let snapshot = self.scheduler.install(Arc::clone(&state.vars), report.kept);
        (snapshot, removed)
    }

    fn report_cycles(&self, report: &CycleReport) {
        for err in report.errors() {
            self.diagnostics.report(&err);
        }
    }

    /// Keep the tree watcher registered on every workspace root plus any
    /// directory-transform source outside all roots.
    fn sync_trees(&self, state: &mut EngineState) {
        let roots = self.configs.roots();
        let mut desired: Vec<(PathBuf, WatchMode)> = roots
            .iter()
            .map(|r| (r.clone(), WatchMode::Recursive))
            .collect();
        for dt in &state.directories {
            let covered = roots
                .iter()
                .any(|r| r == &dt.source_dir || paths::is_within(r, &dt.source_dir));
            let entry = (dt.source_dir.clone(), WatchMode::from(dt.recursive));
            if !covered && self.fs.is_dir(&dt.source_dir) && !desired.contains(&entry) {
                desired.push(entry);
            }
        }

        for (path, _) in state.trees.iter().filter(|t| !desired.contains(*t)) {
            if let Err(err) = self.tree_watcher.unwatch(path) {
                debug!(path = ?path, error = %err, "failed to unwatch tree");
            }
        }
        let mut active = Vec::with_capacity(desired.len());
        for (path, mode) in desired {
            if state.trees.contains(&(path.clone(), mode)) {
                active.push((path, mode));
                continue;
            }
            match self.tree_watcher.watch(&path, mode) {
                Ok(()) => active.push((path, mode)),
                Err(err) => self
                    .diagnostics
                    .detail(format!("could not watch {}: {err:#}", path.display())),
            }
        }
        state.trees = active;
    }

    fn overlaps_directory_transform(&self, dir: &Path) -> bool {
        self.lock_state().directories.iter().any(|dt| {
            dt.source_dir == dir
                || paths::is_within(&dt.source_dir, dir)
                || paths::is_within(dir, &dt.source_dir)
        })
    }

    fn holds_derived_sources(&self, dir: &Path) -> bool {
        self.lock_state()
            .derived
            .sources()
            .any(|s| paths::is_within(dir, s))
    }

    /// Always taken before `state`, never while holding it.
    fn lock_reconfigure(&self) -> MutexGuard<'_, ()> {
        self.reconfigure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
