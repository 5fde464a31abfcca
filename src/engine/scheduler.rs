// src/engine/scheduler.rs

//! Owns the active transform set and turns source events into renders.
//!
//! - [`RenderScheduler::install`] swaps in a new snapshot and rebuilds the
//!   per-source watch registrations.
//! - [`RenderScheduler::on_source_event`] appends one render job to the
//!   FIFO queue of the changed source.
//! - [`RenderScheduler::render_all`] renders every active transform
//!   sequentially.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::model::VariableEnvironment;
use crate::diagnostics::Diagnostics;
use crate::engine::queue::SourceQueues;
use crate::engine::snapshot::{Snapshot, WatchRegistration};
use crate::errors::{Result, RetemplateError};
use crate::fs::FileSystem;
use crate::paths::CanonicalPath;
use crate::render::{TemplateRenderer, WriteOutcome, render_and_write};
use crate::transform::FileTransform;
use crate::types::{FsEventKind, WatchMode};
use crate::watch::WatchBackend;

/// Tally of one batch of renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub written: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl RenderSummary {
    pub fn total(&self) -> usize {
        self.written + self.unchanged + self.failed
    }

    fn record(&mut self, outcome: &Result<WriteOutcome>) {
        match outcome {
            Ok(WriteOutcome::Written) => self.written += 1,
            Ok(WriteOutcome::Unchanged) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }
}

pub struct RenderScheduler {
    fs: Arc<dyn FileSystem>,
    renderer: Arc<dyn TemplateRenderer>,
    watcher: Arc<dyn WatchBackend>,
    diagnostics: Diagnostics,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    queues: SourceQueues,
    /// Source paths currently registered with `watcher`. Also serializes
    /// installs.
    watched: Mutex<Vec<PathBuf>>,
}

impl std::fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderScheduler")
            .field("version", &self.snapshot().version)
            .field("queues", &self.queues.len())
            .finish_non_exhaustive()
    }
}

impl RenderScheduler {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        renderer: Arc<dyn TemplateRenderer>,
        watcher: Arc<dyn WatchBackend>,
        diagnostics: Diagnostics,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            fs,
            renderer,
            watcher,
            diagnostics,
            snapshot_tx,
            queues: SourceQueues::new(),
            watched: Mutex::new(Vec::new()),
        }
    }

    /// The snapshot currently in force.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    /// Observe future snapshot swaps.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn queues(&self) -> &SourceQueues {
        &self.queues
    }

    /// Replace the active transform set and variables, then rebuild every
    /// per-source watch: all previous registrations are dropped and exactly
    /// one is made per distinct source.
    pub fn install(
        &self,
        vars: Arc<VariableEnvironment>,
        transforms: Vec<FileTransform>,
    ) -> Arc<Snapshot> {
        let mut watched = lock(&self.watched);

        let version = self.snapshot().version + 1;
        let snapshot = Arc::new(Snapshot::new(version, vars, transforms));
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));

        for path in watched.drain(..) {
            if let Err(err) = self.watcher.unwatch(&path) {
                debug!(path = ?path, error = %err, "failed to unwatch source");
            }
        }
        for registration in snapshot.registrations() {
            match self.watcher.watch(&registration.path, WatchMode::NonRecursive) {
                Ok(()) => watched.push(registration.path.clone()),
                Err(err) => self.diagnostics.warn(format!(
                    "could not watch {}: {err:#}",
                    registration.path.display()
                )),
            }
        }

        info!(
            version,
            transforms = snapshot.transforms.len(),
            sources = watched.len(),
            "installed transform snapshot"
        );
        snapshot
    }

    /// React to a watched source changing.
    ///
    /// Created and changed sources queue one job rendering every transform
    /// sharing the source, in list order. Deletion is not a render trigger.
    /// The returned receiver resolves when the job has finished.
    pub fn on_source_event(
        &self,
        path: &Path,
        kind: FsEventKind,
    ) -> Option<oneshot::Receiver<RenderSummary>> {
        if kind == FsEventKind::Deleted {
            debug!(path = ?path, "source deleted; not a render trigger");
            return None;
        }
        let snapshot = self.snapshot();
        let Some(registration) = snapshot.registration(path) else {
            debug!(path = ?path, "event for a source with no transforms");
            return None;
        };
        Some(self.enqueue(registration, Arc::clone(&snapshot.vars)))
    }

    /// Queue one render of `registration` behind anything already pending
    /// for its source.
    pub fn enqueue(
        &self,
        registration: Arc<WatchRegistration>,
        vars: Arc<VariableEnvironment>,
    ) -> oneshot::Receiver<RenderSummary> {
        let (done_tx, done_rx) = oneshot::channel();
        let fs = Arc::clone(&self.fs);
        let renderer = Arc::clone(&self.renderer);
        let diagnostics = self.diagnostics.clone();
        let key = CanonicalPath::new(&registration.path);

        debug!(source = %key, transforms = registration.transforms.len(), "queueing render job");
        self.queues.enqueue(
            key,
            Box::pin(async move {
                let mut summary = RenderSummary::default();
                for transform in &registration.transforms {
                    let outcome = render_one(
                        Arc::clone(&fs),
                        Arc::clone(&renderer),
                        transform.clone(),
                        Arc::clone(&vars),
                    )
                    .await;
                    summary.record(&outcome);
                    report(&diagnostics, transform, outcome);
                }
                let _ = done_tx.send(summary);
            }),
        );
        done_rx
    }

    /// Render every active transform sequentially, in list order.
    pub async fn render_all(&self) -> RenderSummary {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            self.diagnostics.notice("no transforms configured");
            return RenderSummary::default();
        }

        let mut summary = RenderSummary::default();
        for transform in snapshot.transforms.iter() {
            let outcome = render_one(
                Arc::clone(&self.fs),
                Arc::clone(&self.renderer),
                transform.clone(),
                Arc::clone(&snapshot.vars),
            )
            .await;
            summary.record(&outcome);
            report(&self.diagnostics, transform, outcome);
        }

        self.diagnostics.notice(format!(
            "rendered {} transform(s): {} written, {} unchanged, {} failed",
            summary.total(),
            summary.written,
            summary.unchanged,
            summary.failed
        ));
        summary
    }

    /// Forget queue bookkeeping idle for longer than `timeout`.
    pub fn reap_stale(&self, timeout: Duration) -> Vec<CanonicalPath> {
        let reaped = self.queues.reap_stale(timeout);
        for key in &reaped {
            self.diagnostics
                .line(format!("forgot stale render queue for {key}"));
        }
        reaped
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render and write one transform on the blocking pool.
async fn render_one(
    fs: Arc<dyn FileSystem>,
    renderer: Arc<dyn TemplateRenderer>,
    transform: FileTransform,
    vars: Arc<VariableEnvironment>,
) -> Result<WriteOutcome> {
    tokio::task::spawn_blocking(move || render_and_write(&*fs, &*renderer, &transform, &vars))
        .await
        .map_err(|e| RetemplateError::Other(anyhow::anyhow!("render task failed: {e}")))?
}

fn report(diagnostics: &Diagnostics, transform: &FileTransform, outcome: Result<WriteOutcome>) {
    match outcome {
        Ok(WriteOutcome::Written) => {
            diagnostics.line(format!("rendered {}", transform.target.display()))
        }
        Ok(WriteOutcome::Unchanged) => {
            diagnostics.detail(format!("unchanged {}", transform.target.display()))
        }
        Err(err) => {
            warn!(transform = %transform, error = %err, "render failed");
            diagnostics.report(&err);
        }
    }
}
