// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::controller::Engine;
use crate::engine::queue::{REAP_INTERVAL, STALE_TIMEOUT};
use crate::errors::Result;
use crate::watch::{FsEvent, WatchOrigin};

/// Events flowing into the runtime from watchers, signals and callers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A filesystem notification from either watch backend.
    Fs(FsEvent),
    /// Reload configuration now.
    ReloadRequested,
    /// Manual "render all".
    RenderAllRequested,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Runtime tuning.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// How often stale queue bookkeeping is swept.
    pub reap_interval: Duration,
    /// Idle time after which a source's queue entry is forgotten.
    pub stale_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            reap_interval: REAP_INTERVAL,
            stale_timeout: STALE_TIMEOUT,
        }
    }
}

/// Drives the engine in response to `RuntimeEvent`s.
///
/// Anything that may take a while (reloads, rescans, render-all) runs in
/// its own task so the loop keeps draining events; per-source ordering is
/// the scheduler's job, not the loop's.
pub struct Runtime {
    engine: Arc<Engine>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        engine: Arc<Engine>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            engine,
            event_rx,
            options,
        }
    }

    /// Main event loop. Returns once shutdown is requested or every sender
    /// is gone.
    pub async fn run(mut self) -> Result<()> {
        info!("retemplate runtime started");

        let mut reaper = tokio::time::interval_at(
            Instant::now() + self.options.reap_interval,
            self.options.reap_interval,
        );
        reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        info!("runtime event channel closed; exiting");
                        break;
                    };
                    debug!(?event, "runtime received event");
                    if !self.dispatch(event) {
                        info!("shutdown requested; stopping runtime");
                        break;
                    }
                }
                _ = reaper.tick() => {
                    self.engine.scheduler().reap_stale(self.options.stale_timeout);
                }
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Handle one event. Returns `false` when the loop should stop.
    fn dispatch(&self, event: RuntimeEvent) -> bool {
        match event {
            // Queued inline so events on one source keep their arrival order.
            RuntimeEvent::Fs(fs_event) if fs_event.origin == WatchOrigin::Source => {
                self.engine
                    .scheduler()
                    .on_source_event(&fs_event.path, fs_event.kind);
            }
            RuntimeEvent::Fs(fs_event) => {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move { engine.handle_event(fs_event).await });
            }
            RuntimeEvent::ReloadRequested => {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    engine.reload().await;
                });
            }
            RuntimeEvent::RenderAllRequested => {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    engine.render_all().await;
                });
            }
            RuntimeEvent::ShutdownRequested => return false,
        }
        true
    }
}

/// Pump watcher notifications into the runtime channel.
pub fn forward_fs_events(
    mut fs_rx: mpsc::UnboundedReceiver<FsEvent>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = fs_rx.recv().await {
            if runtime_tx.send(RuntimeEvent::Fs(event)).await.is_err() {
                break;
            }
        }
        debug!("watcher forwarding loop finished");
    })
}
