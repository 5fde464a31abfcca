// src/engine/queue.rs

//! Per-source FIFO job queues.
//!
//! Each canonical source path gets its own unbounded channel drained by one
//! worker task, so jobs for the same source run strictly in enqueue order
//! while different sources run concurrently.
//!
//! Bookkeeping for a source is forgotten once nothing has been enqueued on
//! it for longer than the stale timeout. Forgetting drops the queue's
//! sender: the old worker finishes whatever it already holds (it is never
//! cancelled) and the next job for that source starts a fresh worker instead
//! of waiting behind work that may never settle.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::paths::CanonicalPath;

/// A unit of work queued on one source.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Entries older than this are reaped.
pub const STALE_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the runtime sweeps for stale entries.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct QueueEntry {
    tx: mpsc::UnboundedSender<Job>,
    last_enqueued: Instant,
}

#[derive(Debug, Default)]
pub struct SourceQueues {
    entries: Mutex<HashMap<CanonicalPath, QueueEntry>>,
}

impl SourceQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `job` to the queue for `key`, starting a worker if needed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, key: CanonicalPath, job: Job) {
        let mut entries = self.lock();
        let now = Instant::now();

        let job = match entries.get_mut(&key) {
            Some(entry) => match entry.tx.send(job) {
                Ok(()) => {
                    entry.last_enqueued = now;
                    return;
                }
                // The worker is gone (it panicked); start over.
                Err(mpsc::error::SendError(job)) => {
                    warn!(source = %key, "queue worker stopped unexpectedly; restarting");
                    job
                }
            },
            None => job,
        };

        let tx = spawn_worker(key.clone());
        if tx.send(job).is_err() {
            warn!(source = %key, "new queue worker rejected its first job");
        }
        entries.insert(
            key,
            QueueEntry {
                tx,
                last_enqueued: now,
            },
        );
    }

    /// Forget every entry whose last enqueue is older than `timeout`.
    /// Returns the keys that were forgotten.
    pub fn reap_stale(&self, timeout: Duration) -> Vec<CanonicalPath> {
        let now = Instant::now();
        let mut reaped = Vec::new();
        self.lock().retain(|key, entry| {
            let stale = now.saturating_duration_since(entry.last_enqueued) > timeout;
            if stale {
                reaped.push(key.clone());
            }
            !stale
        });
        reaped.sort();
        if !reaped.is_empty() {
            debug!(count = reaped.len(), "reaped stale queue entries");
        }
        reaped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &CanonicalPath) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CanonicalPath, QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_worker(key: CanonicalPath) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        debug!(source = %key, "queue worker started");
        while let Some(job) = rx.recv().await {
            job.await;
        }
        debug!(source = %key, "queue worker finished (queue forgotten)");
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn key(p: &str) -> CanonicalPath {
        CanonicalPath::new(Path::new(p))
    }

    #[tokio::test]
    async fn jobs_on_one_key_run_in_order() {
        let queues = SourceQueues::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = oneshot::channel();

        for i in 0..3 {
            let log = Arc::clone(&log);
            queues.enqueue(
                key("/w/a"),
                Box::pin(async move {
                    // Later jobs sleep less; order must still hold.
                    tokio::time::sleep(Duration::from_millis(30 - i * 10)).await;
                    log.lock().unwrap().push(i);
                }),
            );
        }
        queues.enqueue(
            key("/w/a"),
            Box::pin(async move {
                let _ = done_tx.send(());
            }),
        );

        done_rx.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(queues.len(), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_wait_for_each_other() {
        let queues = SourceQueues::new();
        let (block_tx, block_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel();

        queues.enqueue(
            key("/w/slow"),
            Box::pin(async move {
                let _ = block_rx.await;
            }),
        );
        queues.enqueue(
            key("/w/fast"),
            Box::pin(async move {
                let _ = done_tx.send(());
            }),
        );

        tokio::time::timeout(Duration::from_secs(2), done_rx)
            .await
            .unwrap()
            .unwrap();
        drop(block_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_forgotten_and_recreated() {
        let queues = SourceQueues::new();
        queues.enqueue(key("/w/hung"), Box::pin(std::future::pending::<()>()));
        queues.enqueue(key("/w/fresh"), Box::pin(async {}));

        tokio::time::advance(Duration::from_secs(20)).await;
        queues.enqueue(key("/w/fresh"), Box::pin(async {}));
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(queues.reap_stale(STALE_TIMEOUT), vec![key("/w/hung")]);
        assert!(!queues.contains(&key("/w/hung")));
        assert!(queues.contains(&key("/w/fresh")));

        // A new job on the reaped key runs even though the old worker hangs.
        let (done_tx, done_rx) = oneshot::channel();
        queues.enqueue(
            key("/w/hung"),
            Box::pin(async move {
                let _ = done_tx.send(());
            }),
        );
        done_rx.await.unwrap();
    }
}
