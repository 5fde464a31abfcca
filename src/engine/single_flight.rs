// src/engine/single_flight.rs

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

/// Collapses concurrent calls into one in-flight operation.
///
/// The first caller runs the operation; anyone arriving while it is still
/// running waits for, and receives a clone of, that same result. Once it
/// completes the next call starts a new run.
#[derive(Debug)]
pub struct SingleFlight<T> {
    name: &'static str,
    inflight: Mutex<Option<watch::Receiver<Option<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inflight: Mutex::new(None),
        }
    }

    pub async fn run<F, Fut>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let tx = loop {
            let mut rx = {
                let mut slot = self.lock();
                match slot.as_ref() {
                    Some(rx) => rx.clone(),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        *slot = Some(rx);
                        break tx;
                    }
                }
            };

            debug!(operation = self.name, "joining in-flight operation");
            let outcome = rx.wait_for(Option::is_some).await.map(|v| v.clone());
            match outcome {
                Ok(Some(value)) => return value,
                Ok(None) => {}
                Err(_) => {
                    // The leader was dropped before finishing.
                    let mut slot = self.lock();
                    if slot.as_ref().is_some_and(|cur| cur.same_channel(&rx)) {
                        *slot = None;
                    }
                }
            }
        };

        let guard = ClearOnDrop { flight: self };
        let value = op().await;
        drop(guard);
        tx.send_replace(Some(value.clone()));
        value
    }

    fn lock(&self) -> MutexGuard<'_, Option<watch::Receiver<Option<T>>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frees the in-flight slot when the leader finishes or is cancelled.
struct ClearOnDrop<'a, T> {
    flight: &'a SingleFlight<T>,
}

impl<T> Drop for ClearOnDrop<'_, T> {
    fn drop(&mut self) {
        *self
            .flight
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
