//! Task counters.
//!
//! Workers report increments over a bounded channel; a single aggregator task
//! folds them into a shared snapshot read by the monitor. Counters are not
//! durable: a restart starts from zero, only the store-backed queues persist.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const PUSHED_URLS: &str = "pushed_urls";
pub const SUCCESS: &str = "success";
pub const ERROR: &str = "error";
pub const DISCARDED_JOBS: &str = "discarded_jobs";

/// One counter increment.
pub type StatsDelta = (String, i64);

/// Cloneable producer handle for counter increments.
#[derive(Clone)]
pub struct StatsHandle {
    tx: mpsc::Sender<StatsDelta>,
}

impl StatsHandle {
    pub async fn bump(&self, key: &str, delta: i64) {
        let _ = self.tx.send((key.to_string(), delta)).await;
    }
}

/// Read-only view of the aggregated counters.
#[derive(Clone, Default)]
pub struct StatsSnapshot {
    inner: Arc<Mutex<HashMap<String, i64>>>,
}

impl StatsSnapshot {
    #[must_use]
    pub fn get(&self, key: &str) -> i64 {
        self.inner.lock().get(key).copied().unwrap_or(0)
    }

    /// Copy of every counter, for the stats line and `Site::monitor`.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, i64> {
        self.inner.lock().clone()
    }

    fn apply(&self, key: String, delta: i64) {
        *self.inner.lock().entry(key).or_insert(0) += delta;
    }
}

/// Build the stats channel and spawn the aggregator task.
///
/// The task exits when every `StatsHandle` clone has been dropped.
pub fn spawn_aggregator(
    capacity: usize,
) -> (StatsHandle, StatsSnapshot, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<StatsDelta>(capacity);
    let snapshot = StatsSnapshot::default();
    let sink = snapshot.clone();
    let task = tokio::spawn(async move {
        while let Some((key, delta)) = rx.recv().await {
            sink.apply(key, delta);
        }
    });
    (StatsHandle { tx }, snapshot, task)
}
