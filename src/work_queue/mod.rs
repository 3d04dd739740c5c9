//! Distributed work-queue discipline.
//!
//! Three store-backed collections per task: `<task>_todo` (FIFO list of
//! encoded jobs), `<task>_doing` (set of claimed URLs), `<task>_done` (set of
//! finished URLs). A URL moves todo → doing → done on success, doing → todo on
//! recoverable failure while its retry count allows, and is discarded once
//! retries are exhausted. Jobs left in `doing` by a crashed run are rolled
//! back into `todo` by the rank-0 worker at startup.
//!
//! The in-process seen-cache is advisory only; dedup correctness rests on the
//! done/doing membership checks against the store.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::stats::{self, StatsHandle};
use crate::store::Store;

/// Upper bound on the advisory seen-cache.
const SEEN_CACHE_CAP: usize = 1_000_000;

/// One unit of work: a canonical URL plus its requeue count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlJob {
    pub url: String,
    #[serde(default)]
    pub retry: u32,
}

impl UrlJob {
    #[must_use]
    pub fn new(url: impl Into<String>, retry: u32) -> Self {
        Self {
            url: url.into(),
            retry,
        }
    }

    /// Encode for the todo list.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::json!({ "url": self.url, "retry": self.retry }).to_string()
    }

    /// Decode a todo-list entry.
    ///
    /// Accepts the `{url, retry}` object form, a JSON string literal, and the
    /// legacy bare-string form (retry 0).
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        if let Ok(job) = serde_json::from_str::<UrlJob>(raw) {
            return job;
        }
        if let Ok(url) = serde_json::from_str::<String>(raw) {
            return Self::new(url, 0);
        }
        Self::new(raw, 0)
    }
}

/// Canonicalizer applied to every URL crossing the queue boundary.
pub type UrlCleaner = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Handle to one task's queue state in the shared store.
pub struct WorkQueue {
    store: Arc<dyn Store>,
    todo_key: String,
    doing_key: String,
    done_key: String,
    seen: Mutex<LruCache<String, ()>>,
    stats: StatsHandle,
    cleaner: UrlCleaner,
    pop_timeout: Duration,
    max_requeues: u32,
}

impl WorkQueue {
    pub fn new(
        store: Arc<dyn Store>,
        task_name: &str,
        cleaner: UrlCleaner,
        stats: StatsHandle,
        pop_timeout: Duration,
        max_requeues: u32,
    ) -> Self {
        let cap = NonZeroUsize::new(SEEN_CACHE_CAP).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            todo_key: format!("{task_name}_todo"),
            doing_key: format!("{task_name}_doing"),
            done_key: format!("{task_name}_done"),
            seen: Mutex::new(LruCache::new(cap)),
            stats,
            cleaner,
            pop_timeout,
            max_requeues,
        }
    }

    /// Enqueue a URL unless it was already seen, claimed, or finished.
    ///
    /// `front` enqueues at the pop end, so the job is served before the
    /// backlog — used for seed injection and user-priority descents.
    /// Returns true if the job was enqueued.
    pub async fn push(&self, url: &str, retry: u32, front: bool) -> Result<bool, StoreError> {
        let url = (self.cleaner)(url);
        if self.seen.lock().contains(&url) {
            return Ok(false);
        }
        if self.store.set_contains(&self.done_key, &url).await?
            || self.store.set_contains(&self.doing_key, &url).await?
        {
            return Ok(false);
        }
        self.seen.lock().put(url.clone(), ());
        let encoded = UrlJob::new(url, retry).encode();
        if front {
            self.store.list_push_back(&self.todo_key, &encoded).await?;
        } else {
            self.store.list_push_front(&self.todo_key, &encoded).await?;
        }
        self.stats.bump(stats::PUSHED_URLS, 1).await;
        Ok(true)
    }

    /// Claim the next job, blocking up to the pop timeout.
    ///
    /// The popped URL is re-canonicalized (legacy entries may predate the
    /// current cleaner) and inserted into `doing` in the same logical step.
    pub async fn pop(&self) -> Result<Option<UrlJob>, StoreError> {
        let Some(raw) = self
            .store
            .list_pop_back(&self.todo_key, self.pop_timeout)
            .await?
        else {
            return Ok(None);
        };
        let mut job = UrlJob::decode(&raw);
        job.url = (self.cleaner)(&job.url);
        self.store.set_add(&self.doing_key, &job.url).await?;
        Ok(Some(job))
    }

    /// Mark a URL fully processed.
    pub async fn finish(&self, url: &str) -> Result<(), StoreError> {
        self.store.set_add(&self.done_key, url).await?;
        self.store.set_remove(&self.doing_key, url).await?;
        Ok(())
    }

    /// Release a failed claim: requeue with an incremented retry count while
    /// the cap allows, otherwise discard.
    pub async fn fail_recoverable(&self, job: &UrlJob) -> Result<(), StoreError> {
        self.store.set_remove(&self.doing_key, &job.url).await?;
        self.seen.lock().pop(&job.url);
        if job.retry < self.max_requeues {
            self.push(&job.url, job.retry + 1, false).await?;
        } else {
            self.stats.bump(stats::DISCARDED_JOBS, 1).await;
            info!("Discarding {} after {} requeues", job.url, job.retry);
        }
        Ok(())
    }

    /// Move every URL stranded in `doing` by a previous run back into `todo`,
    /// then clear `doing`. Called once by rank 0 before seed injection.
    pub async fn rollback(&self) -> Result<(), StoreError> {
        let stranded = self.store.set_members(&self.doing_key).await?;
        info!(
            "{} jobs in the doing set. Rollback now.",
            stranded.len()
        );
        info!(
            "{} jobs were completed already.",
            self.store.set_len(&self.done_key).await?
        );
        info!(
            "{} jobs were in the todo queue before rollback.",
            self.store.list_len(&self.todo_key).await?
        );
        for url in stranded {
            self.store.set_remove(&self.doing_key, &url).await?;
            self.push(&url, 0, false).await?;
        }
        self.store.delete(&[&self.doing_key]).await?;
        info!(
            "{} jobs were in the todo queue after rollback.",
            self.store.list_len(&self.todo_key).await?
        );
        Ok(())
    }

    /// Drop all three collections. Used when a task starts with `restart`.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store
            .delete(&[&self.todo_key, &self.doing_key, &self.done_key])
            .await?;
        self.seen.lock().clear();
        Ok(())
    }

    pub async fn todo_len(&self) -> Result<u64, StoreError> {
        self.store.list_len(&self.todo_key).await
    }

    pub async fn done_len(&self) -> Result<u64, StoreError> {
        self.store.set_len(&self.done_key).await
    }

    pub async fn doing_len(&self) -> Result<u64, StoreError> {
        self.store.set_len(&self.doing_key).await
    }
}
