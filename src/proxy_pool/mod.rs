//! Rotating proxy pool with health feedback and quarantine.
//!
//! Endpoints are collected from the configured upstream sources, shuffled
//! into a bounded circulating queue, and handed to fetch workers one at a
//! time. Workers report back a feedback level per attempt; repeat offenders
//! are quarantined in a per-task banned set in the shared store, so bans
//! survive restarts and never penalize other tasks.

pub mod sources;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;

use crate::config::PoolTunables;
use crate::error::StoreError;
use crate::store::Store;

pub use sources::{ProxySource, build_sources, registered_names};

/// Fetch-worker verdict about one proxied attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLevel {
    /// The request succeeded through this proxy.
    Success,
    /// Non-200 response, transport or TLS failure.
    Soft,
    /// Rejection at the proxy layer itself.
    Hard,
}

/// Pool of live proxy endpoints shared by all fetch workers of a task.
pub struct ProxyPool {
    sources: Vec<Box<dyn ProxySource>>,
    store: Arc<dyn Store>,
    banned_key: String,
    tunables: PoolTunables,
    /// Endpoints gathered by the last collect, pre-shuffle.
    live: Mutex<Vec<String>>,
    /// Circulating queue served to workers.
    queue: Mutex<VecDeque<String>>,
    /// Ban list mirror, refreshed on collect, so `add_endpoint` can filter
    /// without a store round-trip per endpoint.
    banned_snapshot: RwLock<HashSet<String>>,
    /// In-process consecutive-failure counters. Not durable.
    retries: DashMap<String, u32>,
    /// Single-flight guard for collect.
    collecting: AtomicBool,
}

impl ProxyPool {
    pub fn new(
        sources: Vec<Box<dyn ProxySource>>,
        store: Arc<dyn Store>,
        banned_key: String,
        tunables: PoolTunables,
    ) -> Self {
        Self {
            sources,
            store,
            banned_key,
            tunables,
            live: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            banned_snapshot: RwLock::new(HashSet::new()),
            retries: DashMap::new(),
            collecting: AtomicBool::new(false),
        }
    }

    /// True when no upstream sources are configured (the fake pool): every
    /// `get` yields a direct connection.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.sources.is_empty()
    }

    /// Drop this task's durable ban list. Called on `restart=true`.
    pub async fn clear_bans(&self) -> Result<(), StoreError> {
        self.store.delete(&[&self.banned_key]).await?;
        self.banned_snapshot.write().clear();
        Ok(())
    }

    /// Populate the live list from every configured source.
    ///
    /// Individual source failures are logged and skipped. Re-entrant callers
    /// short-circuit while another collect is in flight.
    pub async fn collect(&self) -> Result<(), StoreError> {
        if self
            .collecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }
        let result = self.collect_inner().await;
        self.collecting.store(false, Ordering::SeqCst);
        result
    }

    async fn collect_inner(&self) -> Result<(), StoreError> {
        let banned: HashSet<String> = self
            .store
            .set_members(&self.banned_key)
            .await?
            .into_iter()
            .collect();
        *self.banned_snapshot.write() = banned;

        self.live.lock().clear();
        for source in &self.sources {
            match source.collect().await {
                Ok(endpoints) => {
                    let mut added = 0usize;
                    for endpoint in endpoints {
                        if self.add_endpoint(endpoint) {
                            added += 1;
                        }
                    }
                    info!("Collected {added} proxies from {}", source.name());
                }
                Err(err) => {
                    warn!("Proxy source {} failed: {err:#}", source.name());
                }
            }
        }
        Ok(())
    }

    /// Normalize and admit one endpoint into the live list.
    ///
    /// Returns false for endpoints already quarantined.
    fn add_endpoint(&self, endpoint: String) -> bool {
        let endpoint = if endpoint.starts_with("http") {
            endpoint
        } else {
            format!("http://{endpoint}")
        };
        if self.banned_snapshot.read().contains(&endpoint) {
            return false;
        }
        self.live.lock().push(endpoint);
        true
    }

    /// Randomly permute the live list into the circulating queue, `repeat`
    /// times over, up to the queue capacity.
    pub fn shuffle(&self) {
        let mut live = self.live.lock();
        let mut queue = self.queue.lock();
        let mut rng = rand::rng();
        for _ in 0..self.tunables.repeat.max(1) {
            live.shuffle(&mut rng);
            for endpoint in live.iter() {
                if queue.len() >= self.tunables.queue_capacity {
                    return;
                }
                queue.push_back(endpoint.clone());
            }
        }
    }

    /// Next usable endpoint, or `None` for a direct connection.
    ///
    /// Skips quarantined endpoints and those whose local fail counter passed
    /// the skip threshold. A drained queue triggers a recollect; if the
    /// sources still yield nothing the caller falls back to direct.
    pub async fn get(&self) -> Result<Option<String>, StoreError> {
        if self.is_direct() {
            return Ok(None);
        }
        let mut refilled = false;
        loop {
            let candidate = self.queue.lock().pop_front();
            match candidate {
                Some(endpoint) => {
                    let local_fails = self.retries.get(&endpoint).map_or(0, |c| *c);
                    if local_fails > self.tunables.skip_after {
                        continue;
                    }
                    if self.store.set_contains(&self.banned_key, &endpoint).await? {
                        continue;
                    }
                    return Ok(Some(endpoint));
                }
                None if refilled => {
                    warn!("Proxy sources yielded no usable endpoints. Using direct connections.");
                    return Ok(None);
                }
                None => {
                    warn!("No proxy available! Recollect.");
                    self.collect().await?;
                    self.shuffle();
                    refilled = true;
                }
            }
        }
    }

    /// Report the outcome of one attempt through `endpoint`.
    pub async fn feedback(
        &self,
        endpoint: &str,
        level: FeedbackLevel,
    ) -> Result<(), StoreError> {
        match level {
            FeedbackLevel::Success => {
                self.retries.insert(endpoint.to_string(), 0);
                self.requeue(endpoint);
            }
            FeedbackLevel::Soft | FeedbackLevel::Hard => {
                let fails = {
                    let mut entry = self.retries.entry(endpoint.to_string()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                let threshold = if level == FeedbackLevel::Hard {
                    self.tunables.hard_ban_after
                } else {
                    self.tunables.soft_ban_after
                };
                if fails > threshold {
                    self.store.set_add(&self.banned_key, endpoint).await?;
                    self.banned_snapshot.write().insert(endpoint.to_string());
                    info!("Banned proxy {endpoint} after {fails} failures");
                } else {
                    self.requeue(endpoint);
                }
            }
        }
        Ok(())
    }

    fn requeue(&self, endpoint: &str) {
        let mut queue = self.queue.lock();
        if queue.len() < self.tunables.queue_capacity {
            queue.push_back(endpoint.to_string());
        }
    }

    /// Endpoints currently circulating.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Size of the durable ban list.
    pub async fn banned_len(&self) -> Result<u64, StoreError> {
        self.store.set_len(&self.banned_key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pool_with(sources: Vec<Box<dyn ProxySource>>, tunables: PoolTunables) -> ProxyPool {
        ProxyPool::new(
            sources,
            Arc::new(MemoryStore::new()),
            "t@bad_proxy".to_string(),
            tunables,
        )
    }

    #[tokio::test]
    async fn direct_pool_always_yields_none() {
        let pool = pool_with(vec![], PoolTunables::default());
        assert!(pool.is_direct());
        assert_eq!(pool.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn success_feedback_recycles_and_resets() {
        let pool = pool_with(vec![], PoolTunables::default());
        pool.add_endpoint("1.2.3.4:8080".to_string());
        pool.shuffle();
        assert_eq!(pool.queue_len(), 1);

        pool.feedback("http://1.2.3.4:8080", FeedbackLevel::Soft)
            .await
            .unwrap();
        pool.feedback("http://1.2.3.4:8080", FeedbackLevel::Success)
            .await
            .unwrap();
        assert_eq!(*pool.retries.get("http://1.2.3.4:8080").unwrap(), 0);
    }

    #[tokio::test]
    async fn soft_failures_ban_past_threshold() {
        let tunables = PoolTunables {
            soft_ban_after: 2,
            ..PoolTunables::default()
        };
        let pool = pool_with(vec![], tunables);
        for _ in 0..3 {
            pool.feedback("http://p:1", FeedbackLevel::Soft).await.unwrap();
        }
        assert_eq!(pool.banned_len().await.unwrap(), 1);
        assert!(pool.banned_snapshot.read().contains("http://p:1"));
    }

    #[tokio::test]
    async fn hard_failures_ban_sooner_than_soft() {
        let pool = pool_with(vec![], PoolTunables::default());
        for _ in 0..3 {
            pool.feedback("http://p:2", FeedbackLevel::Hard).await.unwrap();
        }
        // Default hard threshold is 2, so three hard failures quarantine.
        assert_eq!(pool.banned_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn banned_endpoints_are_filtered_on_add() {
        let pool = pool_with(vec![], PoolTunables::default());
        pool.banned_snapshot
            .write()
            .insert("http://bad:1".to_string());
        assert!(!pool.add_endpoint("bad:1".to_string()));
        assert!(pool.add_endpoint("good:1".to_string()));
    }

    #[tokio::test]
    async fn scheme_is_prepended_when_missing() {
        let pool = pool_with(vec![], PoolTunables::default());
        pool.add_endpoint("9.9.9.9:3128".to_string());
        assert_eq!(pool.live.lock()[0], "http://9.9.9.9:3128");
    }
}
