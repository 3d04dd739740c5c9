//! In-process store for tests and single-machine runs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::StoreError;

use super::Store;

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
}

/// `Store` implementation backed by process memory.
///
/// Offers the same atomicity guarantees as the real store within one process;
/// durability is out of scope by construction.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Woken on every list push so blocked pops can re-check.
    pushed: Notify,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop_back(&self, key: &str) -> Option<String> {
        self.inner.lock().lists.get_mut(key)?.pop_back()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_front(value.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn list_pop_back(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before the check so a concurrent push between
            // the check and the wait still wakes us.
            let notified = self.pushed.notified();
            if let Some(value) = self.try_pop_back(key) {
                return Ok(Some(value));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.inner.lock().lists.get(key).map_or(0, VecDeque::len) as u64)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .is_some_and(|set| set.contains(member)))
    }

    async fn set_len(&self, key: &str) -> Result<u64, StoreError> {
        Ok(self.inner.lock().sets.get(key).map_or(0, HashSet::len) as u64)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        for key in keys {
            inner.lists.remove(*key);
            inner.sets.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn list_is_fifo_front_to_back() {
        let store = MemoryStore::new();
        store.list_push_front("q", "a").await.unwrap();
        store.list_push_front("q", "b").await.unwrap();
        let first = store
            .list_pop_back("q", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn push_back_is_served_first() {
        let store = MemoryStore::new();
        store.list_push_front("q", "old").await.unwrap();
        store.list_push_back("q", "urgent").await.unwrap();
        let first = store
            .list_pop_back("q", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(first.as_deref(), Some("urgent"));
    }

    #[tokio::test]
    async fn blocking_pop_times_out_on_empty_list() {
        let store = MemoryStore::new();
        let start = Instant::now();
        let popped = store
            .list_pop_back("q", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(popped.is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let store = Arc::new(MemoryStore::new());
        let consumer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.list_pop_back("q", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.list_push_front("q", "v").await.unwrap();
        let popped = consumer.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn sets_track_membership() {
        let store = MemoryStore::new();
        assert!(store.set_add("s", "x").await.unwrap());
        assert!(!store.set_add("s", "x").await.unwrap());
        assert!(store.set_contains("s", "x").await.unwrap());
        assert_eq!(store.set_len("s").await.unwrap(), 1);
        assert!(store.set_remove("s", "x").await.unwrap());
        assert!(!store.set_contains("s", "x").await.unwrap());
    }

    #[tokio::test]
    async fn delete_clears_both_kinds() {
        let store = MemoryStore::new();
        store.list_push_front("k1", "v").await.unwrap();
        store.set_add("k2", "v").await.unwrap();
        store.delete(&["k1", "k2"]).await.unwrap();
        assert_eq!(store.list_len("k1").await.unwrap(), 0);
        assert_eq!(store.set_len("k2").await.unwrap(), 0);
    }
}
