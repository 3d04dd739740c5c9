//! Backing key/value store.
//!
//! The store is the only cross-worker source of truth: the todo list, the
//! doing/done sets, and the banned-proxy set all live here. The trait mirrors
//! the primitive set the queue discipline needs — atomic list push/pop with a
//! blocking pop, set membership operations, and key deletion. `RedisStore`
//! backs production runs; `MemoryStore` backs tests and single-process runs.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Atomic list/set primitives required by the work queue and proxy pool.
#[async_trait]
pub trait Store: Send + Sync {
    /// Push onto the head of a list (the far end from the consumer).
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Push onto the tail of a list (served by the next pop).
    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Pop from the tail of a list, blocking up to `timeout`.
    ///
    /// Returns `None` on timeout.
    async fn list_pop_back(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    async fn list_len(&self, key: &str) -> Result<u64, StoreError>;

    /// Add a member to a set. Returns true if it was newly inserted.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member from a set. Returns true if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_len(&self, key: &str) -> Result<u64, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Delete the given keys, whatever their type.
    async fn delete(&self, keys: &[&str]) -> Result<(), StoreError>;
}
