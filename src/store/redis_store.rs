//! Redis-backed store.
//!
//! Maps the trait onto LPUSH / RPUSH / BRPOP / LLEN / SADD / SREM /
//! SISMEMBER / SCARD / SMEMBERS / DEL through a multiplexed connection
//! manager, so one client serves every worker task.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::error::StoreError;

use super::Store;

/// `Store` implementation talking to a Redis endpoint.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://localhost:6379/`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(StoreError::from)?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn list_push_front(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.rpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn list_pop_back(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let popped: Option<(String, String)> = conn.brpop(key, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        Ok(conn.llen(key).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        Ok(conn.sismember(key, member).await?)
    }

    async fn set_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        Ok(conn.scard(key).await?)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        Ok(conn.smembers(key).await?)
    }

    async fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }
}
