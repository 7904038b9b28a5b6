//! Valkey/Redis adapter for the coordination store and work queue.

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{CoordinationStore, WorkQueue};

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 256;

/// Redis-backed store. Clones share the connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build a pool and verify the server answers PING.
    pub async fn connect(url: &str, pool_size: usize) -> StoreResult<Self> {
        let config = Config::from_url(url);
        let pool = config
            .builder()
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        let mut conn = store.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        debug!(%url, pool_size, "redis store connected");
        Ok(store)
    }

    async fn conn(&self) -> StoreResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn
            .del(key)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(deleted > 0)
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        conn.set_nx(key, value)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl WorkQueue for RedisStore {
    async fn push(&self, queue: &str, item: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(queue, item)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn pop_blocking(&self, queue: &str) -> StoreResult<String> {
        let mut conn = self.conn().await?;
        loop {
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(queue)
                .arg(0)
                .query_async(&mut *conn)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            match popped {
                Some((_, item)) => return Ok(item),
                None => warn!(%queue, "BRPOP returned without an item, retrying"),
            }
        }
    }
}
