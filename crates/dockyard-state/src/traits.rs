use async_trait::async_trait;

use crate::error::StoreResult;

/// Shared key-value store with the atomic primitives the platform relies on.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Atomically create `key` unless it exists. Returns true on creation.
    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Named FIFO queues with a blocking consumer side.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, queue: &str, item: &str) -> StoreResult<()>;

    /// Wait without timeout for the oldest item.
    async fn pop_blocking(&self, queue: &str) -> StoreResult<String>;
}
