//! In-process coordination store and work queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::error::StoreResult;
use crate::traits::{CoordinationStore, WorkQueue};

/// Ephemeral store for tests and single-process setups.
///
/// Clones share the same underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, String>>>,
    queues: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items waiting in a queue.
    pub async fn queue_len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    async fn try_pop(&self, queue: &str) -> Option<String> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(queue).and_then(VecDeque::pop_back)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut data = self.data.write().await;
        Ok(data.remove(key).is_some())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut data = self.data.write().await;
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl WorkQueue for MemoryStore {
    async fn push(&self, queue: &str, item: &str) -> StoreResult<()> {
        {
            let mut queues = self.queues.lock().await;
            queues
                .entry(queue.to_string())
                .or_default()
                .push_front(item.to_string());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop_blocking(&self, queue: &str) -> StoreResult<String> {
        loop {
            // Register before checking so a push in between is not missed.
            let notified = self.notify.notified();
            if let Some(item) = self.try_pop(queue).await {
                return Ok(item);
            }
            notified.await;
        }
    }
}
