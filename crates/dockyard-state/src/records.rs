//! Job record persistence.
//!
//! Records are written once by the submission path and read by the worker.
//! Two backends: JSON under `job:<id>` in the coordination store (shared by
//! every process that can reach Redis), or a local redb file for
//! single-host setups.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dockyard_core::{DeploymentJob, keys};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::CoordinationStore;

/// Job records keyed by job id.
const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, job: &DeploymentJob) -> StoreResult<()>;

    async fn get(&self, id: &str) -> StoreResult<Option<DeploymentJob>>;

    /// Returns true if a record existed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;

    /// All stored records, ordered by id.
    async fn list(&self) -> StoreResult<Vec<DeploymentJob>>;
}

// ── Coordination-store backend ─────────────────────────────────────

#[derive(Clone)]
pub struct KvRecords {
    store: Arc<dyn CoordinationStore>,
}

impl KvRecords {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordStore for KvRecords {
    async fn create(&self, job: &DeploymentJob) -> StoreResult<()> {
        let value = serde_json::to_string(job).map_err(map_err!(Serialize))?;
        self.store.set(&keys::record_key(&job.id), &value).await?;
        debug!(job_id = %job.id, "job record stored");
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<DeploymentJob>> {
        match self.store.get(&keys::record_key(id)).await? {
            Some(raw) => {
                let job = serde_json::from_str(&raw).map_err(map_err!(Deserialize))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        self.store.delete(&keys::record_key(id)).await
    }

    async fn list(&self) -> StoreResult<Vec<DeploymentJob>> {
        let mut results = Vec::new();
        for key in self.store.keys_with_prefix(keys::RECORD_PREFIX).await? {
            // Deleted between the scan and the read.
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            results.push(serde_json::from_str(&raw).map_err(map_err!(Deserialize))?);
        }
        results.sort_by(|a: &DeploymentJob, b| a.id.cmp(&b.id));
        Ok(results)
    }
}

// ── redb backend ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedbRecords {
    db: Arc<Database>,
}

impl RedbRecords {
    /// Open (or create) a record file at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let records = Self { db: Arc::new(db) };
        records.ensure_tables()?;
        debug!(?path, "record store opened");
        Ok(records)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let records = Self { db: Arc::new(db) };
        records.ensure_tables()?;
        Ok(records)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RedbRecords {
    async fn create(&self, job: &DeploymentJob) -> StoreResult<()> {
        let value = serde_json::to_vec(job).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            table
                .insert(job.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_id = %job.id, "job record stored");
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<DeploymentJob>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let job = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    async fn list(&self) -> StoreResult<Vec<DeploymentJob>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let job: DeploymentJob =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(job);
        }
        Ok(results)
    }
}
