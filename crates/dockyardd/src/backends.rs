//! Backend assembly from `dockyard.toml`.

use std::sync::Arc;

use anyhow::Context;
use dockyard_artifacts::ArtifactStore;
use dockyard_core::config::{DockyardConfig, RecordBackend, StoreBackend};
use dockyard_state::{
    CoordinationStore, Coordinator, KvRecords, MemoryStore, RecordStore, RedbRecords, RedisStore,
    WorkQueue,
};
use dockyard_worker::{FilePortAllocator, Pm2Supervisor, PortAllocator, ProcessSupervisor};
use tracing::{info, warn};

/// Everything a subcommand may need, connected once at startup.
pub struct Backends {
    pub config: DockyardConfig,
    pub coordinator: Coordinator,
    pub queue: Arc<dyn WorkQueue>,
    pub records: Arc<dyn RecordStore>,
    pub artifacts: ArtifactStore,
}

impl Backends {
    pub async fn connect(config: DockyardConfig) -> anyhow::Result<Self> {
        let (store, queue): (Arc<dyn CoordinationStore>, Arc<dyn WorkQueue>) =
            match config.store.backend {
                StoreBackend::Redis => {
                    let redis = RedisStore::connect(&config.store.redis_url, config.store.pool_size)
                        .await
                        .with_context(|| format!("connecting to {}", config.store.redis_url))?;
                    (Arc::new(redis.clone()), Arc::new(redis))
                }
                StoreBackend::Memory => {
                    warn!("memory store selected; state is not shared with other processes");
                    let memory = MemoryStore::new();
                    (Arc::new(memory.clone()), Arc::new(memory))
                }
            };

        let records: Arc<dyn RecordStore> = match config.store.records {
            RecordBackend::Kv => Arc::new(KvRecords::new(store.clone())),
            RecordBackend::Redb => {
                let path = &config.store.records_path;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                Arc::new(RedbRecords::open(path)?)
            }
        };

        let artifacts =
            ArtifactStore::from_config(&config.artifacts).context("opening artifact store")?;

        info!(
            store = ?config.store.backend,
            records = ?config.store.records,
            artifacts = ?config.artifacts.backend,
            "backends ready"
        );

        Ok(Self {
            coordinator: Coordinator::new(store),
            queue,
            records,
            artifacts,
            config,
        })
    }

    pub fn supervisor(&self) -> Arc<dyn ProcessSupervisor> {
        Arc::new(Pm2Supervisor::new(&self.config.supervisor))
    }

    pub fn ports(&self) -> Arc<dyn PortAllocator> {
        let worker = &self.config.worker;
        Arc::new(FilePortAllocator::new(
            &worker.lease_file,
            worker.port_low,
            worker.port_high,
        ))
    }
}
