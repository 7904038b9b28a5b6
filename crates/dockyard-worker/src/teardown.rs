//! Teardown: remove everything a deployment left behind.
//!
//! Every step is best-effort and idempotent. Running teardown twice, or on
//! an id whose record is already gone, succeeds.

use std::sync::Arc;

use dockyard_artifacts::ArtifactStore;
use dockyard_core::{Framework, keys};
use dockyard_state::{Coordinator, RecordStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::DeployResult;
use crate::ports::PortAllocator;
use crate::supervisor::{ProcessSupervisor, StopOutcome};

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub id: String,
    pub record_found: bool,
    pub published_files_deleted: usize,
    pub process: Option<StopOutcome>,
    pub released_port: Option<u16>,
    pub domains_released: usize,
}

pub struct Teardown {
    coordinator: Coordinator,
    records: Arc<dyn RecordStore>,
    artifacts: ArtifactStore,
    supervisor: Arc<dyn ProcessSupervisor>,
    ports: Arc<dyn PortAllocator>,
}

impl Teardown {
    pub fn new(
        coordinator: Coordinator,
        records: Arc<dyn RecordStore>,
        artifacts: ArtifactStore,
        supervisor: Arc<dyn ProcessSupervisor>,
        ports: Arc<dyn PortAllocator>,
    ) -> Self {
        Self {
            coordinator,
            records,
            artifacts,
            supervisor,
            ports,
        }
    }

    pub async fn run(&self, id: &str) -> DeployResult<TeardownReport> {
        let record = self.records.get(id).await?;
        let framework = record.as_ref().map(|job| job.framework);
        let mut report = TeardownReport {
            id: id.to_string(),
            record_found: record.is_some(),
            ..TeardownReport::default()
        };

        // Without a record both kinds of leftovers are cleaned.
        if framework != Some(Framework::Dynamic) {
            match self.artifacts.delete_prefix(&keys::publish_prefix(id)).await {
                Ok(count) => report.published_files_deleted = count,
                Err(e) => warn!(job_id = %id, error = %e, "failed to delete published output"),
            }
        }
        if framework != Some(Framework::Static) {
            let outcome = self.supervisor.stop(id).await;
            if let StopOutcome::Failed { reason } = &outcome {
                warn!(job_id = %id, %reason, "failed to stop process");
            }
            report.process = Some(outcome);
            match self.ports.release(id) {
                Ok(port) => report.released_port = port,
                Err(e) => warn!(job_id = %id, error = %e, "failed to release port lease"),
            }
        }

        match self.coordinator.release_domains(id).await {
            Ok(count) => report.domains_released = count,
            Err(e) => warn!(job_id = %id, error = %e, "failed to release domains"),
        }
        self.coordinator.clear_job(id).await?;
        self.records.delete(id).await?;

        info!(
            job_id = %id,
            record_found = report.record_found,
            files = report.published_files_deleted,
            domains = report.domains_released,
            "deployment torn down"
        );
        Ok(report)
    }
}
