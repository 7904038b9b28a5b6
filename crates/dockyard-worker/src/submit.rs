//! Job submission: upload the source, persist the record, enqueue the id.

use std::path::Path;
use std::sync::Arc;

use dockyard_artifacts::ArtifactStore;
use dockyard_core::{DeploymentJob, JobStatus, validate_job_id};
use dockyard_state::{Coordinator, RecordStore, WorkQueue};
use tracing::{error, info};

use crate::error::{DeployError, DeployResult};

pub struct Submitter {
    coordinator: Coordinator,
    records: Arc<dyn RecordStore>,
    queue: Arc<dyn WorkQueue>,
    queue_name: String,
    artifacts: ArtifactStore,
}

impl Submitter {
    pub fn new(
        coordinator: Coordinator,
        records: Arc<dyn RecordStore>,
        queue: Arc<dyn WorkQueue>,
        queue_name: impl Into<String>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            coordinator,
            records,
            queue,
            queue_name: queue_name.into(),
            artifacts,
        }
    }

    /// Submit `job`, first uploading `source_dir` to the job's source
    /// prefix when given. Resubmitting an existing id redeploys it.
    pub async fn submit(&self, job: &DeploymentJob, source_dir: Option<&Path>) -> DeployResult<()> {
        validate_job_id(&job.id)?;
        self.coordinator
            .write_status(&job.id, &JobStatus::Uploading)
            .await?;

        if let Err(e) = self.enqueue(job, source_dir).await {
            error!(job_id = %job.id, error = %e, "submission failed");
            self.coordinator
                .write_status(&job.id, &JobStatus::failed(e.reason()))
                .await?;
            return Err(e);
        }

        info!(job_id = %job.id, framework = %job.framework, queue = %self.queue_name, "job submitted");
        Ok(())
    }

    async fn enqueue(&self, job: &DeploymentJob, source_dir: Option<&Path>) -> DeployResult<()> {
        if let Some(dir) = source_dir {
            let files = self
                .artifacts
                .mirror_up(dir, &job.source)
                .await
                .map_err(DeployError::Upload)?;
            info!(job_id = %job.id, source = %job.source, files, "source uploaded");
        }
        self.records.create(job).await?;
        self.queue.push(&self.queue_name, &job.id).await?;
        Ok(())
    }
}
