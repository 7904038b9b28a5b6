//! The worker loop: block on the queue, run one job, write its status.

use std::sync::Arc;
use std::time::Duration;

use dockyard_core::{JobStatus, validate_job_id};
use dockyard_state::{Coordinator, RecordStore, WorkQueue};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{DeployError, DeployResult};
use crate::pipeline::{Deployed, Pipeline};

pub struct Worker {
    queue: Arc<dyn WorkQueue>,
    queue_name: String,
    coordinator: Coordinator,
    records: Arc<dyn RecordStore>,
    pipeline: Pipeline,
    backoff: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        queue_name: impl Into<String>,
        coordinator: Coordinator,
        records: Arc<dyn RecordStore>,
        pipeline: Pipeline,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            coordinator,
            records,
            pipeline,
            backoff: Duration::from_secs(5),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Consume jobs until `shutdown` flips. A job in progress always runs
    /// to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(queue = %self.queue_name, "worker loop starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let popped = tokio::select! {
                popped = self.queue.pop_blocking(&self.queue_name) => popped,
                _ = shutdown.changed() => break,
            };

            let result = match popped {
                Ok(id) => self.process(&id).await.map(|_| ()),
                Err(e) => Err(DeployError::Store(e)),
            };

            if let Err(e) = result {
                error!(error = %e, backoff_secs = self.backoff.as_secs(), "worker iteration failed, backing off");
                tokio::select! {
                    _ = tokio::time::sleep(self.backoff) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        info!(queue = %self.queue_name, "worker loop stopped");
    }

    /// Run one job to a terminal status and return it.
    ///
    /// Pipeline failures become `Failed:<reason>`; only failures to read the
    /// record or write status escape as errors.
    pub async fn process(&self, id: &str) -> DeployResult<JobStatus> {
        info!(job_id = %id, "job dequeued");

        if let Err(e) = validate_job_id(id) {
            return self.reject(id, DeployError::InvalidJob(e)).await;
        }

        // A redelivered id that already finished is left alone; a resubmit
        // resets it to Uploading first.
        if let Some(current) = self.coordinator.status(id).await? {
            if !current.can_advance_to(&JobStatus::Deploying) {
                warn!(job_id = %id, status = %current, "job already finished, skipping");
                return Ok(current);
            }
        }

        let Some(job) = self.records.get(id).await? else {
            return self.reject(id, DeployError::RecordMissing(id.to_string())).await;
        };

        self.coordinator.write_status(id, &JobStatus::Deploying).await?;
        debug!(job_id = %id, framework = %job.framework, "deploying");

        let status = match self.pipeline.run(&job).await {
            Ok(Deployed::Running { port }) => match self.coordinator.set_port(id, port).await {
                Ok(()) => JobStatus::Deployed,
                Err(e) => {
                    error!(job_id = %id, port, error = %e, "failed to record port");
                    JobStatus::failed("store")
                }
            },
            Ok(Deployed::Published { .. }) => match self.coordinator.clear_port(id).await {
                Ok(cleared) => {
                    if cleared {
                        info!(job_id = %id, "now served as static files");
                    }
                    JobStatus::Deployed
                }
                Err(e) => {
                    error!(job_id = %id, error = %e, "failed to clear port");
                    JobStatus::failed("store")
                }
            },
            Err(e) => {
                if let DeployError::Build { stderr, .. } = &e {
                    warn!(job_id = %id, stderr = %stderr.trim(), "build output");
                }
                if e.process_removed() {
                    if let Err(err) = self.coordinator.clear_port(id).await {
                        warn!(job_id = %id, error = %err, "failed to clear stale port");
                    }
                }
                error!(job_id = %id, reason = e.reason(), error = %e, "deployment failed");
                JobStatus::failed(e.reason())
            }
        };

        self.finish(id, status).await
    }

    async fn reject(&self, id: &str, err: DeployError) -> DeployResult<JobStatus> {
        warn!(job_id = %id, error = %err, "rejecting job");
        self.finish(id, JobStatus::failed(err.reason())).await
    }

    async fn finish(&self, id: &str, status: JobStatus) -> DeployResult<JobStatus> {
        self.coordinator.write_status(id, &status).await?;
        info!(job_id = %id, %status, "job finished");
        Ok(status)
    }
}
