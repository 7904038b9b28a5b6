//! Per-framework deployment pipeline.
//!
//! ```text
//! Static:  wipe workspace → mirror source down → [install + build] → mirror output up to dist/<id>/
//! Dynamic: wipe workspace → mirror source down → .env → [install] [build] → lease port
//!          → ensure supervisor → remove stale process → start with PORT
//! ```
//!
//! A static deploy of a project that still holds a port lease also stops
//! the old process and releases the lease.
//!
//! The pipeline never touches coordination keys; the worker turns its
//! result into a terminal status and keeps `<id>:Port` in step.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dockyard_artifacts::ArtifactStore;
use dockyard_core::config::WorkerConfig;
use dockyard_core::{DeploymentJob, Framework, keys, validate_job_id};
use tracing::{debug, info, warn};

use crate::builder::{BuildExecutor, BuildPlan, StepOutput};
use crate::envfile;
use crate::error::{DeployError, DeployResult};
use crate::ports::PortAllocator;
use crate::supervisor::{ProcessSupervisor, StartOutcome};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployed {
    /// Static output published under `dist/<id>/`.
    Published { files: usize },
    /// Dynamic process listening on `port`.
    Running { port: u16 },
}

pub struct Pipeline {
    artifacts: ArtifactStore,
    supervisor: Arc<dyn ProcessSupervisor>,
    ports: Arc<dyn PortAllocator>,
    builder: BuildExecutor,
    config: WorkerConfig,
}

impl Pipeline {
    pub fn new(
        artifacts: ArtifactStore,
        supervisor: Arc<dyn ProcessSupervisor>,
        ports: Arc<dyn PortAllocator>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            builder: BuildExecutor::from_config(&config),
            artifacts,
            supervisor,
            ports,
            config,
        }
    }

    /// Local workspace of a job.
    pub fn workspace(&self, id: &str) -> PathBuf {
        self.config.work_dir.join(id)
    }

    pub async fn run(&self, job: &DeploymentJob) -> DeployResult<Deployed> {
        validate_job_id(&job.id)?;
        let root = self.prepare(job).await?;
        match job.framework {
            Framework::Static => self.deploy_static(job, &root).await,
            Framework::Dynamic => self.deploy_dynamic(job, &root).await,
        }
    }

    /// Fresh workspace with the source tree mirrored in. Returns the
    /// project root inside it.
    async fn prepare(&self, job: &DeploymentJob) -> DeployResult<PathBuf> {
        let workspace = self.workspace(&job.id);
        match tokio::fs::remove_dir_all(&workspace).await {
            Ok(()) => debug!(job_id = %job.id, "stale workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DeployError::workspace(&workspace, e)),
        }
        tokio::fs::create_dir_all(&workspace)
            .await
            .map_err(|e| DeployError::workspace(&workspace, e))?;

        let files = self
            .artifacts
            .mirror_down(&job.source, &workspace)
            .await
            .map_err(DeployError::Download)?;
        info!(job_id = %job.id, source = %job.source, files, "source mirrored");

        let root = job.project_root(&workspace)?;
        if !root.is_dir() {
            return Err(DeployError::workspace(
                &root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "project root missing"),
            ));
        }
        Ok(root)
    }

    async fn deploy_static(&self, job: &DeploymentJob, root: &Path) -> DeployResult<Deployed> {
        let plan = BuildPlan::detect(root)?;
        if plan.build {
            let outputs = self.builder.execute(root, plan).await?;
            log_build_output(&job.id, &outputs);
        } else {
            debug!(job_id = %job.id, "no build step declared");
        }

        let output = match self.find_output(root) {
            Some(dir) => dir,
            // Nothing was built: the tree is already the site.
            None if !plan.build => root.to_path_buf(),
            None => {
                return Err(DeployError::OutputMissing {
                    candidates: self.config.output_dirs.clone(),
                });
            }
        };

        let prefix = keys::publish_prefix(&job.id);
        let files = self
            .artifacts
            .mirror_up(&output, &prefix)
            .await
            .map_err(DeployError::Publish)?;
        info!(job_id = %job.id, %prefix, files, "static output published");

        self.retire_process(&job.id).await;
        Ok(Deployed::Published { files })
    }

    /// A project that still holds a port lease was last deployed as a
    /// process. Stop it and give the port back.
    async fn retire_process(&self, id: &str) {
        match self.ports.release(id) {
            Ok(Some(port)) => {
                self.supervisor.remove(id).await;
                info!(job_id = %id, port, "previous process retired");
            }
            Ok(None) => {}
            Err(e) => warn!(job_id = %id, error = %e, "failed to release previous lease"),
        }
    }

    async fn deploy_dynamic(&self, job: &DeploymentJob, root: &Path) -> DeployResult<Deployed> {
        let env_path =
            envfile::write(root, &self.config.env_file, &job.env).map_err(DeployError::EnvFile)?;
        debug!(job_id = %job.id, path = %env_path.display(), "environment file written");

        let plan = BuildPlan::detect(root)?;
        let outputs = self.builder.execute(root, plan).await?;
        log_build_output(&job.id, &outputs);

        let port = self.ports.allocate(&job.id)?;

        self.supervisor.ensure_alive().await;
        self.supervisor.remove(&job.id).await;
        match self.supervisor.start(&job.id, root, port).await {
            StartOutcome::Started { .. } => {
                info!(job_id = %job.id, port, "dynamic deployment running");
                Ok(Deployed::Running { port })
            }
            StartOutcome::Failed { reason, stderr, .. } => {
                if !stderr.trim().is_empty() {
                    warn!(job_id = %job.id, stderr = %stderr.trim(), "supervisor stderr");
                }
                Err(DeployError::Supervisor(reason))
            }
            StartOutcome::EntryMissing { dir, candidates } => {
                Err(DeployError::EntryMissing { dir, candidates })
            }
        }
    }

    fn find_output(&self, root: &Path) -> Option<PathBuf> {
        self.config
            .output_dirs
            .iter()
            .map(|dir| root.join(dir))
            .find(|path| path.is_dir())
    }
}

fn log_build_output(id: &str, outputs: &[StepOutput]) {
    for step in outputs {
        debug!(
            job_id = %id,
            command = %step.command,
            stdout = %step.stdout.trim(),
            stderr = %step.stderr.trim(),
            "build step output"
        );
    }
}
