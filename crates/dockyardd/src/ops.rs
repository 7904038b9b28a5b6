//! One-shot operator commands. Results go to stdout as JSON.

use std::path::PathBuf;

use dockyard_core::{DeploymentJob, Framework, generate_job_id};
use dockyard_worker::{Submitter, Teardown};
use serde::Serialize;
use tracing::info;

use crate::backends::Backends;

pub struct SubmitRequest {
    pub framework: Framework,
    pub source: Option<PathBuf>,
    pub env: Vec<(String, Option<String>)>,
    pub root_dir: Option<String>,
    pub id: Option<String>,
    pub project_name: Option<String>,
    pub repo_url: Option<String>,
    pub owner: Option<String>,
}

/// Parse `KEY=value`. An empty value means the key is left out of `.env`.
pub fn parse_env_pair(raw: &str) -> Result<(String, Option<String>), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    let value = (!value.is_empty()).then(|| value.to_string());
    Ok((key.to_string(), value))
}

pub async fn submit(backends: &Backends, request: SubmitRequest) -> anyhow::Result<()> {
    let id = request.id.unwrap_or_else(generate_job_id);
    let mut job = DeploymentJob::new(id, request.framework);
    job.env = request.env.into_iter().collect();
    job.root_dir = request.root_dir;
    job.project_name = request.project_name;
    job.repo_url = request.repo_url;
    job.owner = request.owner;

    let submitter = Submitter::new(
        backends.coordinator.clone(),
        backends.records.clone(),
        backends.queue.clone(),
        backends.config.store.queue.clone(),
        backends.artifacts.clone(),
    );
    submitter.submit(&job, request.source.as_deref()).await?;

    print_json(&serde_json::json!({
        "id": job.id,
        "framework": job.framework,
        "source": job.source,
        "queue": backends.config.store.queue,
    }))
}

#[derive(Serialize)]
struct StatusReport {
    id: String,
    status: Option<String>,
    port: Option<u16>,
    domains: Vec<String>,
}

pub async fn status(backends: &Backends, id: &str) -> anyhow::Result<()> {
    let coordinator = &backends.coordinator;
    let report = StatusReport {
        id: id.to_string(),
        status: coordinator.status(id).await?.map(|s| s.to_string()),
        port: coordinator.port(id).await?,
        domains: coordinator.domains_for(id).await?,
    };
    print_json(&report)
}

#[derive(Serialize)]
struct JobSummary {
    id: String,
    framework: Framework,
    status: Option<String>,
    project_name: Option<String>,
    owner: Option<String>,
    created_at: u64,
}

pub async fn jobs(backends: &Backends) -> anyhow::Result<()> {
    print_json(&job_summaries(backends).await?)
}

async fn job_summaries(backends: &Backends) -> anyhow::Result<Vec<JobSummary>> {
    let mut summaries = Vec::new();
    for job in backends.records.list().await? {
        let status = backends.coordinator.status(&job.id).await?;
        summaries.push(JobSummary {
            status: status.map(|s| s.to_string()),
            id: job.id,
            framework: job.framework,
            project_name: job.project_name,
            owner: job.owner,
            created_at: job.created_at,
        });
    }
    Ok(summaries)
}

pub async fn check_domain(backends: &Backends, token: &str) -> anyhow::Result<()> {
    let available = backends.coordinator.is_domain_available(token).await?;
    print_json(&serde_json::json!({ "token": token, "available": available }))
}

pub async fn reserve_domain(backends: &Backends, token: &str, project: &str) -> anyhow::Result<()> {
    let reserved = backends.coordinator.reserve_domain(token, project).await?;
    if !reserved {
        let owner = backends.coordinator.resolve_domain(token).await?;
        anyhow::bail!(
            "domain {token:?} is already reserved by {}",
            owner.as_deref().unwrap_or("another project")
        );
    }
    info!(%token, %project, "domain reserved");
    print_json(&serde_json::json!({ "token": token, "project": project }))
}

pub async fn teardown(backends: &Backends, id: &str) -> anyhow::Result<()> {
    let teardown = Teardown::new(
        backends.coordinator.clone(),
        backends.records.clone(),
        backends.artifacts.clone(),
        backends.supervisor(),
        backends.ports(),
    );
    let report = teardown.run(id).await?;
    print_json(&report)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::JobStatus;
    use dockyard_core::config::{ArtifactBackend, DockyardConfig, StoreBackend};

    async fn memory_backends() -> Backends {
        let mut config = DockyardConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.artifacts.backend = ArtifactBackend::Memory;
        Backends::connect(config).await.unwrap()
    }

    #[tokio::test]
    async fn job_summaries_join_records_and_status() {
        let backends = memory_backends().await;
        let mut site = DeploymentJob::new("site1", Framework::Static);
        site.owner = Some("ops".into());
        backends.records.create(&site).await.unwrap();
        backends
            .records
            .create(&DeploymentJob::new("api01", Framework::Dynamic))
            .await
            .unwrap();
        backends
            .coordinator
            .write_status("site1", &JobStatus::Deployed)
            .await
            .unwrap();

        let summaries = job_summaries(&backends).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "api01");
        assert_eq!(summaries[0].status, None);
        assert_eq!(summaries[1].id, "site1");
        assert_eq!(summaries[1].status.as_deref(), Some("Deployed"));
        assert_eq!(summaries[1].owner.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn check_domain_reports_reserved_tokens() {
        let backends = memory_backends().await;
        backends
            .coordinator
            .reserve_domain("my-api", "abc123")
            .await
            .unwrap();
        assert!(check_domain(&backends, "free-one").await.is_ok());
        assert!(!backends.coordinator.is_domain_available("my-api").await.unwrap());
    }

    #[test]
    fn env_pairs() {
        assert_eq!(
            parse_env_pair("db_url=postgres://db?x=1").unwrap(),
            ("db_url".to_string(), Some("postgres://db?x=1".to_string()))
        );
        assert_eq!(parse_env_pair("EMPTY=").unwrap(), ("EMPTY".to_string(), None));
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());
    }
}
