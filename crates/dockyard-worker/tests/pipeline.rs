#![cfg(unix)]
//! Worker and pipeline behavior against in-memory backends and a
//! recording supervisor.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dockyard_artifacts::ArtifactStore;
use dockyard_core::config::{SupervisorConfig, WorkerConfig};
use dockyard_core::{DeploymentJob, Framework, JobStatus};
use dockyard_state::{
    CoordinationStore, Coordinator, KvRecords, MemoryStore, RecordStore, WorkQueue,
};
use dockyard_worker::supervisor::find_entry_point;
use dockyard_worker::{
    FilePortAllocator, Pipeline, PortAllocator, ProcessSupervisor, StartOutcome, StopOutcome,
    Teardown, Worker,
};
use tokio::sync::watch;

#[derive(Default)]
struct RecordingSupervisor {
    calls: Mutex<Vec<String>>,
    running: Mutex<Vec<String>>,
    fail_start: bool,
}

impl RecordingSupervisor {
    fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProcessSupervisor for RecordingSupervisor {
    async fn ensure_alive(&self) {
        self.record("ensure_alive".into());
    }

    async fn start(&self, name: &str, work_dir: &Path, port: u16) -> StartOutcome {
        let candidates = SupervisorConfig::default().entry_points;
        if find_entry_point(work_dir, &candidates).is_none() {
            return StartOutcome::EntryMissing {
                dir: work_dir.to_path_buf(),
                candidates,
            };
        }
        self.record(format!("start {name} {port}"));
        if self.fail_start {
            return StartOutcome::Failed {
                stdout: String::new(),
                stderr: "EADDRINUSE".into(),
                reason: "EADDRINUSE".into(),
            };
        }
        self.running.lock().unwrap().push(name.to_string());
        StartOutcome::Started {
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    async fn stop(&self, name: &str) -> StopOutcome {
        self.record(format!("stop {name}"));
        let mut running = self.running.lock().unwrap();
        match running.iter().position(|n| n == name) {
            Some(index) => {
                running.remove(index);
                StopOutcome::Stopped
            }
            None => StopOutcome::NotFound,
        }
    }
}

struct Harness {
    dir: tempfile::TempDir,
    store: MemoryStore,
    artifacts: ArtifactStore,
    supervisor: Arc<RecordingSupervisor>,
    ports: Arc<FilePortAllocator>,
    records: Arc<KvRecords>,
    config: WorkerConfig,
}

impl Harness {
    fn new() -> Self {
        Self::with(|_| {}, RecordingSupervisor::default())
    }

    fn with(tweak: impl FnOnce(&mut WorkerConfig), supervisor: RecordingSupervisor) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WorkerConfig {
            work_dir: dir.path().join("work"),
            lease_file: dir.path().join("ports.json"),
            install_command: vec!["sh".into(), "-c".into(), "touch installed.txt".into()],
            build_command: vec![
                "sh".into(),
                "-c".into(),
                "mkdir -p dist && cp page.html dist/index.html".into(),
            ],
            ..WorkerConfig::default()
        };
        tweak(&mut config);

        let store = MemoryStore::new();
        let records = Arc::new(KvRecords::new(Arc::new(store.clone())));
        let ports = Arc::new(FilePortAllocator::new(
            &config.lease_file,
            config.port_low,
            config.port_high,
        ));
        Self {
            dir,
            store,
            artifacts: ArtifactStore::in_memory(),
            supervisor: Arc::new(supervisor),
            ports,
            records,
            config,
        }
    }

    fn coordinator(&self) -> Coordinator {
        Coordinator::new(Arc::new(self.store.clone()))
    }

    fn worker(&self) -> Worker {
        let pipeline = Pipeline::new(
            self.artifacts.clone(),
            self.supervisor.clone(),
            self.ports.clone(),
            self.config.clone(),
        );
        Worker::new(
            Arc::new(self.store.clone()),
            "upload-queue",
            self.coordinator(),
            self.records.clone(),
            pipeline,
        )
        .with_backoff(Duration::from_millis(10))
    }

    fn teardown(&self) -> Teardown {
        Teardown::new(
            self.coordinator(),
            self.records.clone(),
            self.artifacts.clone(),
            self.supervisor.clone(),
            self.ports.clone(),
        )
    }

    async fn seed(&self, job: &DeploymentJob, files: &[(&str, &str)]) {
        for (name, body) in files {
            let key = format!("{}/{name}", job.source);
            self.artifacts
                .put(&key, Bytes::copy_from_slice(body.as_bytes()))
                .await
                .unwrap();
        }
        self.records.create(job).await.unwrap();
    }

    async fn status(&self, id: &str) -> Option<String> {
        self.store.get(&format!("{id}:status")).await.unwrap()
    }

    /// Replace the uploaded source and record and reset the status, as a
    /// resubmission does.
    async fn resubmit(&self, job: &DeploymentJob, files: &[(&str, &str)]) {
        self.artifacts.delete_prefix(&job.source).await.unwrap();
        self.seed(job, files).await;
        self.coordinator()
            .write_status(&job.id, &JobStatus::Uploading)
            .await
            .unwrap();
    }
}

const NODE_APP: &[(&str, &str)] = &[
    ("package.json", r#"{"name": "api", "scripts": {"start": "node index.js"}}"#),
    ("index.js", "require('http').createServer().listen(process.env.PORT)"),
];

const REACT_APP: &[(&str, &str)] = &[
    ("package.json", r#"{"name": "site", "scripts": {"build": "vite build"}}"#),
    ("page.html", "<h1>hello</h1>"),
];

#[tokio::test]
async fn dynamic_job_runs_and_records_port() {
    let h = Harness::new();
    let mut job = DeploymentJob::new("abc123", Framework::Dynamic);
    job.env.insert("db_url".into(), Some("postgres://db".into()));
    job.env.insert("unused".into(), None);
    h.seed(&job, NODE_APP).await;

    let status = h.worker().process("abc123").await.unwrap();
    assert_eq!(status, JobStatus::Deployed);
    assert_eq!(h.status("abc123").await.as_deref(), Some("Deployed"));
    assert_eq!(h.store.get("abc123").await.unwrap().as_deref(), Some("Deployed"));

    let port = h.coordinator().port("abc123").await.unwrap().unwrap();
    assert!((4000..=6000).contains(&port));
    assert_eq!(
        h.supervisor.calls(),
        vec![
            "ensure_alive".to_string(),
            "stop abc123".to_string(),
            format!("start abc123 {port}"),
        ]
    );

    let ws = h.dir.path().join("work/abc123");
    assert_eq!(std::fs::read_to_string(ws.join(".env")).unwrap(), "DB_URL=postgres://db");
    assert!(ws.join("installed.txt").is_file());
}

#[tokio::test]
async fn redeploy_reuses_the_lease_and_replaces_the_process() {
    let h = Harness::new();
    let job = DeploymentJob::new("abc123", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;

    let worker = h.worker();
    worker.process("abc123").await.unwrap();
    let first = h.coordinator().port("abc123").await.unwrap();
    h.resubmit(&job, NODE_APP).await;
    worker.process("abc123").await.unwrap();
    let second = h.coordinator().port("abc123").await.unwrap();

    assert_eq!(first, second);
    let calls = h.supervisor.calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("start")).count(), 2);
    assert_eq!(calls[4], "stop abc123");
}

#[tokio::test]
async fn redelivered_finished_job_is_skipped() {
    let h = Harness::new();
    let job = DeploymentJob::new("abc123", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;

    let worker = h.worker();
    assert_eq!(worker.process("abc123").await.unwrap(), JobStatus::Deployed);
    let calls = h.supervisor.calls().len();

    assert_eq!(worker.process("abc123").await.unwrap(), JobStatus::Deployed);
    assert_eq!(h.supervisor.calls().len(), calls);

    let failed = DeploymentJob::new("ghost1", Framework::Static);
    h.coordinator()
        .write_status(&failed.id, &JobStatus::failed("build"))
        .await
        .unwrap();
    h.seed(&failed, REACT_APP).await;
    assert_eq!(
        worker.process("ghost1").await.unwrap(),
        JobStatus::failed("build")
    );
    assert!(h.artifacts.list("dist/ghost1").await.unwrap().is_empty());
}

#[tokio::test]
async fn dynamic_to_static_redeploy_retires_the_process() {
    let h = Harness::new();
    let job = DeploymentJob::new("abc123", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;
    let worker = h.worker();
    worker.process("abc123").await.unwrap();
    let port = h.coordinator().port("abc123").await.unwrap();
    assert!(port.is_some());

    let job = DeploymentJob::new("abc123", Framework::Static);
    h.resubmit(&job, REACT_APP).await;
    assert_eq!(worker.process("abc123").await.unwrap(), JobStatus::Deployed);

    assert_eq!(h.coordinator().port("abc123").await.unwrap(), None);
    assert_eq!(h.ports.release("abc123").unwrap(), None);
    assert_eq!(h.supervisor.calls().last().unwrap(), "stop abc123");
    assert_eq!(
        h.artifacts.list("dist/abc123").await.unwrap(),
        vec!["dist/abc123/index.html"]
    );
}

#[tokio::test]
async fn failed_redeploy_clears_the_stale_port() {
    let h = Harness::new();
    let job = DeploymentJob::new("abc123", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;
    let worker = h.worker();
    worker.process("abc123").await.unwrap();
    assert!(h.coordinator().port("abc123").await.unwrap().is_some());

    h.resubmit(&job, &[("package.json", "{}"), ("lib/app.js", "")])
        .await;
    assert_eq!(
        worker.process("abc123").await.unwrap(),
        JobStatus::failed("entry_missing")
    );
    assert_eq!(h.coordinator().port("abc123").await.unwrap(), None);
    assert_eq!(h.supervisor.calls().last().unwrap(), "stop abc123");
}

#[tokio::test]
async fn static_job_builds_and_publishes_output() {
    let h = Harness::new();
    let job = DeploymentJob::new("site1", Framework::Static);
    h.seed(&job, REACT_APP).await;

    let status = h.worker().process("site1").await.unwrap();
    assert_eq!(status, JobStatus::Deployed);

    assert_eq!(
        h.artifacts.list("dist/site1").await.unwrap(),
        vec!["dist/site1/index.html"]
    );
    let body = h.artifacts.get("dist/site1/index.html").await.unwrap();
    assert_eq!(&body[..], b"<h1>hello</h1>");
    assert!(h.coordinator().port("site1").await.unwrap().is_none());
    assert!(h.supervisor.calls().is_empty());
}

#[tokio::test]
async fn static_job_without_build_step_publishes_tree() {
    let h = Harness::new();
    let job = DeploymentJob::new("plain", Framework::Static);
    h.seed(&job, &[("index.html", "hi"), ("css/site.css", "body{}")]).await;

    assert_eq!(h.worker().process("plain").await.unwrap(), JobStatus::Deployed);
    assert_eq!(
        h.artifacts.list("dist/plain").await.unwrap(),
        vec!["dist/plain/css/site.css", "dist/plain/index.html"]
    );
    // No package.json: nothing installed.
    assert!(!h.dir.path().join("work/plain/installed.txt").exists());
}

#[tokio::test]
async fn root_dir_hint_selects_subproject() {
    let h = Harness::new();
    let mut job = DeploymentJob::new("mono", Framework::Static);
    job.root_dir = Some("apps/web".into());
    h.seed(
        &job,
        &[
            ("apps/web/package.json", r#"{"scripts": {"build": "x"}}"#),
            ("apps/web/page.html", "web"),
            ("README.md", "root"),
        ],
    )
    .await;

    assert_eq!(h.worker().process("mono").await.unwrap(), JobStatus::Deployed);
    assert_eq!(
        h.artifacts.list("dist/mono").await.unwrap(),
        vec!["dist/mono/index.html"]
    );
}

#[tokio::test]
async fn missing_record_fails_the_job() {
    let h = Harness::new();
    let status = h.worker().process("ghost1").await.unwrap();
    assert_eq!(status, JobStatus::failed("record_missing"));
    assert_eq!(h.status("ghost1").await.as_deref(), Some("Failed:record_missing"));
}

#[tokio::test]
async fn phase_failures_map_to_reasons() {
    // Build step fails.
    let h = Harness::with(
        |c| c.build_command = vec!["sh".into(), "-c".into(), "exit 1".into()],
        RecordingSupervisor::default(),
    );
    let job = DeploymentJob::new("broken", Framework::Static);
    h.seed(&job, REACT_APP).await;
    assert_eq!(
        h.worker().process("broken").await.unwrap(),
        JobStatus::failed("build")
    );

    // Build succeeds but produces nothing.
    let h = Harness::with(
        |c| c.build_command = vec!["sh".into(), "-c".into(), "true".into()],
        RecordingSupervisor::default(),
    );
    h.seed(&job, REACT_APP).await;
    assert_eq!(
        h.worker().process("broken").await.unwrap(),
        JobStatus::failed("output_missing")
    );

    // Escaping root dir.
    let h = Harness::new();
    let mut job = DeploymentJob::new("escape", Framework::Static);
    job.root_dir = Some("../other".into());
    h.seed(&job, REACT_APP).await;
    assert_eq!(
        h.worker().process("escape").await.unwrap(),
        JobStatus::failed("invalid_job")
    );

    // No entry point.
    let h = Harness::new();
    let job = DeploymentJob::new("noentry", Framework::Dynamic);
    h.seed(&job, &[("package.json", "{}"), ("lib/app.js", "")]).await;
    assert_eq!(
        h.worker().process("noentry").await.unwrap(),
        JobStatus::failed("entry_missing")
    );

    // Environment value that would split into two lines.
    let h = Harness::new();
    let mut job = DeploymentJob::new("badenv", Framework::Dynamic);
    job.env.insert("token".into(), Some("abc\nPORT=80".into()));
    h.seed(&job, NODE_APP).await;
    assert_eq!(
        h.worker().process("badenv").await.unwrap(),
        JobStatus::failed("env_file")
    );
    assert!(!h.dir.path().join("work/badenv/.env").exists());

    // Supervisor refuses to start.
    let h = Harness::with(|_| {}, RecordingSupervisor::failing());
    let job = DeploymentJob::new("refused", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;
    assert_eq!(
        h.worker().process("refused").await.unwrap(),
        JobStatus::failed("supervisor")
    );
    assert!(h.coordinator().port("refused").await.unwrap().is_none());
}

#[tokio::test]
async fn exhausted_port_range_fails_dynamic_job() {
    let h = Harness::with(
        |c| {
            c.port_low = 4500;
            c.port_high = 4500;
        },
        RecordingSupervisor::default(),
    );
    h.ports.allocate("someone-else").unwrap();

    let job = DeploymentJob::new("late", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;
    assert_eq!(
        h.worker().process("late").await.unwrap(),
        JobStatus::failed("port_exhausted")
    );
    assert!(!h.supervisor.calls().iter().any(|c| c.starts_with("start")));
}

#[tokio::test]
async fn loop_drains_queue_until_shutdown() {
    let h = Harness::new();
    let a = DeploymentJob::new("job-a", Framework::Dynamic);
    let b = DeploymentJob::new("job-b", Framework::Static);
    h.seed(&a, NODE_APP).await;
    h.seed(&b, REACT_APP).await;
    h.store.push("upload-queue", "job-a").await.unwrap();
    h.store.push("upload-queue", "missing-job").await.unwrap();
    h.store.push("upload-queue", "job-b").await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = Arc::new(h.worker());
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(shutdown_rx).await })
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let done = h.status("job-b").await.is_some_and(|s| s != "Deploying");
        if done || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(h.status("job-a").await.as_deref(), Some("Deployed"));
    assert_eq!(h.status("missing-job").await.as_deref(), Some("Failed:record_missing"));
    assert_eq!(h.status("job-b").await.as_deref(), Some("Deployed"));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn teardown_is_complete_and_idempotent() {
    let h = Harness::new();
    let job = DeploymentJob::new("abc123", Framework::Dynamic);
    h.seed(&job, NODE_APP).await;
    h.worker().process("abc123").await.unwrap();
    let coordinator = h.coordinator();
    coordinator.reserve_domain("my-api", "abc123").await.unwrap();
    coordinator.reserve_domain("keep-me", "other").await.unwrap();
    let port = coordinator.port("abc123").await.unwrap();

    let report = h.teardown().run("abc123").await.unwrap();
    assert!(report.record_found);
    assert_eq!(report.process, Some(StopOutcome::Stopped));
    assert_eq!(report.released_port, port);
    assert_eq!(report.domains_released, 1);

    assert!(h.status("abc123").await.is_none());
    assert!(coordinator.port("abc123").await.unwrap().is_none());
    assert!(coordinator.resolve_domain("my-api").await.unwrap().is_none());
    assert!(coordinator.resolve_domain("keep-me").await.unwrap().is_some());
    assert!(h.records.get("abc123").await.unwrap().is_none());

    let again = h.teardown().run("abc123").await.unwrap();
    assert!(!again.record_found);
    assert_eq!(again.process, Some(StopOutcome::NotFound));
    assert_eq!(again.released_port, None);
}

#[tokio::test]
async fn teardown_of_static_site_deletes_published_output() {
    let h = Harness::new();
    let job = DeploymentJob::new("site1", Framework::Static);
    h.seed(&job, REACT_APP).await;
    h.worker().process("site1").await.unwrap();

    let report = h.teardown().run("site1").await.unwrap();
    assert_eq!(report.published_files_deleted, 1);
    assert!(report.process.is_none());
    assert!(h.artifacts.list("dist/site1").await.unwrap().is_empty());
}
