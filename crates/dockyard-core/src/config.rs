//! dockyard.toml configuration parser.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working single-host setup talking to a local Redis.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::keys;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DockyardConfig {
    pub store: StoreConfig,
    pub artifacts: ArtifactsConfig,
    pub worker: WorkerConfig,
    pub supervisor: SupervisorConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    /// Process-local; only useful for tests and single-process demos.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordBackend {
    /// Job records stored as JSON under `job:<id>` in the coordination store.
    Kv,
    /// Job records stored in a local redb file.
    Redb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub pool_size: usize,
    pub queue: String,
    pub records: RecordBackend,
    pub records_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 8,
            queue: keys::WORK_QUEUE.to_string(),
            records: RecordBackend::Kv,
            records_path: PathBuf::from("/var/lib/dockyard/records.redb"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactBackend {
    S3,
    Local,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub backend: ArtifactBackend,
    /// Bucket name (S3). Credentials come from the `AWS_*` environment.
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Root directory for the local backend.
    pub path: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            backend: ArtifactBackend::S3,
            bucket: "devdep".to_string(),
            endpoint: None,
            region: None,
            path: PathBuf::from("/var/lib/dockyard/artifacts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Parent directory of per-job workspaces.
    pub work_dir: PathBuf,
    /// JSON file holding port leases.
    pub lease_file: PathBuf,
    pub port_low: u16,
    pub port_high: u16,
    /// Delay before the loop resumes after an escaped error.
    pub backoff_secs: u64,
    pub install_command: Vec<String>,
    pub build_command: Vec<String>,
    /// Build output directories, tried in order.
    pub output_dirs: Vec<String>,
    pub env_file: String,
}

impl WorkerConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/var/lib/dockyard/workspaces"),
            lease_file: PathBuf::from("/var/lib/dockyard/ports.json"),
            port_low: 4000,
            port_high: 6000,
            backoff_secs: 5,
            install_command: vec!["npm".into(), "install".into()],
            build_command: vec!["npm".into(), "run".into(), "build".into()],
            output_dirs: vec!["dist".into(), "build".into()],
            env_file: ".env".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub pm2_bin: PathBuf,
    /// Entry-point candidates, checked in order.
    pub entry_points: Vec<String>,
    /// Environment variable carrying the leased port.
    pub port_env: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pm2_bin: PathBuf::from("pm2"),
            entry_points: vec![
                "index.js".into(),
                "server.js".into(),
                "app.js".into(),
                "main.js".into(),
            ],
            port_env: "PORT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub listen: SocketAddr,
    /// Host that supervised processes listen on.
    pub upstream_host: String,
    /// Path prefix exempt from the default-document rewrite.
    pub static_prefix: String,
    pub default_document: String,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl RouterConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
            upstream_host: "127.0.0.1".to_string(),
            static_prefix: "/static".to_string(),
            default_document: "/index.html".to_string(),
            cache_capacity: 500,
            cache_ttl_secs: 60 * 60,
        }
    }
}

impl DockyardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
