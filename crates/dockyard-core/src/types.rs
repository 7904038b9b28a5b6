//! Domain types shared by the worker, the router, and the submission path.
//!
//! A `DeploymentJob` is written once at submission time and read by the
//! worker. Its progress is tracked separately as a `JobStatus` tag in the
//! coordination store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::keys;

/// Opaque job identifier. Doubles as the subdomain label and the
/// supervised-process name, so it must be a valid DNS label.
pub type JobId = String;

static DOMAIN_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]{3,30}$").expect("static regex"));

/// Generate a fresh job id.
pub fn generate_job_id() -> JobId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Check that an id is usable as a hostname label and process name.
pub fn validate_job_id(id: &str) -> CoreResult<()> {
    let valid = !id.is_empty()
        && id.len() <= 63
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !id.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidJobId(id.to_string()))
    }
}

/// Check a human-chosen domain token against the reservation grammar.
pub fn validate_domain_token(token: &str) -> CoreResult<()> {
    if DOMAIN_TOKEN.is_match(token) {
        Ok(())
    } else {
        Err(CoreError::InvalidDomainToken(token.to_string()))
    }
}

// ── Framework ─────────────────────────────────────────────────────

/// How a project is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Framework {
    /// A directory of files served as-is from the artifact store.
    Static,
    /// A long-running process bound to a leased port.
    Dynamic,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Static => "static",
            Framework::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framework {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "react" => Ok(Framework::Static),
            "dynamic" | "node" => Ok(Framework::Dynamic),
            _ => Err(CoreError::UnknownFramework(s.to_string())),
        }
    }
}

impl TryFrom<String> for Framework {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Framework> for String {
    fn from(value: Framework) -> Self {
        value.as_str().to_string()
    }
}

// ── Deployment job ────────────────────────────────────────────────

/// A request to build and publish one source tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentJob {
    pub id: JobId,
    pub framework: Framework,
    /// Artifact-store prefix holding the uploaded source (`output/<id>`).
    pub source: String,
    /// Environment for the generated `.env` file. `None` values are dropped.
    #[serde(default)]
    pub env: BTreeMap<String, Option<String>>,
    /// Subdirectory of the source tree that holds the project.
    #[serde(default)]
    pub root_dir: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    /// Unix timestamp (seconds) of submission.
    pub created_at: u64,
}

impl DeploymentJob {
    /// A job whose source lives at the conventional `output/<id>` prefix.
    pub fn new(id: impl Into<JobId>, framework: Framework) -> Self {
        let id = id.into();
        Self {
            source: keys::source_prefix(&id),
            id,
            framework,
            env: BTreeMap::new(),
            root_dir: None,
            project_name: None,
            repo_url: None,
            owner: None,
            created_at: epoch_secs(),
        }
    }

    /// Resolve the root-directory hint against a workspace path.
    ///
    /// Empty, `.` and `./` hints mean the workspace itself. Absolute hints
    /// and hints climbing out with `..` are rejected.
    pub fn project_root(&self, workspace: &Path) -> CoreResult<PathBuf> {
        let hint = match self.root_dir.as_deref().map(str::trim) {
            None | Some("") | Some(".") | Some("./") => return Ok(workspace.to_path_buf()),
            Some(hint) => hint,
        };

        let mut root = workspace.to_path_buf();
        for component in Path::new(hint).components() {
            match component {
                Component::Normal(part) => root.push(part),
                Component::CurDir => {}
                _ => return Err(CoreError::InvalidRootDir(hint.to_string())),
            }
        }
        Ok(root)
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Phase tag of a job as stored under `<id>:status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Uploading,
    Deploying,
    /// Terminal failure with a short snake_case reason.
    Failed(String),
    Deployed,
}

impl JobStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        JobStatus::Failed(reason.into())
    }

    /// Failed and Deployed accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed(_) | JobStatus::Deployed)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Uploading => 0,
            JobStatus::Deploying => 1,
            JobStatus::Failed(_) | JobStatus::Deployed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    pub fn can_advance_to(&self, next: &JobStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Coarse form written to the legacy `<id>` key.
    pub fn simple(&self) -> &'static str {
        match self {
            JobStatus::Uploading => "Uploading",
            JobStatus::Deploying => "Deploying",
            JobStatus::Failed(_) => "Failed",
            JobStatus::Deployed => "Deployed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Failed(reason) => write!(f, "Failed:{reason}"),
            other => f.write_str(other.simple()),
        }
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Uploading" => Ok(JobStatus::Uploading),
            "Deploying" => Ok(JobStatus::Deploying),
            "Deployed" => Ok(JobStatus::Deployed),
            "Failed" => Ok(JobStatus::Failed(String::new())),
            other => other
                .strip_prefix("Failed:")
                .map(|reason| JobStatus::Failed(reason.to_string()))
                .ok_or_else(|| CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_labels() {
        let a = generate_job_id();
        let b = generate_job_id();
        assert_ne!(a, b);
        assert!(validate_job_id(&a).is_ok());
    }

    #[test]
    fn job_id_validation() {
        assert!(validate_job_id("abc123").is_ok());
        assert!(validate_job_id("my-app").is_ok());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id("Upper").is_err());
        assert!(validate_job_id("a.b").is_err());
        assert!(validate_job_id("-lead").is_err());
        assert!(validate_job_id(&"x".repeat(64)).is_err());
    }

    #[test]
    fn domain_token_grammar() {
        assert!(validate_domain_token("my-site").is_ok());
        assert!(validate_domain_token("ab").is_err());
        assert!(validate_domain_token("UPPER").is_err());
        assert!(validate_domain_token(&"a".repeat(31)).is_err());
    }

    #[test]
    fn framework_aliases() {
        assert_eq!("React".parse::<Framework>().unwrap(), Framework::Static);
        assert_eq!("node".parse::<Framework>().unwrap(), Framework::Dynamic);
        assert_eq!("STATIC".parse::<Framework>().unwrap(), Framework::Static);
        assert!("python".parse::<Framework>().is_err());
    }

    #[test]
    fn job_json_accepts_framework_aliases() {
        let json = r#"{
            "id": "abc123",
            "framework": "Node",
            "source": "output/abc123",
            "env": {"db_url": "postgres://x", "unset": null},
            "created_at": 1000
        }"#;
        let job: DeploymentJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.framework, Framework::Dynamic);
        assert_eq!(job.env.get("unset"), Some(&None));
        assert!(job.root_dir.is_none());

        let back = serde_json::to_value(&job).unwrap();
        assert_eq!(back["framework"], "dynamic");
    }

    #[test]
    fn new_job_uses_conventional_source_prefix() {
        let job = DeploymentJob::new("abc123", Framework::Static);
        assert_eq!(job.source, "output/abc123");
    }

    #[test]
    fn project_root_resolution() {
        let ws = Path::new("/work/abc");
        let mut job = DeploymentJob::new("abc", Framework::Static);

        assert_eq!(job.project_root(ws).unwrap(), ws);

        job.root_dir = Some("./".into());
        assert_eq!(job.project_root(ws).unwrap(), ws);

        job.root_dir = Some("apps/web".into());
        assert_eq!(job.project_root(ws).unwrap(), ws.join("apps/web"));

        job.root_dir = Some("../escape".into());
        assert!(job.project_root(ws).is_err());

        job.root_dir = Some("/etc".into());
        assert!(job.project_root(ws).is_err());
    }

    #[test]
    fn status_tags_round_trip_through_display() {
        for status in [
            JobStatus::Uploading,
            JobStatus::Deploying,
            JobStatus::Deployed,
            JobStatus::failed("build"),
        ] {
            let tag = status.to_string();
            assert_eq!(tag.parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!(JobStatus::failed("port_exhausted").to_string(), "Failed:port_exhausted");
        assert!("Running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn status_is_monotonic_and_terminal() {
        let uploading = JobStatus::Uploading;
        let deploying = JobStatus::Deploying;

        assert!(uploading.can_advance_to(&deploying));
        assert!(deploying.can_advance_to(&JobStatus::Deployed));
        assert!(deploying.can_advance_to(&JobStatus::failed("build")));
        assert!(!deploying.can_advance_to(&uploading));
        assert!(!JobStatus::Deployed.can_advance_to(&JobStatus::failed("late")));
        assert!(!JobStatus::failed("x").can_advance_to(&JobStatus::Deployed));
    }
}
