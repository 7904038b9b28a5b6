//! Error types for the deployment pipeline.
//!
//! Every variant maps to a short snake_case reason that ends up in the
//! `Failed:<reason>` status tag.

use std::path::PathBuf;

use dockyard_artifacts::ArtifactError;
use dockyard_core::CoreError;
use dockyard_state::StoreError;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("invalid job: {0}")]
    InvalidJob(#[from] CoreError),

    #[error("no job record for {0}")]
    RecordMissing(String),

    #[error("source upload failed: {0}")]
    Upload(#[source] ArtifactError),

    #[error("source download failed: {0}")]
    Download(#[source] ArtifactError),

    #[error("workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write environment file: {0}")]
    EnvFile(#[source] std::io::Error),

    #[error("`{command}` failed (exit code {code:?})")]
    Build {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("no build output found (looked for {candidates:?})")]
    OutputMissing { candidates: Vec<String> },

    #[error("publish failed: {0}")]
    Publish(#[source] ArtifactError),

    #[error("no free port in {low}-{high}")]
    PortExhausted { low: u16, high: u16 },

    #[error("failed to persist port leases to {path}: {source}")]
    Lease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no entry point in {dir} (looked for {candidates:?})")]
    EntryMissing { dir: PathBuf, candidates: Vec<String> },

    #[error("supervisor failure: {0}")]
    Supervisor(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DeployError {
    /// Machine-parsable reason for the `Failed:<reason>` tag.
    pub fn reason(&self) -> &'static str {
        match self {
            DeployError::InvalidJob(_) => "invalid_job",
            DeployError::RecordMissing(_) => "record_missing",
            DeployError::Upload(_) => "upload",
            DeployError::Download(_) => "download",
            DeployError::Workspace { .. } => "workspace",
            DeployError::EnvFile(_) => "env_file",
            DeployError::Build { .. } => "build",
            DeployError::OutputMissing { .. } => "output_missing",
            DeployError::Publish(_) => "publish",
            DeployError::PortExhausted { .. } => "port_exhausted",
            DeployError::Lease { .. } => "lease",
            DeployError::EntryMissing { .. } => "entry_missing",
            DeployError::Supervisor(_) => "supervisor",
            DeployError::Store(_) => "store",
        }
    }

    /// Whether the failure happened after the previous process under the
    /// job id was removed, leaving nothing behind the recorded port.
    pub fn process_removed(&self) -> bool {
        matches!(
            self,
            DeployError::EntryMissing { .. } | DeployError::Supervisor(_)
        )
    }

    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Workspace {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_snake_case_tags() {
        let err = DeployError::PortExhausted {
            low: 4000,
            high: 4000,
        };
        assert_eq!(err.reason(), "port_exhausted");
        assert_eq!(err.to_string(), "no free port in 4000-4000");

        let err = DeployError::Build {
            command: "npm run build".into(),
            code: Some(1),
            stdout: String::new(),
            stderr: "boom".into(),
        };
        assert_eq!(err.reason(), "build");

        assert!(!err.process_removed());

        let err: DeployError = CoreError::InvalidJobId("Bad".into()).into();
        assert_eq!(err.reason(), "invalid_job");

        let err = DeployError::Supervisor("EADDRINUSE".into());
        assert!(err.process_removed());
    }
}
