//! Process supervisor adapter.
//!
//! Dynamic deployments run as long-lived processes owned by an external
//! process manager, named after the job id. The worker only needs four
//! verbs: make sure the manager is up, remove a stale process, start a new
//! one with a port, stop one during teardown.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use dockyard_core::config::SupervisorConfig;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    Started { stdout: String, stderr: String },
    /// None of the entry-point candidates exist in the work directory.
    EntryMissing { dir: PathBuf, candidates: Vec<String> },
    Failed {
        stdout: String,
        stderr: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    NotFound,
    Failed { reason: String },
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Make sure the manager daemon answers. Never fails; problems are
    /// logged and surface later as a failed start.
    async fn ensure_alive(&self);

    /// Start `name` from `work_dir` with the port injected.
    ///
    /// Never raises: a missing entry point and failures of the manager
    /// itself are reported through the outcome.
    async fn start(&self, name: &str, work_dir: &Path, port: u16) -> StartOutcome;

    /// Stop and forget `name`. An absent process yields `NotFound`.
    async fn stop(&self, name: &str) -> StopOutcome;

    /// Remove any process registered under `name`, ignoring absence.
    async fn remove(&self, name: &str) {
        match self.stop(name).await {
            StopOutcome::Stopped => debug!(%name, "removed existing process"),
            StopOutcome::NotFound => debug!(%name, "no existing process"),
            StopOutcome::Failed { reason } => {
                warn!(%name, %reason, "failed to remove existing process")
            }
        }
    }
}

/// Return the first candidate file present in `dir`.
pub fn find_entry_point(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }

    fn reports_missing(&self) -> bool {
        let text = format!("{}\n{}", self.stdout, self.stderr).to_ascii_lowercase();
        text.contains("not found") || text.contains("doesn't exist")
    }
}

/// Drives the `pm2` CLI.
pub struct Pm2Supervisor {
    bin: PathBuf,
    entry_points: Vec<String>,
    port_env: String,
}

impl Pm2Supervisor {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            bin: config.pm2_bin.clone(),
            entry_points: config.entry_points.clone(),
            port_env: config.port_env.clone(),
        }
    }

    async fn run(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        env: Option<(&str, String)>,
    ) -> Result<CommandOutput, String> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        if let Some((key, value)) = env {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.bin.display()))?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ProcessSupervisor for Pm2Supervisor {
    async fn ensure_alive(&self) {
        match self.run(&["ping"], None, None).await {
            Ok(out) if out.success => {
                debug!("pm2 daemon is running");
                return;
            }
            Ok(out) => warn!(reason = %out.failure_reason(), "pm2 ping failed, resurrecting"),
            Err(reason) => warn!(%reason, "pm2 ping failed, resurrecting"),
        }

        match self.run(&["resurrect"], None, None).await {
            Ok(out) if out.success => info!("pm2 daemon resurrected"),
            Ok(out) => warn!(reason = %out.failure_reason(), "could not resurrect pm2 daemon"),
            Err(reason) => warn!(%reason, "could not resurrect pm2 daemon"),
        }
    }

    async fn start(&self, name: &str, work_dir: &Path, port: u16) -> StartOutcome {
        let Some(entry) = find_entry_point(work_dir, &self.entry_points) else {
            warn!(%name, dir = %work_dir.display(), "no entry point found");
            return StartOutcome::EntryMissing {
                dir: work_dir.to_path_buf(),
                candidates: self.entry_points.clone(),
            };
        };
        let entry = entry.to_string_lossy().into_owned();

        let result = self
            .run(
                &["start", entry.as_str(), "--name", name],
                Some(work_dir),
                Some((self.port_env.as_str(), port.to_string())),
            )
            .await;

        let outcome = match result {
            Ok(out) if out.success => StartOutcome::Started {
                stdout: out.stdout,
                stderr: out.stderr,
            },
            Ok(out) => StartOutcome::Failed {
                reason: out.failure_reason(),
                stdout: out.stdout,
                stderr: out.stderr,
            },
            Err(reason) => StartOutcome::Failed {
                stdout: String::new(),
                stderr: String::new(),
                reason,
            },
        };

        match &outcome {
            StartOutcome::Started { stderr, .. } => {
                if !stderr.trim().is_empty() {
                    warn!(%name, stderr = %stderr.trim(), "pm2 start reported warnings");
                }
                info!(%name, port, entry = %entry, "process started");
            }
            StartOutcome::Failed { reason, .. } => warn!(%name, port, %reason, "process start failed"),
            StartOutcome::EntryMissing { .. } => {}
        }
        outcome
    }

    async fn stop(&self, name: &str) -> StopOutcome {
        match self.run(&["delete", name], None, None).await {
            Ok(out) if out.success => {
                info!(%name, "process stopped and removed");
                StopOutcome::Stopped
            }
            Ok(out) if out.reports_missing() => StopOutcome::NotFound,
            Ok(out) => StopOutcome::Failed {
                reason: out.failure_reason(),
            },
            Err(reason) => StopOutcome::Failed { reason },
        }
    }
}
