//! Build executor: runs the install and build commands of a project.

use std::path::Path;
use std::process::Stdio;

use dockyard_core::config::WorkerConfig;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};

/// What a project asks to have run before it can be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildPlan {
    /// A `package.json` exists, so dependencies are installed.
    pub install: bool,
    /// `package.json` declares `scripts.build`.
    pub build: bool,
}

#[derive(Deserialize)]
struct PackageManifest {
    #[serde(default)]
    scripts: std::collections::BTreeMap<String, serde_json::Value>,
}

impl BuildPlan {
    /// Inspect `package.json` in the project root.
    pub fn detect(root: &Path) -> DeployResult<Self> {
        let manifest_path = root.join("package.json");
        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(DeployError::workspace(manifest_path, e)),
        };

        let manifest: PackageManifest =
            serde_json::from_str(&content).map_err(|e| DeployError::Build {
                command: "read package.json".to_string(),
                code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            })?;
        Ok(Self {
            install: true,
            build: manifest.scripts.contains_key("build"),
        })
    }
}

/// Captured output of a successful step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct BuildExecutor {
    install: Vec<String>,
    build: Vec<String>,
}

impl BuildExecutor {
    pub fn new(install: Vec<String>, build: Vec<String>) -> Self {
        Self { install, build }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.install_command.clone(), config.build_command.clone())
    }

    /// Run the steps the plan calls for, stopping at the first failure.
    /// Returns the output of every step that ran.
    pub async fn execute(&self, root: &Path, plan: BuildPlan) -> DeployResult<Vec<StepOutput>> {
        let mut outputs = Vec::new();
        if plan.install {
            outputs.push(self.run_step(&self.install, root).await?);
        }
        if plan.build {
            outputs.push(self.run_step(&self.build, root).await?);
        } else {
            debug!(root = %root.display(), "no build script, skipping build step");
        }
        Ok(outputs)
    }

    /// Run one command in `cwd`. An empty command is a no-op.
    pub async fn run_step(&self, command: &[String], cwd: &Path) -> DeployResult<StepOutput> {
        let Some((program, args)) = command.split_first() else {
            return Ok(StepOutput {
                command: String::new(),
                stdout: String::new(),
                stderr: String::new(),
            });
        };
        let shown = command.join(" ");
        info!(command = %shown, cwd = %cwd.display(), "running build step");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DeployError::Build {
                command: shown.clone(),
                code: None,
                stdout: String::new(),
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(DeployError::Build {
                command: shown,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        debug!(command = %shown, stdout_len = stdout.len(), "build step finished");
        Ok(StepOutput {
            command: shown,
            stdout,
            stderr,
        })
    }
}
