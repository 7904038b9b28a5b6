//! dockyardd — the Dockyard daemon and operator CLI.
//!
//! One binary, several roles:
//! - `worker`: consume the work queue, build and publish deployments
//! - `router`: the edge router in front of every deployment
//! - `submit`, `status`, `jobs`, `check-domain`, `reserve-domain`, `teardown`:
//!   operator commands
//!
//! # Usage
//!
//! ```text
//! dockyardd --config /etc/dockyard/dockyard.toml worker
//! dockyardd router --listen 0.0.0.0:9000
//! dockyardd submit --framework dynamic --source ./app
//! ```

mod backends;
mod daemon;
mod ops;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dockyard_core::Framework;
use dockyard_core::config::DockyardConfig;
use tracing::{info, warn};

use crate::backends::Backends;

#[derive(Parser)]
#[command(name = "dockyardd", about = "Dockyard deployment daemon")]
struct Cli {
    /// Path to dockyard.toml. Defaults apply when the file is absent.
    #[arg(long, global = true, default_value = "dockyard.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the deployment worker loop.
    Worker,

    /// Run the edge router.
    Router {
        /// Listen address, overriding `[router].listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Upload a source tree and enqueue a deployment.
    Submit {
        #[arg(long)]
        framework: Framework,

        /// Local source directory to upload to `output/<id>`.
        #[arg(long)]
        source: Option<PathBuf>,

        /// Environment entry for the generated `.env` (`KEY=value`, or
        /// `KEY=` to leave it out). Repeatable.
        #[arg(long = "env", value_parser = ops::parse_env_pair)]
        env: Vec<(String, Option<String>)>,

        /// Subdirectory of the source tree holding the project.
        #[arg(long)]
        root_dir: Option<String>,

        /// Reuse an existing job id to redeploy it.
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        project_name: Option<String>,

        #[arg(long)]
        repo_url: Option<String>,

        #[arg(long)]
        owner: Option<String>,
    },

    /// Show the status, port, and domains of a job.
    Status { id: String },

    /// List every job record with its current status.
    Jobs,

    /// Check whether a custom domain token is free to reserve.
    CheckDomain { token: String },

    /// Reserve a custom domain token for a project.
    ReserveDomain { token: String, project: String },

    /// Remove a deployment: process, port lease, published files, domains.
    Teardown { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;
    let backends = Backends::connect(config).await?;

    match cli.command {
        Command::Worker => daemon::run_worker(backends).await,
        Command::Router { listen } => daemon::run_router(backends, listen).await,
        Command::Submit {
            framework,
            source,
            env,
            root_dir,
            id,
            project_name,
            repo_url,
            owner,
        } => {
            let request = ops::SubmitRequest {
                framework,
                source,
                env,
                root_dir,
                id,
                project_name,
                repo_url,
                owner,
            };
            ops::submit(&backends, request).await
        }
        Command::Status { id } => ops::status(&backends, &id).await,
        Command::Jobs => ops::jobs(&backends).await,
        Command::CheckDomain { token } => ops::check_domain(&backends, &token).await,
        Command::ReserveDomain { token, project } => {
            ops::reserve_domain(&backends, &token, &project).await
        }
        Command::Teardown { id } => ops::teardown(&backends, &id).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dockyard=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<DockyardConfig> {
    if path.exists() {
        let config = DockyardConfig::from_file(path)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
        Ok(DockyardConfig::default())
    }
}
