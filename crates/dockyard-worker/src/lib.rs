//! dockyard-worker — turns queued job ids into running deployments.
//!
//! # Architecture
//!
//! ```text
//! Worker (queue loop, status writes)
//!   └── Pipeline (per-framework steps)
//!         ├── ArtifactStore     mirror source down / output up
//!         ├── BuildExecutor     install + build commands
//!         ├── PortAllocator     leased ports for dynamic jobs
//!         └── ProcessSupervisor pm2 start / stop
//! Submitter (upload + record + enqueue)
//! Teardown  (stop, release, delete)
//! ```

pub mod builder;
pub mod envfile;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod submit;
pub mod supervisor;
pub mod teardown;
pub mod worker;

pub use builder::{BuildExecutor, BuildPlan};
pub use error::{DeployError, DeployResult};
pub use pipeline::{Deployed, Pipeline};
pub use ports::{FilePortAllocator, PortAllocator};
pub use submit::Submitter;
pub use supervisor::{Pm2Supervisor, ProcessSupervisor, StartOutcome, StopOutcome};
pub use teardown::{Teardown, TeardownReport};
pub use worker::Worker;
