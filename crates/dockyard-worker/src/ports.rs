//! Port leases for dynamic deployments.
//!
//! Leases live in a JSON file so they survive worker restarts. The file is
//! an array whose elements are either bare port numbers (anonymous leases)
//! or `{"project": "<id>", "port": N}` objects. Anything unreadable is
//! treated as "no leases": a corrupt file never blocks allocation.
//!
//! Leases are released only by teardown. A crash between persisting a
//! lease and starting the process leaks that port.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DeployError, DeployResult};

pub trait PortAllocator: Send + Sync {
    /// Lease a port for `project`. A project that already holds a lease
    /// gets the same port back.
    fn allocate(&self, project: &str) -> DeployResult<u16>;

    /// Drop the lease held by `project`. Returns the released port.
    fn release(&self, project: &str) -> DeployResult<Option<u16>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum LeaseEntry {
    Anonymous(i64),
    Owned { project: String, port: i64 },
}

impl LeaseEntry {
    fn port(&self) -> i64 {
        match self {
            LeaseEntry::Anonymous(port) | LeaseEntry::Owned { port, .. } => *port,
        }
    }

    fn project(&self) -> Option<&str> {
        match self {
            LeaseEntry::Anonymous(_) => None,
            LeaseEntry::Owned { project, .. } => Some(project),
        }
    }
}

/// First-free linear scan over `[low, high]`, persisted to a JSON file.
pub struct FilePortAllocator {
    path: PathBuf,
    low: u16,
    high: u16,
    // Serializes read-modify-write within this process.
    lock: Mutex<()>,
}

impl FilePortAllocator {
    pub fn new(path: impl Into<PathBuf>, low: u16, high: u16) -> Self {
        Self {
            path: path.into(),
            low,
            high,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn in_range(&self, port: i64) -> bool {
        port >= i64::from(self.low) && port <= i64::from(self.high)
    }

    /// Current leases, with out-of-range and unparseable entries dropped.
    fn read_leases(&self) -> Vec<LeaseEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable lease file, starting fresh");
                return Vec::new();
            }
        };
        if content.trim().is_empty() {
            return Vec::new();
        }

        let raw: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "malformed lease file, starting fresh");
                return Vec::new();
            }
        };
        raw.into_iter()
            .filter_map(|value| serde_json::from_value::<LeaseEntry>(value).ok())
            .filter(|entry| self.in_range(entry.port()))
            .collect()
    }

    fn write_leases(&self, leases: &[LeaseEntry]) -> DeployResult<()> {
        let lease_err = |source| DeployError::Lease {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(lease_err)?;
        }
        let body = serde_json::to_vec_pretty(leases).map_err(|e| lease_err(e.into()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(lease_err)?;
        std::fs::rename(&tmp, &self.path).map_err(lease_err)?;
        Ok(())
    }
}

impl PortAllocator for FilePortAllocator {
    fn allocate(&self, project: &str) -> DeployResult<u16> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut leases = self.read_leases();

        if let Some(existing) = leases.iter().find(|l| l.project() == Some(project)) {
            let port = existing.port() as u16;
            debug!(%project, port, "reusing existing lease");
            return Ok(port);
        }

        let used: BTreeSet<i64> = leases.iter().map(LeaseEntry::port).collect();
        let port = (self.low..=self.high)
            .find(|p| !used.contains(&i64::from(*p)))
            .ok_or(DeployError::PortExhausted {
                low: self.low,
                high: self.high,
            })?;

        leases.push(LeaseEntry::Owned {
            project: project.to_string(),
            port: i64::from(port),
        });
        self.write_leases(&leases)?;
        info!(%project, port, "port leased");
        Ok(port)
    }

    fn release(&self, project: &str) -> DeployResult<Option<u16>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut leases = self.read_leases();
        let Some(index) = leases.iter().position(|l| l.project() == Some(project)) else {
            return Ok(None);
        };
        let released = leases.remove(index).port() as u16;
        self.write_leases(&leases)?;
        info!(%project, port = released, "port lease released");
        Ok(Some(released))
    }
}
