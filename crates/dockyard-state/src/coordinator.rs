//! Typed accessors over the coordination keyspace.
//!
//! Raw keys (`<id>:status`, `<id>:Port`, `domain:<token>`) are built only
//! here and in `dockyard_core::keys`; callers deal in `JobStatus`, ports
//! and domain tokens.

use std::sync::Arc;

use dockyard_core::{JobStatus, keys, validate_domain_token};
use tracing::{debug, warn};

use crate::error::StoreResult;
use crate::traits::CoordinationStore;

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn CoordinationStore>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    // ── Status ─────────────────────────────────────────────────────

    /// Write both the phase tag and the simple status.
    pub async fn write_status(&self, id: &str, status: &JobStatus) -> StoreResult<()> {
        self.store
            .set(&keys::status_key(id), &status.to_string())
            .await?;
        self.store
            .set(&keys::simple_status_key(id), status.simple())
            .await?;
        debug!(job_id = %id, %status, "status written");
        Ok(())
    }

    /// Read the phase tag, falling back to the simple status key.
    pub async fn status(&self, id: &str) -> StoreResult<Option<JobStatus>> {
        let raw = match self.store.get(&keys::status_key(id)).await? {
            Some(raw) => Some(raw),
            None => self.store.get(&keys::simple_status_key(id)).await?,
        };
        Ok(raw.and_then(|raw| match raw.parse() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(job_id = %id, error = %e, "unreadable status tag");
                None
            }
        }))
    }

    // ── Ports ──────────────────────────────────────────────────────

    pub async fn set_port(&self, id: &str, port: u16) -> StoreResult<()> {
        self.store
            .set(&keys::port_key(id), &port.to_string())
            .await
    }

    /// The live port of a dynamic deployment. Malformed values read as absent.
    pub async fn port(&self, id: &str) -> StoreResult<Option<u16>> {
        let Some(raw) = self.store.get(&keys::port_key(id)).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<u16>() {
            Ok(port) => Ok(Some(port)),
            Err(_) => {
                warn!(job_id = %id, value = %raw, "ignoring malformed port value");
                Ok(None)
            }
        }
    }

    /// Forget the live port of a job. Returns true if one was recorded.
    pub async fn clear_port(&self, id: &str) -> StoreResult<bool> {
        self.store.delete(&keys::port_key(id)).await
    }

    // ── Domains ────────────────────────────────────────────────────

    /// Reserve `token` for `project_id`. Returns false if already taken.
    pub async fn reserve_domain(&self, token: &str, project_id: &str) -> StoreResult<bool> {
        validate_domain_token(token)?;
        let created = self
            .store
            .set_if_absent(&keys::domain_key(token), project_id)
            .await?;
        debug!(%token, %project_id, created, "domain reservation");
        Ok(created)
    }

    /// Whether `token` is well-formed and unreserved.
    pub async fn is_domain_available(&self, token: &str) -> StoreResult<bool> {
        if validate_domain_token(token).is_err() {
            return Ok(false);
        }
        Ok(self.store.get(&keys::domain_key(token)).await?.is_none())
    }

    pub async fn resolve_domain(&self, token: &str) -> StoreResult<Option<String>> {
        self.store.get(&keys::domain_key(token)).await
    }

    /// All tokens owned by a project.
    pub async fn domains_for(&self, project_id: &str) -> StoreResult<Vec<String>> {
        let mut owned = Vec::new();
        for key in self.store.keys_with_prefix(keys::DOMAIN_PREFIX).await? {
            if self.store.get(&key).await?.as_deref() == Some(project_id) {
                if let Some(token) = key.strip_prefix(keys::DOMAIN_PREFIX) {
                    owned.push(token.to_string());
                }
            }
        }
        Ok(owned)
    }

    /// Drop every domain mapping owned by a project. Returns the count.
    pub async fn release_domains(&self, project_id: &str) -> StoreResult<usize> {
        let tokens = self.domains_for(project_id).await?;
        for token in &tokens {
            self.store.delete(&keys::domain_key(token)).await?;
        }
        Ok(tokens.len())
    }

    /// Remove the status and port keys of a job.
    pub async fn clear_job(&self, id: &str) -> StoreResult<()> {
        self.store.delete(&keys::simple_status_key(id)).await?;
        self.store.delete(&keys::status_key(id)).await?;
        self.clear_port(id).await?;
        Ok(())
    }
}
