//! Hostname → deployment resolution.

use dockyard_state::{Coordinator, StoreResult};
use tracing::debug;

/// Where a request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A live process listening on `port`.
    Proxy { project: String, port: u16 },
    /// Published files under `dist/<project>/`.
    Static { project: String },
}

/// Leftmost label of a `Host` value, port stripped and lowercased.
pub fn host_label(host: &str) -> Option<String> {
    let host = host.trim();
    let without_port = match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    let label = without_port.split('.').next()?.trim().to_ascii_lowercase();
    if label.is_empty() { None } else { Some(label) }
}

/// Resolve a host label: a reserved domain maps to its owner, anything
/// else is taken as the project id itself.
pub async fn resolve(coordinator: &Coordinator, label: &str) -> StoreResult<Target> {
    let project = match coordinator.resolve_domain(label).await? {
        Some(owner) => {
            debug!(%label, project = %owner, "custom domain resolved");
            owner
        }
        None => label.to_string(),
    };

    Ok(match coordinator.port(&project).await? {
        Some(port) => Target::Proxy { project, port },
        None => Target::Static { project },
    })
}
