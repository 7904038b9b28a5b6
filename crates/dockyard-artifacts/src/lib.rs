//! dockyard-artifacts — object storage for uploaded sources and published
//! static output.
//!
//! `ArtifactStore` offers list/get/put/delete-by-prefix plus the two mirror
//! operations the worker relies on: `mirror_down` (prefix → workspace) and
//! `mirror_up` (build output → prefix).

pub mod error;
pub mod mirror;
pub mod store;

pub use error::{ArtifactError, ArtifactResult};
pub use store::ArtifactStore;
