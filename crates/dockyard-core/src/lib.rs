//! dockyard-core — shared vocabulary for the Dockyard deployment platform.
//!
//! The worker and the edge router never talk to each other directly; they
//! agree on the types and key layout defined here and meet in the
//! coordination store.

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

pub use config::DockyardConfig;
pub use error::{CoreError, CoreResult};
pub use types::*;
