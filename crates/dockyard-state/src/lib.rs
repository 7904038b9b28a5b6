//! dockyard-state — the coordination channel between worker and router.
//!
//! # Architecture
//!
//! ```text
//! Coordinator (typed: status, port, domain keys)
//!   └── dyn CoordinationStore ── RedisStore | MemoryStore
//! WorkQueue (push / blocking pop) ── RedisStore | MemoryStore
//! RecordStore (job records) ── KvRecords | RedbRecords
//! ```
//!
//! Backends are injected as trait objects so the worker and the router can
//! be exercised against `MemoryStore` in tests and Redis in production.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod records;
pub mod traits;
pub mod valkey;

pub use coordinator::Coordinator;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use records::{KvRecords, RecordStore, RedbRecords};
pub use traits::{CoordinationStore, WorkQueue};
pub use valkey::RedisStore;
