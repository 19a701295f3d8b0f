//! The sync orchestrator.
//!
//! An [`EventSyncer`] binds a chain reader, a contract and a checkpoint store into one scope and
//! drives sync passes over it. A pass reads the checkpoint, settles on a block ceiling the node
//! can serve, scans towards it and hands every new event to the caller's [`EventHandler`] before
//! committing it. Events reach the handler at least once and the store exactly once.

mod builder;
mod event_syncer;
mod handler;
mod pending;

pub use builder::{DEFAULT_MAX_PASS_RETRIES, DEFAULT_RETRY_MIN_DELAY, EventSyncerBuilder};
pub use event_syncer::{EventSyncer, SyncPhase, SyncReport};
pub use handler::EventHandler;
pub use pending::DEFAULT_PENDING_BUFFER_CAPACITY;
