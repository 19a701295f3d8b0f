//! Event-Sync keeps a durable, exactly-once history of a smart contract's EVM events.
//!
//! The main entry point is [`EventSyncer`], built via [`EventSyncerBuilder`] (or straight from an
//! [`EventSyncConfig`] with [`EventSyncer::from_config`]). Each sync pass:
//!
//! 1. reads the scope's [`Checkpoint`] from the [`CheckpointStore`],
//! 2. asks the [`BlockHeightReconciler`] for the highest block the node can actually serve,
//! 3. scans towards it with a [`RangeScanner`], a bounded number of log queries at a time,
//! 4. hands every new event to the caller's [`EventHandler`] and commits it together with the
//!    checkpoint in one transaction,
//! 5. records how far the scan got, even through blocks without events.
//!
//! # Crash consistency
//!
//! The checkpoint tracks the exact position (block number and log index) of the last committed
//! event. An interrupted pass resumes right after it: no event is stored twice and none is
//! skipped. The handler runs before the commit, so an event can reach the handler again after a
//! crash between the two. Handlers should be idempotent, for example keyed by transaction hash
//! and event name.
//!
//! # Unreliable nodes
//!
//! Load-balanced RPC endpoints may report a head they cannot serve yet. The reconciler bisects
//! down to a retrievable block, and `bufferBlocks` keeps the scan behind the head to stay clear of
//! shallow reorganizations. When the node's head is behind what was already scanned the syncer
//! alerts with [`SyncError::InconsistentHeight`] and waits.
//!
//! # Robust providers
//!
//! The [`robust_provider`] module provides [`robust_provider::RobustProvider`], a wrapper that
//! retries, times out and fails over across multiple RPC endpoints. It implements
//! [`ChainReader`], the only view of the chain the syncer needs.

#[macro_use]
mod logging;

pub mod alert;
pub mod chain_reader;
pub mod config;
pub mod contract;
pub mod range_scanner;
pub mod reconciler;
pub mod robust_provider;
pub mod store;
pub mod syncer;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;
mod types;

pub use alert::{AlertSink, DEFAULT_ALERT_WINDOW, DedupAlertSink, LogAlertSink};
pub use chain_reader::{BlockRef, ChainReader};
pub use config::{EventSyncConfig, RpcConfig};
pub use contract::{ContractDescriptor, ContractError, DecodeError, DecodeErrorKind};
pub use error::{BoxError, SyncError};
pub use range_scanner::{DEFAULT_MAX_CHUNKS_PER_SCAN, RangeScanner};
pub use reconciler::BlockHeightReconciler;
pub use store::{Checkpoint, CheckpointStore, StoreError, scope_key};
pub use syncer::{
    DEFAULT_PENDING_BUFFER_CAPACITY, EventHandler, EventSyncer, EventSyncerBuilder, SyncPhase,
    SyncReport,
};
pub use types::{DecodedLog, EventFields, EventPosition, EventRecord, ScanOutcome, SyncResult};
