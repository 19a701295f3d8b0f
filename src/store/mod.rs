//! Durable checkpoint and event history for a sync scope, backed by SQLite.
//!
//! Each scope owns one row in `sync_checkpoints` and its events live in one table per event name
//! (`events_<EventName>`), keyed by scope and chain position. Committing an event writes the event
//! and moves the checkpoint in a single transaction.

mod checkpoint_store;
mod client;
mod model;

use alloy::primitives::Address;
use thiserror::Error;

use crate::types::EventPosition;

pub use checkpoint_store::CheckpointStore;
pub use model::Checkpoint;

/// Errors raised by [`CheckpointStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cannot serialize event fields: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Event names become table names, so only Solidity identifiers are accepted.
    #[error("`{0}` is not a valid event name")]
    InvalidEventName(String),

    /// The event is at or before the committed position.
    #[error("Commit at {attempted} would move the checkpoint back from {committed}")]
    CheckpointRegression { committed: EventPosition, attempted: EventPosition },

    /// A block number or log index does not fit in an SQLite integer.
    #[error("Value {0} is out of range for the store")]
    OutOfRange(u64),

    /// A stored row cannot be read back.
    #[error("Corrupt row in `{table}`: {reason}")]
    Corrupt { table: String, reason: String },
}

/// Scope key isolating one contract on one network inside a shared database.
#[must_use]
pub fn scope_key(store_name: &str, network_id: &str, address: Address) -> String {
    format!("{store_name}/{network_id}/{address}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_key_is_checksummed() {
        let address: Address = "0x52908400098527886e0f7030069857d2e4169ee7".parse().unwrap();
        assert_eq!(
            scope_key("bridge", "15", address),
            "bridge/15/0x52908400098527886E0F7030069857D2E4169EE7"
        );
    }
}
