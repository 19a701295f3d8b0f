use std::{error::Error as StdError, sync::Arc};

use alloy::{
    eips::BlockId,
    primitives::BlockNumber,
    transports::{RpcError, TransportErrorKind},
};
use thiserror::Error;

use crate::{
    contract::{ContractError, DecodeError},
    robust_provider::Error as RobustProviderError,
    store::StoreError,
};

/// Boxed error returned by user supplied event handlers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors emitted while synchronizing contract events.
///
/// Every variant aborts the current sync pass. The checkpoint is left at the last event that was
/// committed, so retrying the pass resumes exactly where it stopped.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The underlying RPC transport returned an error.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// A requested block could not be retrieved.
    #[error("Block not found, Block Id: {0}")]
    BlockNotFound(BlockId),

    /// A timeout elapsed while waiting for an RPC response.
    #[error("Operation timed out")]
    Timeout,

    /// Reading or writing the checkpoint store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A log returned for the contract could not be decoded against its event schema.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The contract descriptor could not be resolved.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// The configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// The event handler rejected an event. The event was not committed.
    #[error("Handler failed on `{event_name}` in block {block_number}: {source}")]
    Handler {
        event_name: String,
        block_number: BlockNumber,
        #[source]
        source: BoxError,
    },

    /// The node reports a head that no block between the last checked block and the hint can
    /// be retrieved for.
    #[error("No retrievable block between {last_checked} and reported head {hint}")]
    InconsistentHeight { hint: BlockNumber, last_checked: BlockNumber },

    /// The configured number of chunks per scan is invalid (must be greater than zero).
    #[error("Max chunks per scan must be greater than 0")]
    InvalidMaxChunksPerScan,

    /// A pending event subscription ended.
    #[error("Subscription closed")]
    SubscriptionClosed,
}

impl From<RobustProviderError> for SyncError {
    fn from(error: RobustProviderError) -> SyncError {
        match error {
            RobustProviderError::Timeout => SyncError::Timeout,
            RobustProviderError::RpcError(err) => SyncError::RpcError(err),
            RobustProviderError::BlockNotFound(block) => SyncError::BlockNotFound(block),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for SyncError {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        SyncError::RpcError(Arc::new(error))
    }
}

impl SyncError {
    /// Whether retrying the same pass later can be expected to succeed.
    ///
    /// Transport failures and handler rejections are transient. A log that does not decode will
    /// not decode on the next attempt either.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            SyncError::Decode(_)
                | SyncError::Contract(_)
                | SyncError::Config(_)
                | SyncError::InvalidMaxChunksPerScan
        )
    }
}
