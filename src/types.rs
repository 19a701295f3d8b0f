use std::fmt::{self, Debug};

use alloy::primitives::{BlockHash, BlockNumber, TxHash};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::{SyncError, contract::DecodeError};

/// Decoded event parameters, keyed by ABI input name in declaration order.
pub type EventFields = Map<String, Value>;

/// Position of a log on chain. Events are handled and committed in ascending position order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventPosition {
    pub block_number: BlockNumber,
    pub log_index: u64,
}

impl EventPosition {
    #[must_use]
    pub const fn new(block_number: BlockNumber, log_index: u64) -> Self {
        Self { block_number, log_index }
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// A contract log decoded against the contract's event schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub event_name: String,
    pub block_number: BlockNumber,
    pub block_hash: BlockHash,
    pub transaction_hash: TxHash,
    pub log_index: u64,
    pub fields: EventFields,
}

impl EventRecord {
    #[must_use]
    pub fn position(&self) -> EventPosition {
        EventPosition::new(self.block_number, self.log_index)
    }
}

/// Outcome of decoding a single log. Failures are carried alongside successes so a caller can
/// decide what to do with them instead of losing them.
pub type DecodedLog = Result<EventRecord, DecodeError>;

/// Result of one bounded range scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Non-empty per-chunk groups, each ordered by [`EventPosition`].
    pub events: Vec<Vec<DecodedLog>>,
    /// Upper bound of the last chunk actually scanned, `None` when there was nothing to scan.
    pub breakpoint: Option<BlockNumber>,
}

impl ScanOutcome {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total number of logs across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

pub(crate) trait TryStream<T> {
    async fn try_stream(&self, item: SyncResult<T>) -> bool;
}

impl<T: Debug> TryStream<T> for mpsc::Sender<SyncResult<T>> {
    async fn try_stream(&self, item: SyncResult<T>) -> bool {
        match &item {
            Ok(msg) => trace!(item = ?msg, "Sending message"),
            Err(err) => debug!(error = %err, "Sending error"),
        }
        if self.send(item).await.is_err() {
            debug!("Downstream channel closed, stopping stream");
            return false;
        }
        true
    }
}
