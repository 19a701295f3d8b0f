use alloy::primitives::{B256, BlockNumber};
use sqlx::FromRow;

use crate::{
    store::StoreError,
    types::{EventPosition, EventRecord},
};

/// Persisted progress of a sync scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    /// Block of the last committed event.
    pub last_processed_block: BlockNumber,
    /// Log index of the last committed event, `None` while no event was committed.
    pub last_log_index: Option<u64>,
    /// Last block a completed scan covered, as stored.
    pub scan_cursor: Option<BlockNumber>,
}

impl Checkpoint {
    /// Position of the last committed event.
    #[must_use]
    pub fn committed_position(&self) -> Option<EventPosition> {
        self.last_log_index.map(|index| EventPosition::new(self.last_processed_block, index))
    }

    /// Whether the event at `position` was already committed.
    #[must_use]
    pub fn is_committed(&self, position: EventPosition) -> bool {
        self.committed_position().is_some_and(|committed| position <= committed)
    }

    /// The scan cursor as reported to callers, never below the last processed block.
    #[must_use]
    pub fn scan_cursor(&self) -> BlockNumber {
        self.scan_cursor.unwrap_or_default().max(self.last_processed_block)
    }

    /// First block the next scan has to look at.
    ///
    /// A cursor at or past the last processed block means everything up to it was handled. A
    /// lower cursor means the last scan stopped part-way through `last_processed_block`, which is
    /// scanned again and its committed events skipped.
    #[must_use]
    pub fn resume_block(&self, floor: BlockNumber) -> BlockNumber {
        let resume = match self.scan_cursor {
            Some(cursor) if cursor >= self.last_processed_block => cursor.saturating_add(1),
            _ => self.last_processed_block,
        };
        resume.max(floor)
    }
}

#[derive(FromRow)]
pub(crate) struct CheckpointRow {
    pub last_processed_block: i64,
    pub last_log_index: Option<i64>,
    pub scan_cursor: Option<i64>,
}

impl TryFrom<CheckpointRow> for Checkpoint {
    type Error = StoreError;

    fn try_from(row: CheckpointRow) -> Result<Self, StoreError> {
        let unsigned = |value: i64| {
            u64::try_from(value).map_err(|_| StoreError::Corrupt {
                table: "sync_checkpoints".to_owned(),
                reason: format!("negative block or index {value}"),
            })
        };

        Ok(Checkpoint {
            last_processed_block: unsigned(row.last_processed_block)?,
            last_log_index: row.last_log_index.map(unsigned).transpose()?,
            scan_cursor: row.scan_cursor.map(unsigned).transpose()?,
        })
    }
}

#[derive(FromRow)]
pub(crate) struct EventRow {
    pub block_number: i64,
    pub block_hash: Vec<u8>,
    pub transaction_hash: Vec<u8>,
    pub log_index: i64,
    pub fields: String,
}

impl EventRow {
    pub(crate) fn into_record(
        self,
        event_name: &str,
        table: &str,
    ) -> Result<EventRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt { table: table.to_owned(), reason };

        let hash = |bytes: &[u8], column: &str| {
            B256::try_from(bytes)
                .map_err(|_| corrupt(format!("`{column}` is {} bytes", bytes.len())))
        };
        let unsigned = |value: i64, column: &str| {
            u64::try_from(value).map_err(|_| corrupt(format!("`{column}` is negative")))
        };

        Ok(EventRecord {
            event_name: event_name.to_owned(),
            block_number: unsigned(self.block_number, "block_number")?,
            block_hash: hash(&self.block_hash, "block_hash")?,
            transaction_hash: hash(&self.transaction_hash, "transaction_hash")?,
            log_index: unsigned(self.log_index, "log_index")?,
            fields: serde_json::from_str(&self.fields)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(block: u64, index: Option<u64>, cursor: Option<u64>) -> Checkpoint {
        Checkpoint { last_processed_block: block, last_log_index: index, scan_cursor: cursor }
    }

    #[test]
    fn cursor_covering_last_block_resumes_after_it() {
        assert_eq!(checkpoint(5, Some(2), Some(5)).resume_block(0), 6);
        assert_eq!(checkpoint(5, Some(2), Some(9)).resume_block(0), 10);
        assert_eq!(checkpoint(0, None, Some(9)).resume_block(0), 10);
    }

    #[test]
    fn interrupted_block_is_scanned_again() {
        assert_eq!(checkpoint(12, Some(0), Some(9)).resume_block(0), 12);
        assert_eq!(checkpoint(12, Some(0), None).resume_block(0), 12);
    }

    #[test]
    fn floor_wins_over_older_progress() {
        assert_eq!(checkpoint(3, Some(0), Some(4)).resume_block(100), 100);
        assert_eq!(checkpoint(0, None, Some(u64::MAX)).resume_block(7), u64::MAX);
    }

    #[test]
    fn reported_cursor_never_below_last_processed() {
        assert_eq!(checkpoint(12, Some(0), Some(9)).scan_cursor(), 12);
        assert_eq!(checkpoint(12, Some(0), Some(20)).scan_cursor(), 20);
        assert_eq!(checkpoint(12, Some(0), None).scan_cursor(), 12);
    }

    #[test]
    fn committed_positions_are_skipped() {
        let checkpoint = checkpoint(12, Some(3), None);

        assert!(checkpoint.is_committed(EventPosition::new(12, 3)));
        assert!(checkpoint.is_committed(EventPosition::new(11, 9)));
        assert!(!checkpoint.is_committed(EventPosition::new(12, 4)));
        let cursor_only = Checkpoint { last_log_index: None, ..checkpoint };
        assert!(!cursor_only.is_committed(EventPosition::new(0, 0)));
    }

    #[test]
    fn negative_columns_are_corrupt() {
        let row =
            CheckpointRow { last_processed_block: -1, last_log_index: None, scan_cursor: None };
        assert!(matches!(Checkpoint::try_from(row), Err(StoreError::Corrupt { .. })));
    }
}
