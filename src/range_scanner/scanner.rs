use std::num::NonZeroU64;

use alloy::primitives::BlockNumber;

use crate::{
    chain_reader::ChainReader,
    contract::ContractDescriptor,
    range_scanner::ChunkWindows,
    types::{ScanOutcome, SyncResult},
};

/// Default number of windows queried by a single [`RangeScanner::scan`] call.
pub const DEFAULT_MAX_CHUNKS_PER_SCAN: usize = 10;

/// Scans a contract's logs window by window and decodes them against its event schema.
#[derive(Debug)]
pub struct RangeScanner<'a, R> {
    reader: &'a R,
    contract: &'a ContractDescriptor,
    step: Option<NonZeroU64>,
    max_chunks: usize,
}

impl<'a, R: ChainReader> RangeScanner<'a, R> {
    /// Creates a scanner querying windows of `step` blocks. A `step` of zero or less queries the
    /// whole range at once.
    #[must_use]
    pub fn new(
        reader: &'a R,
        contract: &'a ContractDescriptor,
        step: i64,
        max_chunks: usize,
    ) -> Self {
        let step = u64::try_from(step).ok().and_then(NonZeroU64::new);
        Self { reader, contract, step, max_chunks }
    }

    /// Scans `from..=to`, or as much of it as fits in the window budget.
    ///
    /// Empty windows are dropped from the returned groups but still move the breakpoint. Logs
    /// within a group are ordered by block number and log index. An empty range returns an
    /// empty outcome without querying the node.
    ///
    /// # Errors
    ///
    /// Fails on the first window whose logs cannot be fetched. Nothing from earlier windows is
    /// returned in that case.
    pub async fn scan(&self, from: BlockNumber, to: BlockNumber) -> SyncResult<ScanOutcome> {
        if from > to {
            trace!(from = from, to = to, "Empty scan range");
            return Ok(ScanOutcome::empty());
        }

        let mut outcome = ScanOutcome::empty();
        for window in ChunkWindows::new(from, to, self.step, self.max_chunks) {
            let mut logs = self.reader.get_logs(self.contract.address(), window.clone()).await?;
            debug!(
                from = window.start(),
                to = window.end(),
                log_count = logs.len(),
                "Scanned block window"
            );

            if !logs.is_empty() {
                logs.sort_by_key(|log| (log.block_number, log.log_index));
                outcome.events.push(logs.iter().map(|log| self.contract.decode_log(log)).collect());
            }
            outcome.breakpoint = Some(*window.end());
        }

        Ok(outcome)
    }
}
