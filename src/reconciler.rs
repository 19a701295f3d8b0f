use std::ops::RangeInclusive;

use alloy::primitives::BlockNumber;

use crate::chain_reader::ChainReader;

/// Resolves a block height the node can actually serve.
///
/// Load-balanced or lagging nodes may report a head they cannot return yet. The reconciler probes
/// block availability and narrows down to the highest block that can be fetched, assuming that
/// if block `n` is retrievable so is every block below it.
#[derive(Debug)]
pub struct BlockHeightReconciler<'a, R> {
    reader: &'a R,
}

impl<'a, R: ChainReader> BlockHeightReconciler<'a, R> {
    #[must_use]
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    /// Whether block `number` can be fetched. Transport failures count as not retrievable.
    pub async fn is_block_retrievable(&self, number: BlockNumber) -> bool {
        match self.reader.get_block(number).await {
            Ok(block) => block.is_some(),
            Err(e) => {
                warn!(
                    block_number = number,
                    error = %e,
                    "Failed to fetch block, treating it as unavailable"
                );
                false
            }
        }
    }

    /// Performs one bisection step on `start..=end`.
    ///
    /// Returns `mid..=end` when the midpoint is retrievable and `start..=mid` otherwise. Once the
    /// midpoint coincides with `start` the range collapses to `mid..=mid`. An empty range
    /// (`end < start`) collapses to `start..=start` without probing.
    pub async fn binary_search_valid_block(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> RangeInclusive<BlockNumber> {
        if end <= start {
            return start..=start;
        }

        let mid = start + (end - start) / 2;
        if mid == start {
            return mid..=mid;
        }

        if self.is_block_retrievable(mid).await { mid..=end } else { start..=mid }
    }

    /// The highest retrievable block in `start..=end`.
    ///
    /// Returns `None` when `end < start`, or when not even `start` can be fetched.
    pub async fn get_true_latest_block_number(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Option<BlockNumber> {
        if end < start {
            warn!(
                start = start,
                end = end,
                "Inconsistent block height: reported head is behind the last checked block"
            );
            return None;
        }

        let (mut start, mut end) = (start, end);
        loop {
            if self.is_block_retrievable(end).await {
                return Some(end);
            }

            let narrowed = self.binary_search_valid_block(start, end).await;
            if narrowed == (start..=end) {
                warn!(block_number = end, "No retrievable block found while narrowing height");
                return None;
            }
            trace!(start = narrowed.start(), end = narrowed.end(), "Narrowed height search");
            (start, end) = narrowed.into_inner();
        }
    }

    /// Upper bound for scanning: `buffer` blocks behind the true head, never below
    /// `last_checked`.
    #[must_use]
    pub fn reliable_block_number(
        true_latest: Option<BlockNumber>,
        last_checked: BlockNumber,
        buffer: u64,
    ) -> BlockNumber {
        match true_latest {
            Some(latest) if latest > buffer => (latest - buffer).max(last_checked),
            _ => last_checked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChain;

    fn chain_up_to_six() -> MockChain {
        let chain = MockChain::with_head(6);
        chain.set_head_hint(100);
        chain
    }

    #[tokio::test]
    async fn retrievability_follows_the_node() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert!(reconciler.is_block_retrievable(0).await);
        assert!(reconciler.is_block_retrievable(6).await);
        assert!(!reconciler.is_block_retrievable(7).await);
    }

    #[tokio::test]
    async fn transport_errors_read_as_unavailable() {
        let chain = chain_up_to_six();
        chain.fail_blocks(true);
        let reconciler = BlockHeightReconciler::new(&chain);

        assert!(!reconciler.is_block_retrievable(1).await);
    }

    #[tokio::test]
    async fn bisection_takes_one_step() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert_eq!(reconciler.binary_search_valid_block(2, 15).await, 2..=8);
        assert_eq!(reconciler.binary_search_valid_block(6, 100).await, 6..=53);
        assert_eq!(reconciler.binary_search_valid_block(0, 8).await, 4..=8);
        assert_eq!(chain.block_queries(), vec![8, 53, 4]);
    }

    #[tokio::test]
    async fn bisection_collapses_without_probing() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert_eq!(reconciler.binary_search_valid_block(6, 7).await, 6..=6);
        assert_eq!(reconciler.binary_search_valid_block(9, 9).await, 9..=9);
        assert!(chain.block_queries().is_empty());
    }

    #[tokio::test]
    async fn bisection_of_reversed_range_collapses_to_start() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert_eq!(reconciler.binary_search_valid_block(10, 4).await, 10..=10);
        assert_eq!(reconciler.binary_search_valid_block(1, 0).await, 1..=1);
        assert!(chain.block_queries().is_empty());
    }

    #[tokio::test]
    async fn finds_highest_retrievable_block() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert_eq!(reconciler.get_true_latest_block_number(5, 100).await, Some(6));
        assert_eq!(reconciler.get_true_latest_block_number(6, 100).await, Some(6));
        assert_eq!(reconciler.get_true_latest_block_number(2, 6).await, Some(6));
        assert_eq!(reconciler.get_true_latest_block_number(0, 0).await, Some(0));
    }

    #[tokio::test]
    async fn head_behind_start_is_inconsistent() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert_eq!(reconciler.get_true_latest_block_number(10, 4).await, None);
        assert!(chain.block_queries().is_empty());
    }

    #[tokio::test]
    async fn unavailable_start_gives_up_instead_of_spinning() {
        let chain = chain_up_to_six();
        let reconciler = BlockHeightReconciler::new(&chain);

        assert_eq!(reconciler.get_true_latest_block_number(8, 10).await, None);

        chain.set_retrievable_up_to(None);
        assert_eq!(reconciler.get_true_latest_block_number(0, 1_000).await, None);
    }

    #[test]
    fn reliable_height_keeps_buffer_and_floor() {
        type Reconciler<'a> = BlockHeightReconciler<'a, MockChain>;

        assert_eq!(Reconciler::reliable_block_number(Some(30), 10, 10), 20);
        assert_eq!(Reconciler::reliable_block_number(Some(10), 5, 15), 5);
        assert_eq!(Reconciler::reliable_block_number(None, 10, 15), 10);
        assert_eq!(Reconciler::reliable_block_number(Some(12), 11, 2), 11);
        assert_eq!(Reconciler::reliable_block_number(Some(15), 15, 15), 15);
        assert_eq!(Reconciler::reliable_block_number(Some(8), 3, 0), 8);
    }
}
