use std::{
    ops::RangeInclusive,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy::{
    primitives::{Address, B256, BlockHash, BlockNumber, LogData, TxHash, keccak256},
    rpc::types::Log,
    transports::{RpcError, TransportErrorKind},
};

use crate::{
    chain_reader::{BlockRef, ChainReader},
    robust_provider::Error,
};

#[derive(Debug, Default)]
struct MockState {
    retrievable_up_to: Option<BlockNumber>,
    head_hint: BlockNumber,
    logs: Vec<Log>,
    failing_log_block: Option<BlockNumber>,
    failing_blocks: bool,
    failing_hint: bool,
    log_queries: Vec<RangeInclusive<BlockNumber>>,
    block_queries: Vec<BlockNumber>,
}

/// An in-memory [`ChainReader`] whose head, block availability and faults are set by the test.
///
/// Clones share state, so a test can keep a handle while the syncer owns another.
#[derive(Clone, Debug, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl MockChain {
    /// A chain where blocks `0..=head` are retrievable and `head` is the reported head.
    #[must_use]
    pub fn with_head(head: BlockNumber) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Makes `0..=head` retrievable and reports `head` as the hint.
    pub fn set_head(&self, head: BlockNumber) {
        let mut state = self.state();
        state.retrievable_up_to = Some(head);
        state.head_hint = head;
    }

    /// Reports `hint` as head without changing which blocks can be fetched.
    pub fn set_head_hint(&self, hint: BlockNumber) {
        self.state().head_hint = hint;
    }

    /// Only blocks `<= last` can be fetched, `None` makes every block unavailable.
    pub fn set_retrievable_up_to(&self, last: Option<BlockNumber>) {
        self.state().retrievable_up_to = last;
    }

    pub fn push_log(&self, log: Log) {
        self.state().logs.push(log);
    }

    pub fn extend_logs(&self, logs: impl IntoIterator<Item = Log>) {
        self.state().logs.extend(logs);
    }

    /// `get_logs` fails for every range containing `block` until cleared with `None`.
    pub fn fail_logs_at(&self, block: Option<BlockNumber>) {
        self.state().failing_log_block = block;
    }

    /// `get_block` fails with a transport error while set.
    pub fn fail_blocks(&self, fail: bool) {
        self.state().failing_blocks = fail;
    }

    /// `get_latest_block_hint` fails with a transport error while set.
    pub fn fail_hint(&self, fail: bool) {
        self.state().failing_hint = fail;
    }

    /// Ranges passed to `get_logs`, in call order.
    #[must_use]
    pub fn log_queries(&self) -> Vec<RangeInclusive<BlockNumber>> {
        self.state().log_queries.clone()
    }

    /// Block numbers passed to `get_block`, in call order.
    #[must_use]
    pub fn block_queries(&self) -> Vec<BlockNumber> {
        self.state().block_queries.clone()
    }

    pub fn clear_queries(&self) {
        let mut state = self.state();
        state.log_queries.clear();
        state.block_queries.clear();
    }
}

fn backend_gone() -> Error {
    RpcError::<TransportErrorKind>::Transport(TransportErrorKind::BackendGone).into()
}

impl ChainReader for MockChain {
    async fn get_block(&self, number: BlockNumber) -> Result<Option<BlockRef>, Error> {
        let mut state = self.state();
        state.block_queries.push(number);
        if state.failing_blocks {
            return Err(backend_gone());
        }

        let retrievable = state.retrievable_up_to.is_some_and(|last| number <= last);
        Ok(retrievable.then(|| BlockRef { number, hash: mock_block_hash(number) }))
    }

    async fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<Log>, Error> {
        let mut state = self.state();
        state.log_queries.push(range.clone());
        if state.failing_log_block.is_some_and(|block| range.contains(&block)) {
            return Err(backend_gone());
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| log.inner.address == address)
            .filter(|log| log.block_number.is_some_and(|n| range.contains(&n)))
            .cloned()
            .collect())
    }

    async fn get_latest_block_hint(&self) -> Result<BlockNumber, Error> {
        let state = self.state();
        if state.failing_hint {
            return Err(backend_gone());
        }
        Ok(state.head_hint)
    }
}

#[must_use]
pub fn mock_block_hash(number: BlockNumber) -> BlockHash {
    keccak256(number.to_be_bytes())
}

#[must_use]
pub fn mock_tx_hash(number: BlockNumber, log_index: u64) -> TxHash {
    let mut preimage = [0u8; 16];
    preimage[..8].copy_from_slice(&number.to_be_bytes());
    preimage[8..].copy_from_slice(&log_index.to_be_bytes());
    keccak256(preimage)
}

/// A mined log with deterministic block and transaction hashes.
#[must_use]
pub fn mock_log(address: Address, block: BlockNumber, log_index: u64, data: LogData) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: Some(mock_block_hash(block)),
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(mock_tx_hash(block, log_index)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}
