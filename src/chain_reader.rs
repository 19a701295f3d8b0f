use std::ops::RangeInclusive;

use alloy::{
    consensus::BlockHeader,
    eips::BlockNumberOrTag,
    network::{BlockResponse, Network, primitives::HeaderResponse},
    primitives::{Address, BlockHash, BlockNumber},
    rpc::types::{Filter, Log},
};

use crate::robust_provider::{Error, RobustProvider};

/// Identity of a block the node was able to return.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub number: BlockNumber,
    pub hash: BlockHash,
}

/// Read-only view of the chain needed to sync contract events.
///
/// Implementations may be backed by a node that lags or load-balances across replicas, so
/// [`ChainReader::get_latest_block_hint`] is only a hint and `get_block` may return `None` for
/// blocks at or below it.
pub trait ChainReader: Send + Sync {
    /// Fetch block `number`, `Ok(None)` if the node does not have it.
    fn get_block(
        &self,
        number: BlockNumber,
    ) -> impl Future<Output = Result<Option<BlockRef>, Error>> + Send;

    /// Fetch all logs emitted by `address` in the inclusive block range.
    fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> impl Future<Output = Result<Vec<Log>, Error>> + Send;

    /// The block number the node reports as its head.
    fn get_latest_block_hint(&self) -> impl Future<Output = Result<BlockNumber, Error>> + Send;
}

impl<N: Network> ChainReader for RobustProvider<N> {
    async fn get_block(&self, number: BlockNumber) -> Result<Option<BlockRef>, Error> {
        match self.get_block_by_number(BlockNumberOrTag::Number(number)).await {
            Ok(block) => {
                let header = block.header();
                Ok(Some(BlockRef { number: header.number(), hash: header.hash() }))
            }
            Err(Error::BlockNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<Log>, Error> {
        let filter =
            Filter::new().address(address).from_block(*range.start()).to_block(*range.end());
        RobustProvider::get_logs(self, &filter).await
    }

    async fn get_latest_block_hint(&self) -> Result<BlockNumber, Error> {
        self.get_block_number().await
    }
}
