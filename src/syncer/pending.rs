use alloy::{consensus::BlockHeader, network::Network, primitives::BlockNumber};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};

use crate::{
    SyncError,
    alert::AlertSink,
    chain_reader::ChainReader,
    contract::ContractDescriptor,
    robust_provider::{self, RobustProvider},
    syncer::EventSyncer,
    types::{EventRecord, SyncResult, TryStream},
};

/// Default capacity of the channel behind [`EventSyncer::subscribe_pending_events`].
pub const DEFAULT_PENDING_BUFFER_CAPACITY: usize = 1024;

impl<N, A> EventSyncer<RobustProvider<N>, A>
where
    N: Network,
    A: AlertSink,
{
    /// Streams the contract's events from every new block as it arrives.
    ///
    /// This is a best-effort live view: nothing is checkpointed or stored and recently mined
    /// blocks may still be reorganized away. The stream yields an error item for blocks whose
    /// logs could not be fetched and ends with an error once the subscription is lost.
    ///
    /// # Errors
    ///
    /// Fails if no provider supports subscriptions.
    pub async fn subscribe_pending_events(
        &self,
    ) -> SyncResult<ReceiverStream<SyncResult<EventRecord>>> {
        let subscription = self.reader.subscribe_blocks().await?;
        let heads = subscription.into_stream().map(|header| header.map(|header| header.number()));

        let (sender, receiver) = mpsc::channel(DEFAULT_PENDING_BUFFER_CAPACITY);
        tokio::spawn(forward_block_events(
            self.reader.clone(),
            self.contract.clone(),
            heads,
            sender,
        ));

        info!(address = %self.contract.address(), "Streaming pending contract events");
        Ok(ReceiverStream::new(receiver))
    }
}

/// Fetches and decodes the contract's logs of every block number `heads` yields.
pub(crate) async fn forward_block_events<R, S>(
    reader: R,
    contract: ContractDescriptor,
    mut heads: S,
    sender: mpsc::Sender<SyncResult<EventRecord>>,
) where
    R: ChainReader,
    S: Stream<Item = Result<BlockNumber, robust_provider::Error>> + Unpin,
{
    while let Some(head) = heads.next().await {
        let block_number = match head {
            Ok(block_number) => block_number,
            Err(e) => {
                sender.try_stream(Err(e.into())).await;
                return;
            }
        };

        let mut logs = match reader.get_logs(contract.address(), block_number..=block_number).await
        {
            Ok(logs) => logs,
            Err(e) => {
                warn!(block_number = block_number, error = %e, "Failed to fetch pending logs");
                if !sender.try_stream(Err(e.into())).await {
                    return;
                }
                continue;
            }
        };

        logs.sort_by_key(|log| log.log_index);
        for log in &logs {
            let item = contract.decode_log(log).map_err(SyncError::from);
            if !sender.try_stream(item).await {
                return;
            }
        }
    }

    sender.try_stream(Err(SyncError::SubscriptionClosed)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_closed, assert_next, assert_next_err,
        test_utils::{MockChain, mock_tx_hash, next_within, test_contract, transfer_log},
    };
    use alloy::{
        primitives::Address,
        transports::{RpcError, TransportErrorKind},
    };

    const TOKEN: Address = Address::new([0xaa; 20]);

    fn spawn_forwarder(
        chain: &MockChain,
        heads: Vec<Result<BlockNumber, robust_provider::Error>>,
    ) -> ReceiverStream<SyncResult<EventRecord>> {
        let (sender, receiver) = mpsc::channel(16);
        tokio::spawn(forward_block_events(
            chain.clone(),
            test_contract(TOKEN),
            tokio_stream::iter(heads),
            sender,
        ));
        ReceiverStream::new(receiver)
    }

    #[tokio::test]
    async fn decodes_logs_of_each_new_block() {
        let chain = MockChain::with_head(3);
        chain.extend_logs([
            transfer_log(TOKEN, 2, 1, 20),
            transfer_log(TOKEN, 2, 0, 10),
            transfer_log(TOKEN, 3, 0, 30),
        ]);

        let mut stream = spawn_forwarder(&chain, vec![Ok(2), Ok(3)]);

        let expected = test_contract(TOKEN);
        assert_next!(stream, expected.decode_log(&transfer_log(TOKEN, 2, 0, 10)).unwrap());
        assert_next!(stream, expected.decode_log(&transfer_log(TOKEN, 2, 1, 20)).unwrap());
        assert_next!(stream, expected.decode_log(&transfer_log(TOKEN, 3, 0, 30)).unwrap());
        assert_next_err!(stream, SyncError::SubscriptionClosed);
        assert_closed!(stream);
        assert_eq!(chain.log_queries(), vec![2..=2, 3..=3]);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_and_skipped() {
        let chain = MockChain::with_head(5);
        chain.extend_logs([transfer_log(TOKEN, 4, 0, 1), transfer_log(TOKEN, 5, 0, 2)]);
        chain.fail_logs_at(Some(4));

        let mut stream = spawn_forwarder(&chain, vec![Ok(4), Ok(5)]);

        assert_next_err!(stream, SyncError::RpcError(_));
        let next = next_within(&mut stream).await;
        assert!(
            matches!(next, Some(Ok(ref record)) if record.transaction_hash == mock_tx_hash(5, 0))
        );
    }

    #[tokio::test]
    async fn lost_subscription_ends_the_stream() {
        let chain = MockChain::with_head(5);
        let lost = RpcError::<TransportErrorKind>::Transport(TransportErrorKind::BackendGone);

        let mut stream = spawn_forwarder(&chain, vec![Err(lost.into()), Ok(5)]);

        assert_next_err!(stream, SyncError::RpcError(_));
        assert_closed!(stream);
        assert!(chain.log_queries().is_empty());
    }
}
