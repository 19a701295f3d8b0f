use std::{iter, sync::Arc, time::Duration};

use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    network::{Ethereum, Network},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportErrorKind},
};
use backon::{ExponentialBuilder, Retryable};
use thiserror::Error;
use tokio::time::{error::Elapsed, timeout};

use crate::robust_provider::RobustSubscription;

/// Errors returned by [`RobustProvider`] calls.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The call timeout elapsed on the last endpoint that was tried.
    #[error("Operation timed out")]
    Timeout,

    /// The last endpoint tried returned a transport or RPC error.
    #[error("RPC error: {0}")]
    RpcError(Arc<RpcError<TransportErrorKind>>),

    /// The node answered, but does not have the requested block.
    #[error("Block not found, Block Id: {0}")]
    BlockNotFound(BlockId),
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(error: RpcError<TransportErrorKind>) -> Self {
        Error::RpcError(Arc::new(error))
    }
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::Timeout
    }
}

pub(crate) fn transport_error(kind: TransportErrorKind) -> Error {
    RpcError::Transport(kind).into()
}

/// Timeouts and retry policy shared by every endpoint of a [`RobustProvider`].
#[derive(Copy, Clone, Debug)]
pub(crate) struct CallPolicy {
    pub(crate) call_timeout: Duration,
    pub(crate) subscription_timeout: Duration,
    pub(crate) max_retries: usize,
    pub(crate) min_delay: Duration,
    pub(crate) reconnect_interval: Duration,
}

/// A primary RPC endpoint with ordered fallbacks.
///
/// Every call is retried with exponential backoff on one endpoint until `call_timeout` runs out,
/// then moves on to the next endpoint. Endpoints are numbered from `0` (the primary) in logs.
#[derive(Clone, Debug)]
pub struct RobustProvider<N: Network = Ethereum> {
    pub(crate) primary: RootProvider<N>,
    pub(crate) fallbacks: Vec<RootProvider<N>>,
    pub(crate) policy: CallPolicy,
}

impl<N: Network> RobustProvider<N> {
    #[must_use]
    pub fn primary(&self) -> &RootProvider<N> {
        &self.primary
    }

    /// Number of fallback endpoints behind the primary.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.fallbacks.len()
    }

    /// Fetch a block by [`BlockNumberOrTag`].
    ///
    /// # Errors
    ///
    /// [`Error::BlockNotFound`] when the node does not have the block, otherwise the error of the
    /// last endpoint tried.
    pub async fn get_block_by_number(
        &self,
        number: BlockNumberOrTag,
    ) -> Result<N::BlockResponse, Error> {
        self.request("eth_getBlockByNumber", move |provider| async move {
            provider.get_block_by_number(number).await
        })
        .await?
        .ok_or_else(|| Error::BlockNotFound(number.into()))
    }

    /// Fetch the block number the node reports as its head.
    pub async fn get_block_number(&self) -> Result<u64, Error> {
        self.request("eth_blockNumber", move |provider| async move {
            provider.get_block_number().await
        })
        .await
    }

    /// Fetch the logs matching `filter`.
    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, Error> {
        self.request("eth_getLogs", move |provider| async move { provider.get_logs(filter).await })
            .await
    }

    /// Subscribe to new block headers on the first endpoint that supports pubsub.
    ///
    /// The subscription moves to the next endpoint when the current one stalls or closes.
    ///
    /// # Errors
    ///
    /// `PubsubUnavailable` if no endpoint supports subscriptions.
    pub async fn subscribe_blocks(&self) -> Result<RobustSubscription<N>, Error> {
        debug!("eth_subscribe called");
        match self.call_from(0, true, None, subscribe_blocks).await {
            Ok((subscription, endpoint)) => {
                Ok(RobustSubscription::new(self.clone(), subscription, endpoint))
            }
            Err(e) => {
                error!(error = %e, "eth_subscribe failed on every endpoint");
                Err(e)
            }
        }
    }

    async fn request<T, F, Fut>(&self, method: &'static str, operation: F) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        trace!(method = method, "RPC request");
        let result = self.call_from(0, false, None, operation).await;
        if let Err(e) = &result {
            error!(method = method, error = %e, "RPC request failed on every endpoint");
        }
        result.map(|(value, _)| value)
    }

    /// Tries `operation` on the endpoints numbered `first` and up, in order, and returns the
    /// value together with the number of the endpoint that produced it.
    ///
    /// `previous` is returned when no endpoint is left to try.
    pub(crate) async fn call_from<T, F, Fut>(
        &self,
        first: usize,
        require_pubsub: bool,
        previous: Option<Error>,
        operation: F,
    ) -> Result<(T, usize), Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let mut last_error = previous;
        let endpoints = iter::once(&self.primary).chain(&self.fallbacks).enumerate().skip(first);

        for (endpoint, provider) in endpoints {
            if require_pubsub && provider.client().pubsub_frontend().is_none() {
                debug!(endpoint = endpoint, "Endpoint lacks pubsub, skipping");
                last_error.get_or_insert_with(|| {
                    transport_error(TransportErrorKind::PubsubUnavailable)
                });
                continue;
            }

            match self.call_endpoint(provider, &operation).await {
                Ok(value) => {
                    if endpoint > 0 {
                        info!(endpoint = endpoint, "Fallback endpoint answered");
                    }
                    return Ok((value, endpoint));
                }
                Err(e) => {
                    warn!(endpoint = endpoint, error = %e, "Endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| transport_error(TransportErrorKind::BackendGone)))
    }

    /// Runs `operation` against a single endpoint, retrying until `call_timeout` elapses.
    pub(crate) async fn call_endpoint<T, F, Fut>(
        &self,
        provider: &RootProvider<N>,
        operation: F,
    ) -> Result<T, Error>
    where
        F: Fn(RootProvider<N>) -> Fut,
        Fut: Future<Output = Result<T, RpcError<TransportErrorKind>>>,
    {
        let backoff = ExponentialBuilder::default()
            .with_max_times(self.policy.max_retries)
            .with_min_delay(self.policy.min_delay);

        let attempts = (|| operation(provider.clone()))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .notify(|err: &RpcError<TransportErrorKind>, delay: Duration| {
                debug!(error = %err, retry_in_ms = delay.as_millis(), "Retrying RPC call");
            });

        Ok(timeout(self.policy.call_timeout, attempts).await??)
    }
}

pub(crate) async fn subscribe_blocks<N: Network>(
    provider: RootProvider<N>,
) -> Result<alloy::pubsub::Subscription<N::HeaderResponse>, RpcError<TransportErrorKind>> {
    provider.subscribe_blocks().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn http(port: u16) -> RootProvider {
        RootProvider::new_http(format!("http://localhost:{port}").parse().expect("valid url"))
    }

    fn robust(fallbacks: usize, call_timeout_ms: u64, max_retries: usize) -> RobustProvider {
        RobustProvider {
            primary: http(8545),
            fallbacks: (0..fallbacks).map(|i| http(8546 + i as u16)).collect(),
            policy: CallPolicy {
                call_timeout: Duration::from_millis(call_timeout_ms),
                subscription_timeout: Duration::from_secs(1),
                max_retries,
                min_delay: Duration::from_millis(1),
                reconnect_interval: Duration::from_secs(1),
            },
        }
    }

    fn backend_gone() -> RpcError<TransportErrorKind> {
        RpcError::Transport(TransportErrorKind::BackendGone)
    }

    #[tokio::test]
    async fn transient_errors_are_retried_on_the_same_endpoint() {
        let provider = robust(1, 200, 3);
        let calls = AtomicUsize::new(0);

        let result = provider
            .call_from(0, false, None, |_| async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(backend_gone()),
                    n => Ok(n),
                }
            })
            .await;

        assert!(matches!(result, Ok((2, 0))));
    }

    #[tokio::test]
    async fn exhausted_retries_move_to_the_next_endpoint() {
        let provider = robust(2, 200, 1);
        let calls = AtomicUsize::new(0);

        let result = provider
            .call_from(0, false, None, |_| async {
                // two attempts per endpoint: primary fails both, first fallback answers
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=1 => Err(backend_gone()),
                    n => Ok(n),
                }
            })
            .await;

        assert!(matches!(result, Ok((2, 1))));
    }

    #[tokio::test]
    async fn last_error_is_returned_when_every_endpoint_fails() {
        let provider = robust(1, 200, 1);
        let calls = AtomicUsize::new(0);

        let result: Result<((), usize), Error> = provider
            .call_from(0, false, None, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(backend_gone())
            })
            .await;

        assert!(matches!(result, Err(Error::RpcError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out() {
        let provider = robust(0, 30, 5);

        let result = provider
            .call_from(0, false, None, |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn starting_past_the_last_endpoint_returns_the_previous_error() {
        let provider = robust(1, 200, 0);

        let result: Result<((), usize), Error> =
            provider.call_from(2, false, Some(Error::Timeout), |_| async { Ok(()) }).await;

        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn http_endpoints_cannot_subscribe() {
        let provider = robust(1, 200, 0);

        let result = provider.subscribe_blocks().await;

        match result {
            Err(Error::RpcError(e)) => assert!(matches!(
                e.as_ref(),
                RpcError::Transport(TransportErrorKind::PubsubUnavailable)
            )),
            other => panic!("Expected PubsubUnavailable, got: {other:?}"),
        }
    }
}
