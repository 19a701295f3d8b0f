use std::{
    pin::Pin,
    task::{Context, Poll, ready},
    time::{Duration, Instant},
};

use alloy::{network::Network, pubsub::Subscription, transports::TransportErrorKind};
use tokio::{sync::broadcast::error::RecvError, time::timeout};
use tokio_stream::Stream;
use tokio_util::sync::ReusableBoxFuture;

use crate::robust_provider::{
    Error, RobustProvider,
    provider::{subscribe_blocks, transport_error},
};

/// Default interval between attempts to move a subscription back to the primary endpoint.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);

/// Lagged receives in a row tolerated before the endpoint is given up.
const MAX_CONSECUTIVE_LAGS: usize = 3;

/// A new-block-header subscription that survives endpoint failures.
///
/// When the current endpoint stalls for longer than the subscription timeout, closes the
/// subscription, or keeps lagging, the subscription moves to the next endpoint. While on a
/// fallback it periodically tries to get back to the primary.
#[derive(Debug)]
pub struct RobustSubscription<N: Network> {
    provider: RobustProvider<N>,
    current: Option<(usize, Subscription<N::HeaderResponse>)>,
    primary_retry_at: Option<Instant>,
    lags: usize,
}

impl<N: Network> RobustSubscription<N> {
    pub(crate) fn new(
        provider: RobustProvider<N>,
        subscription: Subscription<N::HeaderResponse>,
        endpoint: usize,
    ) -> Self {
        let primary_retry_at =
            (endpoint > 0).then(|| Instant::now() + provider.policy.reconnect_interval);
        Self { provider, current: Some((endpoint, subscription)), primary_retry_at, lags: 0 }
    }

    /// Number of the endpoint currently serving the subscription, `0` being the primary.
    #[must_use]
    pub fn endpoint(&self) -> Option<usize> {
        self.current.as_ref().map(|(endpoint, _)| *endpoint)
    }

    /// Receive the next block header.
    ///
    /// # Errors
    ///
    /// Once no endpoint is left to move to. The subscription is unusable afterwards.
    pub async fn recv(&mut self) -> Result<N::HeaderResponse, Error> {
        let stall_timeout = self.provider.policy.subscription_timeout;

        loop {
            self.return_to_primary_if_due().await;

            let Some((endpoint, subscription)) = &mut self.current else {
                return Err(transport_error(TransportErrorKind::BackendGone));
            };
            let endpoint = *endpoint;

            let failure = match timeout(stall_timeout, subscription.recv()).await {
                Ok(Ok(header)) => {
                    self.lags = 0;
                    return Ok(header);
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    self.lags += 1;
                    warn!(
                        endpoint = endpoint,
                        skipped = skipped,
                        lags = self.lags,
                        "Subscription lagged"
                    );
                    if self.lags < MAX_CONSECUTIVE_LAGS {
                        continue;
                    }
                    transport_error(TransportErrorKind::BackendGone)
                }
                Ok(Err(RecvError::Closed)) => {
                    warn!(endpoint = endpoint, "Subscription closed by endpoint");
                    transport_error(TransportErrorKind::BackendGone)
                }
                Err(elapsed) => {
                    warn!(
                        endpoint = endpoint,
                        timeout_secs = stall_timeout.as_secs(),
                        "No block header before subscription timeout"
                    );
                    elapsed.into()
                }
            };

            self.move_past(endpoint, failure).await?;
        }
    }

    async fn move_past(&mut self, failed: usize, failure: Error) -> Result<(), Error> {
        let moved =
            self.provider.call_from(failed + 1, true, Some(failure), subscribe_blocks).await;

        match moved {
            Ok((subscription, endpoint)) => {
                info!(endpoint = endpoint, "Subscription moved to fallback endpoint");
                self.current = Some((endpoint, subscription));
                self.lags = 0;
                let reconnect_interval = self.provider.policy.reconnect_interval;
                self.primary_retry_at.get_or_insert_with(|| Instant::now() + reconnect_interval);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "No endpoint left to subscribe to");
                self.current = None;
                Err(e)
            }
        }
    }

    async fn return_to_primary_if_due(&mut self) {
        let due = self.primary_retry_at.is_some_and(|at| Instant::now() >= at);
        if !due || self.endpoint() == Some(0) {
            return;
        }

        match self.provider.call_endpoint(self.provider.primary(), subscribe_blocks).await {
            Ok(subscription) => {
                info!("Subscription back on the primary endpoint");
                self.current = Some((0, subscription));
                self.primary_retry_at = None;
                self.lags = 0;
            }
            Err(e) => {
                debug!(error = %e, "Primary endpoint still unavailable");
                let retry_at = Instant::now() + self.provider.policy.reconnect_interval;
                self.primary_retry_at = Some(retry_at);
            }
        }
    }

    /// A [`Stream`] of headers that ends after yielding its first error.
    #[must_use]
    pub fn into_stream(self) -> RobustSubscriptionStream<N> {
        RobustSubscriptionStream {
            next: ReusableBoxFuture::new(receive(self)),
            done: false,
        }
    }
}

type Received<N> = (Result<<N as Network>::HeaderResponse, Error>, RobustSubscription<N>);

async fn receive<N: Network>(mut subscription: RobustSubscription<N>) -> Received<N> {
    let header = subscription.recv().await;
    (header, subscription)
}

/// [`Stream`] adapter returned by [`RobustSubscription::into_stream`].
pub struct RobustSubscriptionStream<N: Network> {
    next: ReusableBoxFuture<'static, Received<N>>,
    done: bool,
}

impl<N: Network> Stream for RobustSubscriptionStream<N> {
    type Item = Result<N::HeaderResponse, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        let (header, subscription) = ready!(self.next.poll(cx));
        if header.is_ok() {
            self.next.set(receive(subscription));
        } else {
            self.done = true;
        }
        Poll::Ready(Some(header))
    }
}
