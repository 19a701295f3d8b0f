use std::{pin::Pin, time::Duration};

use alloy::{
    network::{Ethereum, Network},
    providers::RootProvider,
    transports::http::reqwest::Url,
};

use crate::robust_provider::{
    Error, RobustProvider, provider::CallPolicy, subscription::DEFAULT_RECONNECT_INTERVAL,
};

/// Default time budget of one call on one endpoint, retries included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default time a subscription may go without a new header before switching endpoints.
pub const DEFAULT_SUBSCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default number of retries per call and endpoint.
pub const DEFAULT_MAX_RETRIES: usize = 3;
/// Default delay before the first retry.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

/// Anything that can become a connected Alloy [`RootProvider`], such as an RPC URL taken from
/// configuration or an already built provider.
pub trait IntoRootProvider<N: Network = Ethereum> {
    /// # Errors
    ///
    /// If the endpoint cannot be reached.
    fn into_root_provider(self) -> impl Future<Output = Result<RootProvider<N>, Error>> + Send;
}

impl<N: Network> IntoRootProvider<N> for RootProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(self)
    }
}

impl<N: Network> IntoRootProvider<N> for RobustProvider<N> {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(self.primary)
    }
}

impl<N: Network> IntoRootProvider<N> for &str {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        Ok(RootProvider::connect(self).await?)
    }
}

impl<N: Network> IntoRootProvider<N> for String {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        self.as_str().into_root_provider().await
    }
}

impl<N: Network> IntoRootProvider<N> for Url {
    async fn into_root_provider(self) -> Result<RootProvider<N>, Error> {
        self.as_str().into_root_provider().await
    }
}

type PendingProvider<N> = Pin<Box<dyn Future<Output = Result<RootProvider<N>, Error>> + Send>>;

/// Builder for a [`RobustProvider`].
pub struct RobustProviderBuilder<N: Network, P: IntoRootProvider<N>> {
    primary: P,
    fallbacks: Vec<PendingProvider<N>>,
    policy: CallPolicy,
}

impl<N: Network, P: IntoRootProvider<N>> RobustProviderBuilder<N, P> {
    /// Starts a builder with `provider` as the primary endpoint and default timeouts.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            primary: provider,
            fallbacks: Vec::new(),
            policy: CallPolicy {
                call_timeout: DEFAULT_CALL_TIMEOUT,
                subscription_timeout: DEFAULT_SUBSCRIPTION_TIMEOUT,
                max_retries: DEFAULT_MAX_RETRIES,
                min_delay: DEFAULT_MIN_DELAY,
                reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            },
        }
    }

    /// Appends a fallback endpoint. Fallbacks are tried in the order they were added.
    #[must_use]
    pub fn fallback<F: IntoRootProvider<N> + Send + 'static>(mut self, provider: F) -> Self {
        self.fallbacks.push(Box::pin(provider.into_root_provider()));
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.policy.call_timeout = timeout;
        self
    }

    /// Should be well above the chain's block time.
    #[must_use]
    pub fn subscription_timeout(mut self, timeout: Duration) -> Self {
        self.policy.subscription_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn min_delay(mut self, min_delay: Duration) -> Self {
        self.policy.min_delay = min_delay;
        self
    }

    #[must_use]
    pub fn reconnect_interval(mut self, reconnect_interval: Duration) -> Self {
        self.policy.reconnect_interval = reconnect_interval;
        self
    }

    /// Connects every endpoint.
    ///
    /// # Errors
    ///
    /// If any endpoint cannot be reached.
    pub async fn build(self) -> Result<RobustProvider<N>, Error> {
        let primary = self.primary.into_root_provider().await?;

        let mut fallbacks = Vec::with_capacity(self.fallbacks.len());
        for (index, pending) in self.fallbacks.into_iter().enumerate() {
            trace!(endpoint = index + 1, "Connecting fallback endpoint");
            fallbacks.push(pending.await?);
        }

        info!(
            fallbacks = fallbacks.len(),
            call_timeout_ms = self.policy.call_timeout.as_millis(),
            max_retries = self.policy.max_retries,
            "RPC endpoints connected"
        );

        Ok(RobustProvider { primary, fallbacks, policy: self.policy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_endpoints_connect_lazily() -> anyhow::Result<()> {
        let robust = RobustProviderBuilder::<Ethereum, _>::new("http://localhost:8545")
            .fallback("http://localhost:8546".to_owned())
            .fallback(Url::parse("http://localhost:8547")?)
            .call_timeout(Duration::from_secs(5))
            .max_retries(1)
            .build()
            .await?;

        assert_eq!(robust.fallback_count(), 2);
        assert_eq!(robust.policy.call_timeout, Duration::from_secs(5));
        assert_eq!(robust.policy.max_retries, 1);
        assert_eq!(robust.policy.min_delay, DEFAULT_MIN_DELAY);

        Ok(())
    }

    #[tokio::test]
    async fn robust_provider_reuses_its_primary() -> anyhow::Result<()> {
        let first = RobustProviderBuilder::<Ethereum, _>::new("http://localhost:8545")
            .build()
            .await?;

        let second =
            RobustProviderBuilder::new(first).reconnect_interval(Duration::ZERO).build().await?;

        assert_eq!(second.fallback_count(), 0);
        assert_eq!(second.policy.reconnect_interval, Duration::ZERO);

        Ok(())
    }
}
