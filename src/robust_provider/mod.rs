//! Retrying, failing-over access to EVM JSON-RPC endpoints.
//!
//! [`RobustProvider`] wraps a primary Alloy [`RootProvider`](alloy::providers::RootProvider)
//! and any number of fallbacks. Each call is retried with exponential backoff within a time
//! budget per endpoint, and a stalled node surfaces as [`Error::Timeout`] instead of hanging a
//! sync pass. It implements [`ChainReader`](crate::ChainReader), the syncer's only view of the
//! chain.
//!
//! ```rust,no_run
//! use event_sync::robust_provider::{RobustProvider, RobustProviderBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider: RobustProvider = RobustProviderBuilder::new("ws://localhost:8545")
//!     .fallback("https://rpc.example.org")
//!     .call_timeout(Duration::from_secs(30))
//!     .build()
//!     .await?;
//!
//! let head = provider.get_block_number().await?;
//! # let _ = head;
//! # Ok(()) }
//! ```

mod builder;
mod provider;
mod subscription;

pub use builder::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, DEFAULT_SUBSCRIPTION_TIMEOUT,
    IntoRootProvider, RobustProviderBuilder,
};
pub use provider::{Error, RobustProvider};
pub use subscription::{DEFAULT_RECONNECT_INTERVAL, RobustSubscription, RobustSubscriptionStream};
