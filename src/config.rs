//! Serde configuration for a sync scope.
//!
//! Keys are camelCase, so existing deployment files can be loaded as they are:
//!
//! ```json
//! {
//!   "networkId": "15",
//!   "providerSource": "ws://localhost:8546",
//!   "fallbackSources": ["http://localhost:8545"],
//!   "storeUrl": "sqlite://bridge.db",
//!   "storeName": "bridge",
//!   "eventsSyncStep": 1000,
//!   "eventSyncStartingPoint": 3200000,
//!   "bufferBlocks": 12
//! }
//! ```

use std::time::Duration;

use alloy::{network::Network, primitives::Address};
use serde::{Deserialize, Serialize};

use crate::{
    SyncError,
    range_scanner::DEFAULT_MAX_CHUNKS_PER_SCAN,
    robust_provider::{
        DEFAULT_CALL_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, DEFAULT_SUBSCRIPTION_TIMEOUT,
        RobustProviderBuilder,
    },
};

/// Everything needed to sync one contract on one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSyncConfig {
    /// Network the contract artifact is resolved for.
    pub network_id: String,

    /// Primary RPC endpoint (`ws://`, `wss://`, `http://`, `https://` or an IPC path).
    pub provider_source: String,

    /// Endpoints tried in order when the primary one fails.
    #[serde(default)]
    pub fallback_sources: Vec<String>,

    /// Account the application acts for, if any.
    #[serde(default)]
    pub monitor_account: Option<Address>,

    /// SQLite database holding checkpoints and event history.
    #[serde(default = "default_store_url")]
    pub store_url: String,

    /// Namespace separating deployments that share a database.
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Blocks per `eth_getLogs` window, `0` or less for a single unbounded window.
    #[serde(default)]
    pub events_sync_step: i64,

    /// First block worth scanning, usually the contract's deployment block.
    #[serde(default)]
    pub event_sync_starting_point: u64,

    /// Blocks kept between the node's head and the scan ceiling.
    #[serde(default)]
    pub buffer_blocks: u64,

    /// Windows scanned per sync pass.
    #[serde(default = "default_max_chunks_per_scan")]
    pub max_chunks_per_scan: usize,

    #[serde(default)]
    pub rpc: RpcConfig,
}

fn default_store_url() -> String {
    "sqlite://event-sync.db".to_string()
}

fn default_store_name() -> String {
    "event-sync".to_string()
}

fn default_max_chunks_per_scan() -> usize {
    DEFAULT_MAX_CHUNKS_PER_SCAN
}

/// Retry and timeout settings for RPC calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcConfig {
    pub call_timeout_secs: u64,
    pub subscription_timeout_secs: u64,
    pub max_retries: usize,
    pub min_delay_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            subscription_timeout_secs: DEFAULT_SUBSCRIPTION_TIMEOUT.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay_ms: u64::try_from(DEFAULT_MIN_DELAY.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl EventSyncConfig {
    /// Config with defaults for everything but the network and endpoint.
    pub fn new(network_id: impl Into<String>, provider_source: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            provider_source: provider_source.into(),
            fallback_sources: Vec::new(),
            monitor_account: None,
            store_url: default_store_url(),
            store_name: default_store_name(),
            events_sync_step: 0,
            event_sync_starting_point: 0,
            buffer_blocks: 0,
            max_chunks_per_scan: DEFAULT_MAX_CHUNKS_PER_SCAN,
            rpc: RpcConfig::default(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let config: Self = serde_json::from_str(json).map_err(SyncError::Config)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_chunks_per_scan == 0 {
            return Err(SyncError::InvalidMaxChunksPerScan);
        }
        Ok(())
    }

    /// A provider builder for the configured endpoints and retry settings.
    #[must_use]
    pub fn provider_builder<N: Network>(&self) -> RobustProviderBuilder<N, String> {
        let builder = self.fallback_sources.iter().fold(
            RobustProviderBuilder::new(self.provider_source.clone()),
            |builder, source| builder.fallback(source.clone()),
        );

        builder
            .call_timeout(Duration::from_secs(self.rpc.call_timeout_secs))
            .subscription_timeout(Duration::from_secs(self.rpc.subscription_timeout_secs))
            .max_retries(self.rpc.max_retries)
            .min_delay(Duration::from_millis(self.rpc.min_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_takes_defaults() -> anyhow::Result<()> {
        let config = EventSyncConfig::from_json(
            r#"{ "networkId": "15", "providerSource": "ws://localhost:8546" }"#,
        )?;

        assert_eq!(config.network_id, "15");
        assert!(config.fallback_sources.is_empty());
        assert_eq!(config.monitor_account, None);
        assert_eq!(config.store_name, "event-sync");
        assert_eq!(config.events_sync_step, 0);
        assert_eq!(config.event_sync_starting_point, 0);
        assert_eq!(config.buffer_blocks, 0);
        assert_eq!(config.max_chunks_per_scan, 10);
        assert_eq!(config.rpc, RpcConfig::default());
        assert_eq!(config.rpc.min_delay_ms, 1000);

        Ok(())
    }

    #[test]
    fn camel_case_keys_are_read() -> anyhow::Result<()> {
        let config = EventSyncConfig::from_json(
            r#"{
                "networkId": "1337",
                "providerSource": "http://localhost:8545",
                "fallbackSources": ["http://localhost:8546"],
                "monitorAccount": "0x52908400098527886E0F7030069857D2E4169EE7",
                "storeUrl": "sqlite::memory:",
                "storeName": "bridge",
                "eventsSyncStep": -1,
                "eventSyncStartingPoint": 3200000,
                "bufferBlocks": 12,
                "maxChunksPerScan": 4,
                "rpc": { "maxRetries": 7 }
            }"#,
        )?;

        assert_eq!(config.fallback_sources, vec!["http://localhost:8546".to_owned()]);
        assert!(config.monitor_account.is_some());
        assert_eq!(config.store_url, "sqlite::memory:");
        assert_eq!(config.events_sync_step, -1);
        assert_eq!(config.event_sync_starting_point, 3_200_000);
        assert_eq!(config.buffer_blocks, 12);
        assert_eq!(config.max_chunks_per_scan, 4);
        assert_eq!(config.rpc.max_retries, 7);
        assert_eq!(config.rpc.call_timeout_secs, 60);

        Ok(())
    }

    #[test]
    fn zero_chunks_per_scan_is_rejected() {
        let result = EventSyncConfig::from_json(
            r#"{ "networkId": "15", "providerSource": "x", "maxChunksPerScan": 0 }"#,
        );

        assert!(matches!(result, Err(SyncError::InvalidMaxChunksPerScan)));
    }

    #[test]
    fn missing_endpoint_is_a_parse_error() {
        let result = EventSyncConfig::from_json(r#"{ "networkId": "15" }"#);

        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn new_matches_document_defaults() -> anyhow::Result<()> {
        let parsed = EventSyncConfig::from_json(r#"{ "networkId": "15", "providerSource": "x" }"#)?;
        let built = EventSyncConfig::new("15", "x");

        assert_eq!(serde_json::to_value(&parsed)?, serde_json::to_value(&built)?);

        Ok(())
    }
}
