use std::time::Duration;

use alloy::primitives::{Address, BlockNumber};
use backon::ExponentialBuilder;

use crate::{
    SyncError,
    alert::{AlertSink, LogAlertSink},
    chain_reader::ChainReader,
    config::EventSyncConfig,
    contract::ContractDescriptor,
    range_scanner::DEFAULT_MAX_CHUNKS_PER_SCAN,
    robust_provider::RobustProvider,
    store::{CheckpointStore, scope_key},
    syncer::EventSyncer,
    types::SyncResult,
};

/// Default number of consecutive failed passes [`EventSyncer::run`] retries before giving up.
pub const DEFAULT_MAX_PASS_RETRIES: usize = 5;
/// Default delay before the first retry of a failed pass.
pub const DEFAULT_RETRY_MIN_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(60);

/// Builder for an [`EventSyncer`].
#[derive(Clone, Debug)]
pub struct EventSyncerBuilder {
    events_sync_step: i64,
    starting_block: BlockNumber,
    buffer_blocks: u64,
    max_chunks_per_scan: usize,
    monitor_account: Option<Address>,
    max_pass_retries: usize,
    retry_min_delay: Duration,
}

impl Default for EventSyncerBuilder {
    fn default() -> Self {
        Self {
            events_sync_step: 0,
            starting_block: 0,
            buffer_blocks: 0,
            max_chunks_per_scan: DEFAULT_MAX_CHUNKS_PER_SCAN,
            monitor_account: None,
            max_pass_retries: DEFAULT_MAX_PASS_RETRIES,
            retry_min_delay: DEFAULT_RETRY_MIN_DELAY,
        }
    }
}

impl EventSyncerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the scan settings from `config`.
    #[must_use]
    pub fn from_config(config: &EventSyncConfig) -> Self {
        let builder = Self::new()
            .events_sync_step(config.events_sync_step)
            .starting_block(config.event_sync_starting_point)
            .buffer_blocks(config.buffer_blocks)
            .max_chunks_per_scan(config.max_chunks_per_scan);

        match config.monitor_account {
            Some(account) => builder.monitor_account(account),
            None => builder,
        }
    }

    /// Blocks per log query. Zero or less queries each pass range at once.
    #[must_use]
    pub fn events_sync_step(mut self, step: i64) -> Self {
        self.events_sync_step = step;
        self
    }

    /// Lowest block ever scanned, usually the contract's deployment block.
    #[must_use]
    pub fn starting_block(mut self, block: BlockNumber) -> Self {
        self.starting_block = block;
        self
    }

    /// Number of blocks to stay behind the node's head.
    #[must_use]
    pub fn buffer_blocks(mut self, blocks: u64) -> Self {
        self.buffer_blocks = blocks;
        self
    }

    /// Number of log queries a single pass may issue.
    #[must_use]
    pub fn max_chunks_per_scan(mut self, max_chunks: usize) -> Self {
        self.max_chunks_per_scan = max_chunks;
        self
    }

    #[must_use]
    pub fn monitor_account(mut self, account: Address) -> Self {
        self.monitor_account = Some(account);
        self
    }

    /// Consecutive failed passes tolerated by [`EventSyncer::run`].
    #[must_use]
    pub fn max_pass_retries(mut self, retries: usize) -> Self {
        self.max_pass_retries = retries;
        self
    }

    /// Delay before the first retry of a failed pass, doubled on every further failure.
    #[must_use]
    pub fn retry_min_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    /// Builds a syncer that reports failures to the log.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidMaxChunksPerScan`] if the chunk budget is zero.
    pub fn build<R: ChainReader>(
        self,
        reader: R,
        contract: ContractDescriptor,
        store: CheckpointStore,
    ) -> SyncResult<EventSyncer<R>> {
        self.build_with_alerts(reader, contract, store, LogAlertSink)
    }

    /// Builds a syncer that reports failures to `alerts`.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidMaxChunksPerScan`] if the chunk budget is zero.
    pub fn build_with_alerts<R: ChainReader, A: AlertSink>(
        self,
        reader: R,
        contract: ContractDescriptor,
        store: CheckpointStore,
        alerts: A,
    ) -> SyncResult<EventSyncer<R, A>> {
        if self.max_chunks_per_scan == 0 {
            return Err(SyncError::InvalidMaxChunksPerScan);
        }

        let retry = ExponentialBuilder::default()
            .with_min_delay(self.retry_min_delay)
            .with_max_delay(DEFAULT_RETRY_MAX_DELAY.max(self.retry_min_delay))
            .with_max_times(self.max_pass_retries);

        info!(
            scope = %store.scope(),
            address = %contract.address(),
            starting_block = self.starting_block,
            step = self.events_sync_step,
            buffer_blocks = self.buffer_blocks,
            "Event syncer ready"
        );

        Ok(EventSyncer {
            reader,
            contract,
            store,
            alerts,
            events_sync_step: self.events_sync_step,
            starting_block: self.starting_block,
            buffer_blocks: self.buffer_blocks,
            max_chunks_per_scan: self.max_chunks_per_scan,
            monitor_account: self.monitor_account,
            retry,
        })
    }
}

impl EventSyncer<RobustProvider> {
    /// Wires a complete scope from `config` and a contract build artifact: connects the
    /// providers, resolves the contract for the configured network and opens the store.
    pub async fn from_config(config: &EventSyncConfig, artifact: &str) -> SyncResult<Self> {
        config.validate()?;

        let contract = ContractDescriptor::from_artifact(artifact, &config.network_id)?;
        let scope = scope_key(&config.store_name, &config.network_id, contract.address());
        let store = CheckpointStore::connect(&config.store_url, scope).await?;
        let provider = config.provider_builder().build().await?;

        EventSyncerBuilder::from_config(config).build(provider, contract, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockChain, test_artifact, test_contract};

    const TOKEN: Address = Address::new([0xaa; 20]);

    async fn store() -> CheckpointStore {
        CheckpointStore::connect("sqlite::memory:", "builder").await.expect("in-memory store")
    }

    #[tokio::test]
    async fn zero_chunk_budget_is_rejected() {
        let result = EventSyncerBuilder::new().max_chunks_per_scan(0).build(
            MockChain::default(),
            test_contract(TOKEN),
            store().await,
        );

        assert!(matches!(result, Err(SyncError::InvalidMaxChunksPerScan)));
    }

    #[tokio::test]
    async fn config_settings_reach_the_syncer() -> anyhow::Result<()> {
        let mut config = EventSyncConfig::new("15", "http://localhost:8545");
        config.events_sync_step = 100;
        config.event_sync_starting_point = 42;
        config.buffer_blocks = 6;
        config.monitor_account = Some(Address::new([0x11; 20]));

        let syncer = EventSyncerBuilder::from_config(&config).build(
            MockChain::default(),
            test_contract(TOKEN),
            store().await,
        )?;

        assert_eq!(syncer.events_sync_step, 100);
        assert_eq!(syncer.starting_block, 42);
        assert_eq!(syncer.buffer_blocks, 6);
        assert_eq!(syncer.monitor_account(), Some(Address::new([0x11; 20])));

        Ok(())
    }

    #[tokio::test]
    async fn from_config_scopes_store_by_network_and_address() -> anyhow::Result<()> {
        let mut config = EventSyncConfig::new("15", "http://localhost:8545");
        config.store_url = "sqlite::memory:".to_owned();
        config.store_name = "bridge".to_owned();

        let syncer = EventSyncer::from_config(&config, &test_artifact("15", TOKEN)).await?;

        assert_eq!(syncer.store().scope(), format!("bridge/15/{TOKEN}"));
        assert_eq!(syncer.contract().address(), TOKEN);

        Ok(())
    }

    #[tokio::test]
    async fn from_config_rejects_undeployed_network() {
        let mut config = EventSyncConfig::new("1", "http://localhost:8545");
        config.store_url = "sqlite::memory:".to_owned();

        let result = EventSyncer::from_config(&config, &test_artifact("15", TOKEN)).await;

        assert!(matches!(result, Err(SyncError::Contract(_))));
    }
}
