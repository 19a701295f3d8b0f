#![allow(dead_code)]

use std::{
    ops::RangeInclusive,
    sync::{Arc, Mutex},
};

use alloy::{
    primitives::{Address, B256, BlockNumber, Bytes, LogData, TxHash, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use event_sync::{
    BlockRef, BoxError, ChainReader, CheckpointStore, EventFields, EventSyncer,
    EventSyncerBuilder, robust_provider,
    test_utils::{Deposit, MockChain, mock_log, test_contract, transfer_log},
};
use tokio::sync::Notify;

pub const TOKEN: Address = Address::new([0xaa; 20]);

/// `(event name, value or amount)` of every event a handler accepted, in call order.
pub type Seen = Arc<Mutex<Vec<(String, String)>>>;

/// Routes the crate's logs to the test output. `RUST_LOG=event_sync=debug` shows each pass.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn memory_store(scope: &str) -> anyhow::Result<CheckpointStore> {
    Ok(CheckpointStore::connect("sqlite::memory:", scope).await?)
}

pub async fn setup_syncer(
    chain: &MockChain,
    builder: EventSyncerBuilder,
) -> anyhow::Result<EventSyncer<MockChain>> {
    init_tracing();
    let store = memory_store("integration/15/0xaa").await?;
    Ok(builder.build(chain.clone(), test_contract(TOKEN), store)?)
}

fn amount(fields: &EventFields) -> String {
    fields
        .get("value")
        .or_else(|| fields.get("amount"))
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_owned()
}

pub fn recorder(seen: Seen) -> impl FnMut(&str, &EventFields, TxHash) -> Result<(), BoxError> {
    move |name, fields, _| {
        seen.lock().unwrap().push((name.to_owned(), amount(fields)));
        Ok(())
    }
}

/// Records like [`recorder`] but rejects the first event carrying `poisoned` as its amount.
pub fn failing_once(
    seen: Seen,
    poisoned: &'static str,
) -> impl FnMut(&str, &EventFields, TxHash) -> Result<(), BoxError> {
    let mut failed = false;
    move |name, fields, _| {
        let value = amount(fields);
        seen.lock().unwrap().push((name.to_owned(), value.clone()));
        if value == poisoned && !failed {
            failed = true;
            return Err(format!("rejected {value}").into());
        }
        Ok(())
    }
}

pub fn deposit_log(block: u64, log_index: u64, amount: u64, memo: &str) -> Log {
    let event = Deposit {
        account: Address::with_last_byte(3),
        amount: U256::from(amount),
        memo: memo.to_owned(),
    };
    mock_log(TOKEN, block, log_index, event.encode_log_data())
}

/// A log whose selector matches no event of the test contract.
pub fn unknown_log(block: u64, log_index: u64) -> Log {
    let data = LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Bytes::new());
    mock_log(TOKEN, block, log_index, data)
}

pub fn values(seen: &Seen) -> Vec<String> {
    seen.lock().unwrap().iter().map(|(_, value)| value.clone()).collect()
}

/// Values carried by [`six_transfers`], in chain order.
pub const SIX_VALUES: [&str; 6] = ["1", "2", "3", "4", "5", "6"];

/// Transfers at blocks 2, 4, 4, 9, 13 and 17 carrying the values `1..=6`.
pub fn six_transfers() -> Vec<Log> {
    vec![
        transfer_log(TOKEN, 2, 0, 1),
        transfer_log(TOKEN, 4, 0, 2),
        transfer_log(TOKEN, 4, 1, 3),
        transfer_log(TOKEN, 9, 0, 4),
        transfer_log(TOKEN, 13, 0, 5),
        transfer_log(TOKEN, 17, 0, 6),
    ]
}

/// A [`MockChain`] whose log queries can be made to hang, so a pass can be dropped while it
/// waits on the node.
#[derive(Clone)]
pub struct HeldLogs {
    chain: MockChain,
    hold_from: Arc<Mutex<Option<BlockNumber>>>,
    reached: Arc<Notify>,
}

impl HeldLogs {
    pub fn new(chain: MockChain) -> Self {
        Self { chain, hold_from: Arc::default(), reached: Arc::new(Notify::new()) }
    }

    /// Log queries starting at or after `block` never complete. `None` lets every query through.
    pub fn hold_from(&self, block: Option<BlockNumber>) {
        *self.hold_from.lock().unwrap() = block;
    }

    /// Resolves once a query has been held.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }
}

impl ChainReader for HeldLogs {
    async fn get_block(
        &self,
        number: BlockNumber,
    ) -> Result<Option<BlockRef>, robust_provider::Error> {
        self.chain.get_block(number).await
    }

    async fn get_logs(
        &self,
        address: Address,
        range: RangeInclusive<BlockNumber>,
    ) -> Result<Vec<Log>, robust_provider::Error> {
        let held = self.hold_from.lock().unwrap().is_some_and(|block| *range.start() >= block);
        if held {
            self.reached.notify_one();
            std::future::pending::<()>().await;
        }
        self.chain.get_logs(address, range).await
    }

    async fn get_latest_block_hint(&self) -> Result<BlockNumber, robust_provider::Error> {
        self.chain.get_latest_block_hint().await
    }
}
