//! Scriptable chain and event fixtures for exercising the sync engine without a node.

pub mod macros;
mod mock_chain;

pub use mock_chain::{MockChain, mock_block_hash, mock_log, mock_tx_hash};

use std::time::Duration;

use alloy::{primitives::Address, rpc::types::Log, sol, sol_types::SolEvent};
use tokio_stream::{Stream, StreamExt};

use crate::contract::ContractDescriptor;

/// How long the stream assertions wait for an item.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(5);

sol! {
    #[derive(Debug, PartialEq, Eq)]
    event Transfer(address indexed from, address indexed to, uint256 value);

    #[derive(Debug, PartialEq, Eq)]
    event Deposit(address indexed account, uint256 amount, string memo);
}

/// JSON ABI matching [`Transfer`] and [`Deposit`].
pub const TEST_ABI: &str = r#"[
  {
    "type": "event",
    "name": "Transfer",
    "anonymous": false,
    "inputs": [
      { "name": "from", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "to", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "value", "type": "uint256", "indexed": false, "internalType": "uint256" }
    ]
  },
  {
    "type": "event",
    "name": "Deposit",
    "anonymous": false,
    "inputs": [
      { "name": "account", "type": "address", "indexed": true, "internalType": "address" },
      { "name": "amount", "type": "uint256", "indexed": false, "internalType": "uint256" },
      { "name": "memo", "type": "string", "indexed": false, "internalType": "string" }
    ]
  }
]"#;

/// A descriptor for a contract at `address` emitting the test events.
///
/// # Panics
///
/// Never in practice, [`TEST_ABI`] is a constant.
#[must_use]
pub fn test_contract(address: Address) -> ContractDescriptor {
    let abi = serde_json::from_str(TEST_ABI).expect("TEST_ABI is valid");
    ContractDescriptor::new(address, &abi)
}

/// A build artifact deploying the test contract at `address` on `network_id`.
#[must_use]
pub fn test_artifact(network_id: &str, address: Address) -> String {
    let abi: serde_json::Value = serde_json::from_str(TEST_ABI).expect("TEST_ABI is valid");
    serde_json::json!({
        "contractName": "TestToken",
        "abi": abi,
        "networks": { network_id: { "address": address } },
    })
    .to_string()
}

/// A mined `Transfer(0x..01 -> 0x..02, value)` log at `block`/`log_index`.
#[must_use]
pub fn transfer_log(address: Address, block: u64, log_index: u64, value: u64) -> Log {
    let event = Transfer {
        from: Address::with_last_byte(1),
        to: Address::with_last_byte(2),
        value: alloy::primitives::U256::from(value),
    };
    mock_log(address, block, log_index, event.encode_log_data())
}

/// The next item of `stream`, `None` once it has ended.
///
/// # Panics
///
/// If nothing arrives within [`STREAM_TIMEOUT`].
pub async fn next_within<S: Stream + Unpin>(stream: &mut S) -> Option<S::Item> {
    tokio::time::timeout(STREAM_TIMEOUT, stream.next())
        .await
        .expect("timed out waiting for the stream")
}
