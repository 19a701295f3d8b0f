//! Contract binding: the event schema and address of a sync target, and schema-driven decoding
//! of raw logs into [`EventRecord`]s.

use std::collections::{BTreeMap, HashMap};

use alloy::{
    dyn_abi::{DynSolValue, EventExt},
    hex,
    json_abi::{Event, JsonAbi},
    primitives::{Address, B256, BlockNumber},
    rpc::types::Log,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::types::{EventFields, EventRecord};

/// Why a log could not be turned into an [`EventRecord`].
#[derive(Error, Debug)]
pub enum DecodeErrorKind {
    /// The log was returned without a field a mined log always carries.
    #[error("log is missing `{0}`")]
    MissingField(&'static str),

    /// The log has no topics, so there is no event selector to look up.
    #[error("log has no event selector")]
    MissingSelector,

    /// The selector does not match any non-anonymous event in the contract schema.
    #[error("no event in the contract schema has selector {0}")]
    UnknownEvent(B256),

    /// The log payload does not match the event's ABI.
    #[error("payload does not match `{event}`: {source}")]
    Abi {
        event: String,
        #[source]
        source: alloy::dyn_abi::Error,
    },
}

/// A log that failed to decode, with enough of its position to find it again.
#[derive(Error, Debug)]
#[error("cannot decode log {log_index:?} in block {block_number:?}: {kind}")]
pub struct DecodeError {
    pub block_number: Option<BlockNumber>,
    pub log_index: Option<u64>,
    #[source]
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    fn at(log: &Log, kind: DecodeErrorKind) -> Self {
        Self { block_number: log.block_number, log_index: log.log_index, kind }
    }
}

/// Errors raised while resolving a [`ContractDescriptor`] from a build artifact.
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("malformed contract artifact: {0}")]
    Artifact(#[from] serde_json::Error),

    #[error("contract is not deployed on network `{0}`")]
    UnknownNetwork(String),
}

#[derive(Deserialize)]
struct Artifact {
    abi: JsonAbi,
    #[serde(default)]
    networks: HashMap<String, ArtifactNetwork>,
}

#[derive(Deserialize)]
struct ArtifactNetwork {
    address: Address,
}

/// Immutable description of a sync target: where the contract lives and which events it emits.
#[derive(Clone, Debug)]
pub struct ContractDescriptor {
    address: Address,
    by_selector: HashMap<B256, Event>,
    schema: BTreeMap<String, Vec<String>>,
}

impl ContractDescriptor {
    /// Builds a descriptor from an already parsed ABI.
    ///
    /// Anonymous events carry no selector and cannot be told apart by topic, so they are left
    /// out of the schema.
    #[must_use]
    pub fn new(address: Address, abi: &JsonAbi) -> Self {
        let mut by_selector = HashMap::new();
        let mut schema = BTreeMap::new();

        for event in abi.events().filter(|event| !event.anonymous) {
            schema.insert(
                event.name.clone(),
                event.inputs.iter().map(|input| input.name.clone()).collect(),
            );
            by_selector.insert(event.selector(), event.clone());
        }

        Self { address, by_selector, schema }
    }

    /// Resolves a descriptor from a compiled contract artifact of the form
    /// `{ "abi": [...], "networks": { "<network id>": { "address": "0x..." } } }`.
    pub fn from_artifact(artifact: &str, network_id: &str) -> Result<Self, ContractError> {
        let artifact: Artifact = serde_json::from_str(artifact)?;
        let network = artifact
            .networks
            .get(network_id)
            .ok_or_else(|| ContractError::UnknownNetwork(network_id.to_owned()))?;

        Ok(Self::new(network.address, &artifact.abi))
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Names of all events this descriptor can decode, sorted.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.schema.keys().map(String::as_str)
    }

    /// Input names of `event_name`, in declaration order.
    #[must_use]
    pub fn input_names(&self, event_name: &str) -> Option<&[String]> {
        self.schema.get(event_name).map(Vec::as_slice)
    }

    /// Decodes `log` against the event whose selector matches its first topic.
    pub fn decode_log(&self, log: &Log) -> Result<EventRecord, DecodeError> {
        let fail = |kind| DecodeError::at(log, kind);
        let missing = |field| fail(DecodeErrorKind::MissingField(field));

        let block_number = log.block_number.ok_or_else(|| missing("blockNumber"))?;
        let log_index = log.log_index.ok_or_else(|| missing("logIndex"))?;
        let block_hash = log.block_hash.ok_or_else(|| missing("blockHash"))?;
        let transaction_hash = log.transaction_hash.ok_or_else(|| missing("transactionHash"))?;

        let selector = log
            .inner
            .data
            .topics()
            .first()
            .ok_or_else(|| fail(DecodeErrorKind::MissingSelector))?;
        let event = self
            .by_selector
            .get(selector)
            .ok_or_else(|| fail(DecodeErrorKind::UnknownEvent(*selector)))?;

        let decoded = event.decode_log(&log.inner.data).map_err(|source| {
            fail(DecodeErrorKind::Abi { event: event.signature(), source })
        })?;

        let mut indexed = decoded.indexed.iter();
        let mut body = decoded.body.iter();
        let mut fields = EventFields::new();
        for input in &event.inputs {
            let value = if input.indexed { indexed.next() } else { body.next() };
            if let Some(value) = value {
                fields.insert(input.name.clone(), to_json(value));
            }
        }

        Ok(EventRecord {
            event_name: event.name.clone(),
            block_number,
            block_hash,
            transaction_hash,
            log_index,
            fields,
        })
    }
}

/// Renders an ABI value the way JSON-RPC clients usually present them: integers as decimal
/// strings, byte strings as `0x` hex, addresses checksummed.
fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::Function(function) => Value::String(hex::encode_prefixed(function.as_slice())),
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(values)
        | DynSolValue::FixedArray(values)
        | DynSolValue::Tuple(values) => {
            Value::Array(values.iter().map(to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{other:?}")),
    }
}
