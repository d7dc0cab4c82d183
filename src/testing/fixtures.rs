//! Messenger log and receipt builders
//!
//! Logs are produced with the same `sol!` types the codec decodes with, so a
//! fixture that encodes is a fixture the codec can read back.

use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::sol_types::SolEvent;

use crate::contracts::{ICrossDomainMessenger, IOvmCrossDomainMessenger};
use crate::hash::encode_cross_domain_message_v0;
use crate::types::{LogEntry, MessageId, MessengerRoute, Receipt};

/// L1 chain id of the local devnet
pub const TEST_L1_CHAIN_ID: u64 = 31337;
/// L2 chain id of the local devnet
pub const TEST_L2_CHAIN_ID: u64 = 420;
/// L2 messenger predeploy
pub const TEST_L2_MESSENGER: Address = address!("4200000000000000000000000000000000000007");
/// Arbitrary L1 messenger proxy
pub const TEST_L1_MESSENGER: Address = address!("1111111111111111111111111111111111111111");

/// Deposit route (L1 -> L2) of the local devnet
pub fn test_route() -> MessengerRoute {
    MessengerRoute {
        source_chain_id: TEST_L1_CHAIN_ID,
        source_messenger: TEST_L1_MESSENGER,
        dest_chain_id: TEST_L2_CHAIN_ID,
        dest_messenger: TEST_L2_MESSENGER,
    }
}

/// Fields of one `sendMessage` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessageSpec {
    pub sender: Address,
    pub target: Address,
    pub payload: Bytes,
    /// Versioned nonce as emitted
    pub nonce: U256,
    pub value: U256,
    pub gas_limit: U256,
}

impl Default for SentMessageSpec {
    fn default() -> Self {
        Self {
            sender: Address::repeat_byte(0xaa),
            target: Address::repeat_byte(0xbb),
            payload: Bytes::from(vec![0x01]),
            nonce: U256::from(7u64),
            value: U256::ZERO,
            gas_limit: U256::from(100_000u64),
        }
    }
}

/// Deterministic transaction hash for fixture logs in `block`
pub fn fixture_tx_hash(block: u64) -> B256 {
    B256::left_padding_from(&block.to_be_bytes())
}

fn entry(address: Address, data: alloy::primitives::LogData, block: u64, log_index: u64) -> LogEntry {
    LogEntry {
        address,
        topics: data.topics().to_vec(),
        data: data.data,
        block_number: Some(block),
        tx_hash: Some(fixture_tx_hash(block)),
        log_index: Some(log_index),
    }
}

/// Bedrock `SentMessage` + `SentMessageExtension1` pair from the route's source messenger
pub fn sent_message_logs(
    route: &MessengerRoute,
    spec: &SentMessageSpec,
    block: u64,
    first_log_index: u64,
) -> Vec<LogEntry> {
    let sent = ICrossDomainMessenger::SentMessage {
        target: spec.target,
        sender: spec.sender,
        message: spec.payload.clone(),
        messageNonce: spec.nonce,
        gasLimit: spec.gas_limit,
    };
    let extension = ICrossDomainMessenger::SentMessageExtension1 {
        sender: spec.sender,
        value: spec.value,
    };

    vec![
        entry(route.source_messenger, sent.encode_log_data(), block, first_log_index),
        entry(
            route.source_messenger,
            extension.encode_log_data(),
            block,
            first_log_index + 1,
        ),
    ]
}

/// Legacy OVM `SentMessage(bytes)` carrying the V0 relay calldata
pub fn ovm_sent_message_log(
    route: &MessengerRoute,
    spec: &SentMessageSpec,
    block: u64,
    log_index: u64,
) -> LogEntry {
    let calldata = encode_cross_domain_message_v0(spec.target, spec.sender, &spec.payload, spec.nonce);
    let sent = IOvmCrossDomainMessenger::SentMessage {
        message: Bytes::from(calldata),
    };
    entry(route.source_messenger, sent.encode_log_data(), block, log_index)
}

/// Bedrock `RelayedMessage` (or `FailedRelayedMessage`) from the route's destination messenger
pub fn relayed_message_log(
    route: &MessengerRoute,
    id: MessageId,
    block: u64,
    log_index: u64,
    success: bool,
) -> LogEntry {
    let data = if success {
        ICrossDomainMessenger::RelayedMessage { msgHash: id.0 }.encode_log_data()
    } else {
        ICrossDomainMessenger::FailedRelayedMessage { msgHash: id.0 }.encode_log_data()
    };
    entry(route.dest_messenger, data, block, log_index)
}

/// Legacy OVM `RelayedMessage` with the hash in the log data
pub fn ovm_relayed_message_log(
    route: &MessengerRoute,
    id: MessageId,
    block: u64,
    log_index: u64,
) -> LogEntry {
    let data = IOvmCrossDomainMessenger::RelayedMessage { msgHash: id.0 }.encode_log_data();
    entry(route.dest_messenger, data, block, log_index)
}

/// Successful source receipt emitting one Bedrock message per `SentMessageSpec`, in order
pub fn message_receipt(route: &MessengerRoute, specs: &[SentMessageSpec], block: u64) -> Receipt {
    let mut logs = Vec::new();
    for spec in specs {
        let next_index = logs.len() as u64;
        logs.extend(sent_message_logs(route, spec, block, next_index));
    }
    Receipt {
        tx_hash: fixture_tx_hash(block),
        block_number: Some(block),
        status: true,
        logs,
    }
}
