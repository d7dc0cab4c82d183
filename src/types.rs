//! Common types for cross-domain message correlation
//!
//! The chain-facing types (`Receipt`, `LogEntry`, `LogFilter`) are deliberately
//! narrow: they carry only what the codec and poller read, so any chain client
//! can be adapted to [`crate::source::ChainLogSource`].

use alloy::primitives::{Address, Bytes, B256, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FailureReason;

// ============================================================================
// Message Identity
// ============================================================================

/// Canonical 32-byte message hash
///
/// The same value the destination messenger stores in `successfulMessages`
/// and emits in `RelayedMessage(bytes32 msgHash)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub B256);

impl MessageId {
    /// Create from 32 raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        MessageId(B256::from(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(eyre!("MessageId must be 32 bytes, got {}", bytes.len()));
        }
        Ok(MessageId(B256::from_slice(&bytes)))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<B256> for MessageId {
    fn from(hash: B256) -> Self {
        MessageId(hash)
    }
}

impl From<[u8; 32]> for MessageId {
    fn from(bytes: [u8; 32]) -> Self {
        MessageId::from_bytes(bytes)
    }
}

/// Messenger encoding version, carried in the upper two bytes of the nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageVersion {
    /// Legacy `relayMessage(address,address,bytes,uint256)` encoding
    V0,
    /// Bedrock `relayMessage(uint256,address,address,uint256,uint256,bytes)` encoding
    V1,
}

impl MessageVersion {
    pub fn from_u16(version: u16) -> Option<Self> {
        match version {
            0 => Some(MessageVersion::V0),
            1 => Some(MessageVersion::V1),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            MessageVersion::V0 => 0,
            MessageVersion::V1 => 1,
        }
    }
}

/// A message emitted by the source chain's messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    /// Chain the message was sent from
    pub source_chain_id: u64,
    /// Chain expected to relay the message
    pub dest_chain_id: u64,
    /// Contract or account that called `sendMessage`
    pub sender: Address,
    /// Contract the message will be delivered to
    pub target: Address,
    /// Opaque calldata for the target
    pub payload: Bytes,
    /// Versioned messenger nonce, exactly as emitted
    pub nonce: U256,
    /// ETH value attached (`SentMessageExtension1`), zero when absent
    pub value: U256,
    /// Minimum gas limit requested by the sender
    pub gas_limit: U256,
    /// Encoding version decoded from the nonce
    pub version: MessageVersion,
    /// Relay calldata exactly as an OVM messenger emitted it; hashed as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_calldata: Option<Bytes>,
}

impl BridgeMessage {
    /// Canonical message hash (see [`crate::codec::identify`])
    pub fn id(&self) -> MessageId {
        crate::codec::identify(self)
    }
}

/// Destination-chain proof that a message was consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub message_id: MessageId,
    /// Transaction that executed the relay
    pub dest_tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    /// `false` when the messenger emitted `FailedRelayedMessage`
    pub success: bool,
}

// ============================================================================
// Chain Read Types
// ============================================================================

/// A single event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    /// `None` for logs from pending blocks
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl LogEntry {
    /// Event signature hash
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Transaction receipt reduced to what correlation needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    /// Execution status (`true` = success)
    pub status: bool,
    /// Logs in emission order
    pub logs: Vec<LogEntry>,
}

/// `eth_getLogs` filter: one address, a set of accepted topic0 values, an inclusive block range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    /// Accepted event signatures; empty accepts any
    pub event_signatures: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            event_signatures: Vec::new(),
            from_block: 0,
            to_block: 0,
        }
    }

    pub fn event_signatures(mut self, signatures: impl IntoIterator<Item = B256>) -> Self {
        self.event_signatures = signatures.into_iter().collect();
        self
    }

    pub fn block_range(mut self, from_block: u64, to_block: u64) -> Self {
        self.from_block = from_block;
        self.to_block = to_block;
        self
    }

    /// Whether a log satisfies this filter (address, signature and range)
    pub fn matches(&self, log: &LogEntry) -> bool {
        if log.address != self.address {
            return false;
        }
        if !self.event_signatures.is_empty() {
            match log.topic0() {
                Some(topic0) if self.event_signatures.contains(topic0) => {}
                _ => return false,
            }
        }
        match log.block_number {
            Some(block) => block >= self.from_block && block <= self.to_block,
            None => false,
        }
    }
}

/// The pair of messenger contracts for one bridging direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessengerRoute {
    pub source_chain_id: u64,
    /// Messenger that emits `SentMessage`
    pub source_messenger: Address,
    pub dest_chain_id: u64,
    /// Messenger that emits `RelayedMessage`
    pub dest_messenger: Address,
}

impl MessengerRoute {
    /// The opposite direction (deposit route <-> withdrawal route)
    pub fn reversed(&self) -> Self {
        Self {
            source_chain_id: self.dest_chain_id,
            source_messenger: self.dest_messenger,
            dest_chain_id: self.source_chain_id,
            dest_messenger: self.source_messenger,
        }
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Terminal result for one watched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Found(RelayEvent),
    TimedOut,
    Failed(FailureReason),
    Cancelled,
}

impl Outcome {
    /// Get the outcome as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Found(_) => "found",
            Outcome::TimedOut => "timed_out",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Outcome::Found(_))
    }

    /// The relay record, if found
    pub fn relay(&self) -> Option<&RelayEvent> {
        match self {
            Outcome::Found(event) => Some(event),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Found(event) => write!(
                f,
                "found in block {} (tx 0x{})",
                event.block_number,
                hex::encode(event.dest_tx_hash)
            ),
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}
