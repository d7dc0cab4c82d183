//! Message Codec
//!
//! Turns source-chain receipts into [`BridgeMessage`]s, computes their
//! [`MessageId`]s and decodes destination-chain relay logs.
//!
//! Two sent schemas are recognised on the source messenger:
//!
//! - Bedrock: `SentMessage(address indexed target, address sender, bytes message,
//!   uint256 messageNonce, uint256 gasLimit)`, followed by
//!   `SentMessageExtension1(address indexed sender, uint256 value)`
//! - OVM: `SentMessage(bytes message)` where `message` is the full relay calldata
//!
//! Relay logs are `RelayedMessage(bytes32)` / `FailedRelayedMessage(bytes32)`,
//! with the hash either indexed (Bedrock) or in the data (OVM).

use alloy::primitives::{LogData, B256, U256};
use alloy::sol_types::{SolCall, SolEvent};
use tracing::debug;

use crate::contracts::{ICrossDomainMessenger, IOvmCrossDomainMessenger};
use crate::error::CodecError;
use crate::hash::{
    decode_versioned_nonce, hash_cross_domain_message_v0, hash_cross_domain_message_v1, keccak256,
};
use crate::types::{BridgeMessage, LogEntry, MessageId, MessageVersion, MessengerRoute, Receipt, RelayEvent};

/// topic0 values of the relay events, for destination log filters
pub fn relay_signatures() -> [B256; 2] {
    [
        ICrossDomainMessenger::RelayedMessage::SIGNATURE_HASH,
        ICrossDomainMessenger::FailedRelayedMessage::SIGNATURE_HASH,
    ]
}

// =============================================================================
// Extraction
// =============================================================================

/// Extract every message the route's source messenger emitted in `receipt`, in log order
///
/// Logs from other contracts and unrelated events are skipped. A log that
/// carries a sent signature but does not decode is an error: it means the
/// messenger ABI drifted from what this crate was built against.
pub fn extract(receipt: &Receipt, route: &MessengerRoute) -> Result<Vec<BridgeMessage>, CodecError> {
    let mut messages = Vec::new();

    for (position, log) in receipt.logs.iter().enumerate() {
        if log.address != route.source_messenger {
            continue;
        }
        let Some(topic0) = log.topic0() else {
            continue;
        };

        if *topic0 == ICrossDomainMessenger::SentMessage::SIGNATURE_HASH {
            let extension = receipt.logs.get(position + 1);
            messages.push(decode_sent_message(log, extension, route)?);
        } else if *topic0 == IOvmCrossDomainMessenger::SentMessage::SIGNATURE_HASH {
            messages.push(decode_ovm_sent_message(log, route)?);
        }
    }

    debug!(
        tx = %receipt.tx_hash,
        count = messages.len(),
        "Extracted cross-domain messages from receipt"
    );

    Ok(messages)
}

fn log_data(log: &LogEntry, event: &'static str) -> Result<LogData, CodecError> {
    LogData::new(log.topics.clone(), log.data.clone())
        .ok_or_else(|| CodecError::malformed(event, log.log_index, "more than 4 topics"))
}

/// Decode a Bedrock `SentMessage` and its optional `SentMessageExtension1` companion
fn decode_sent_message(
    log: &LogEntry,
    extension: Option<&LogEntry>,
    route: &MessengerRoute,
) -> Result<BridgeMessage, CodecError> {
    let event = ICrossDomainMessenger::SentMessage::decode_log_data(&log_data(log, "SentMessage")?, true)
        .map_err(|e| CodecError::malformed("SentMessage", log.log_index, e.to_string()))?;

    let value = match extension {
        Some(next)
            if next.address == route.source_messenger
                && next.topic0()
                    == Some(&ICrossDomainMessenger::SentMessageExtension1::SIGNATURE_HASH) =>
        {
            let ext = ICrossDomainMessenger::SentMessageExtension1::decode_log_data(
                &log_data(next, "SentMessageExtension1")?,
                true,
            )
            .map_err(|e| {
                CodecError::malformed("SentMessageExtension1", next.log_index, e.to_string())
            })?;

            if ext.sender != event.sender {
                return Err(CodecError::malformed(
                    "SentMessageExtension1",
                    next.log_index,
                    format!(
                        "sender {} does not match SentMessage sender {}",
                        ext.sender, event.sender
                    ),
                ));
            }
            ext.value
        }
        _ => U256::ZERO,
    };

    let (_, version) = decode_versioned_nonce(event.messageNonce);
    let version = MessageVersion::from_u16(version).ok_or(CodecError::UnsupportedVersion {
        version,
        nonce: event.messageNonce,
    })?;

    Ok(BridgeMessage {
        source_chain_id: route.source_chain_id,
        dest_chain_id: route.dest_chain_id,
        sender: event.sender,
        target: event.target,
        payload: event.message,
        nonce: event.messageNonce,
        value,
        gas_limit: event.gasLimit,
        version,
        relay_calldata: None,
    })
}

/// Decode an OVM `SentMessage(bytes)` by unpacking the embedded relay calldata
///
/// The emitted bytes are kept: the destination messenger hashes them
/// verbatim, so a re-encoding is not guaranteed to produce the same id.
fn decode_ovm_sent_message(log: &LogEntry, route: &MessengerRoute) -> Result<BridgeMessage, CodecError> {
    let event = IOvmCrossDomainMessenger::SentMessage::decode_log_data(&log_data(log, "SentMessage")?, true)
        .map_err(|e| CodecError::malformed("SentMessage", log.log_index, e.to_string()))?;

    let call = IOvmCrossDomainMessenger::relayMessageCall::abi_decode(&event.message, false)
        .map_err(|e| {
            CodecError::malformed(
                "SentMessage",
                log.log_index,
                format!("embedded relayMessage calldata: {}", e),
            )
        })?;

    let (_, version) = decode_versioned_nonce(call.messageNonce);
    if version != 0 {
        return Err(CodecError::UnsupportedVersion {
            version,
            nonce: call.messageNonce,
        });
    }

    Ok(BridgeMessage {
        source_chain_id: route.source_chain_id,
        dest_chain_id: route.dest_chain_id,
        sender: call.sender,
        target: call.target,
        payload: call.message,
        nonce: call.messageNonce,
        value: U256::ZERO,
        gas_limit: U256::ZERO,
        version: MessageVersion::V0,
        relay_calldata: Some(event.message),
    })
}

// =============================================================================
// Identification
// =============================================================================

/// Canonical message id, identical to the destination messenger's `msgHash`
pub fn identify(message: &BridgeMessage) -> MessageId {
    let hash = match (message.version, &message.relay_calldata) {
        (MessageVersion::V0, Some(calldata)) => keccak256(calldata),
        (MessageVersion::V0, None) => hash_cross_domain_message_v0(
            message.target,
            message.sender,
            &message.payload,
            message.nonce,
        ),
        (MessageVersion::V1, _) => hash_cross_domain_message_v1(
            message.nonce,
            message.sender,
            message.target,
            message.value,
            message.gas_limit,
            &message.payload,
        ),
    };
    MessageId::from_bytes(hash)
}

// =============================================================================
// Relay Log Parsing
// =============================================================================

/// Parse a `RelayedMessage` / `FailedRelayedMessage` log
///
/// Returns `Ok(None)` for logs with any other signature.
pub fn decode_relay_log(log: &LogEntry) -> Result<Option<RelayEvent>, CodecError> {
    let success = match log.topic0() {
        Some(t) if *t == ICrossDomainMessenger::RelayedMessage::SIGNATURE_HASH => true,
        Some(t) if *t == ICrossDomainMessenger::FailedRelayedMessage::SIGNATURE_HASH => false,
        _ => return Ok(None),
    };
    let event = if success {
        "RelayedMessage"
    } else {
        "FailedRelayedMessage"
    };

    // Bedrock indexes msgHash, OVM puts it in the data
    let msg_hash = match log.topics.get(1) {
        Some(topic) => *topic,
        None => {
            let data = log.data.as_ref();
            if data.len() < 32 {
                return Err(CodecError::malformed(
                    event,
                    log.log_index,
                    format!("expected 32 bytes of data, got {}", data.len()),
                ));
            }
            B256::from_slice(&data[..32])
        }
    };

    let (Some(block_number), Some(tx_hash), Some(log_index)) =
        (log.block_number, log.tx_hash, log.log_index)
    else {
        return Err(CodecError::malformed(
            event,
            log.log_index,
            "missing block number, transaction hash or log index",
        ));
    };

    Ok(Some(RelayEvent {
        message_id: MessageId(msg_hash),
        dest_tx_hash: tx_hash,
        block_number,
        log_index,
        success,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{encode_cross_domain_message_v0, encode_versioned_nonce};
    use crate::testing::{
        ovm_relayed_message_log, ovm_sent_message_log, relayed_message_log, sent_message_logs,
        test_route, SentMessageSpec,
    };
    use alloy::primitives::{address, bytes, Address, Bytes};

    const SENDER: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const TARGET: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    fn receipt(logs: Vec<LogEntry>) -> Receipt {
        Receipt {
            tx_hash: B256::repeat_byte(0x11),
            block_number: Some(50),
            status: true,
            logs,
        }
    }

    fn v0_fixture() -> SentMessageSpec {
        SentMessageSpec {
            sender: SENDER,
            target: TARGET,
            payload: bytes!("01"),
            nonce: U256::from(7u64),
            value: U256::ZERO,
            gas_limit: U256::from(100_000u64),
        }
    }

    #[test]
    fn test_extract_bedrock_message() {
        let route = test_route();
        let logs = sent_message_logs(&route, &v0_fixture(), 50, 0);
        let messages = extract(&receipt(logs), &route).unwrap();

        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.sender, SENDER);
        assert_eq!(msg.target, TARGET);
        assert_eq!(msg.payload, bytes!("01"));
        assert_eq!(msg.nonce, U256::from(7u64));
        assert_eq!(msg.gas_limit, U256::from(100_000u64));
        assert_eq!(msg.version, MessageVersion::V0);
        assert_eq!(msg.source_chain_id, route.source_chain_id);
        assert_eq!(msg.dest_chain_id, route.dest_chain_id);
    }

    #[test]
    fn test_identify_v0_fixture() {
        let route = test_route();
        let logs = sent_message_logs(&route, &v0_fixture(), 50, 0);
        let messages = extract(&receipt(logs), &route).unwrap();

        assert_eq!(
            identify(&messages[0]).to_hex(),
            "0x4133bc706d624d9ade129bbaaae4fd5cbac2a4b12575f2ec32426088edb40b6a"
        );
    }

    #[test]
    fn test_extract_v1_reads_value_from_extension() {
        let route = test_route();
        let spec = SentMessageSpec {
            nonce: encode_versioned_nonce(U256::from(7u64), 1),
            value: U256::from(1_000_000_000_000_000_000u128),
            ..v0_fixture()
        };
        let messages = extract(&receipt(sent_message_logs(&route, &spec, 50, 0)), &route).unwrap();

        assert_eq!(messages[0].version, MessageVersion::V1);
        assert_eq!(messages[0].value, spec.value);
        assert_eq!(
            messages[0].id().to_hex(),
            "0x1e7cc577787c9656ccba664133fa714a12e7d20b5a79018808560abb94ebad9f"
        );
    }

    #[test]
    fn test_extract_preserves_log_order() {
        let route = test_route();
        let mut logs = Vec::new();
        for nonce in [3u64, 1, 2] {
            let spec = SentMessageSpec {
                nonce: U256::from(nonce),
                ..v0_fixture()
            };
            let next_index = logs.len() as u64;
            logs.extend(sent_message_logs(&route, &spec, 50, next_index));
        }

        let messages = extract(&receipt(logs), &route).unwrap();
        let nonces: Vec<u64> = messages.iter().map(|m| m.nonce.to::<u64>()).collect();
        assert_eq!(nonces, vec![3, 1, 2]);
    }

    #[test]
    fn test_extract_skips_other_contracts_and_events() {
        let route = test_route();
        let mut foreign = sent_message_logs(&route, &v0_fixture(), 50, 0);
        for log in &mut foreign {
            log.address = Address::repeat_byte(0x99);
        }
        let mut unrelated = sent_message_logs(&route, &v0_fixture(), 50, 2).remove(0);
        unrelated.topics[0] = B256::repeat_byte(0x01);

        let messages = extract(&receipt(vec![foreign[0].clone(), unrelated]), &route).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn test_extract_rejects_truncated_sent_message() {
        let route = test_route();
        let mut logs = sent_message_logs(&route, &v0_fixture(), 50, 0);
        logs[0].data = Bytes::from(vec![0u8; 40]);

        let err = extract(&receipt(logs), &route).unwrap_err();
        assert!(matches!(err, CodecError::Malformed { event: "SentMessage", .. }));
    }

    #[test]
    fn test_extract_rejects_unknown_version() {
        let route = test_route();
        let spec = SentMessageSpec {
            nonce: encode_versioned_nonce(U256::from(7u64), 2),
            ..v0_fixture()
        };
        let err = extract(&receipt(sent_message_logs(&route, &spec, 50, 0)), &route).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion { version: 2, .. }));
    }

    #[test]
    fn test_extract_ovm_message_matches_bedrock_v0_id() {
        let route = test_route();
        let bedrock = extract(&receipt(sent_message_logs(&route, &v0_fixture(), 50, 0)), &route)
            .unwrap()
            .remove(0);
        let ovm = extract(&receipt(vec![ovm_sent_message_log(&route, &v0_fixture(), 50, 0)]), &route)
            .unwrap()
            .remove(0);

        assert_eq!(ovm.version, MessageVersion::V0);
        assert_eq!(ovm.payload, bedrock.payload);
        assert_eq!(identify(&ovm), identify(&bedrock));
    }

    #[test]
    fn test_ovm_id_hashes_emitted_calldata() {
        let route = test_route();
        let fixture = v0_fixture();
        let mut calldata = encode_cross_domain_message_v0(
            fixture.target,
            fixture.sender,
            &fixture.payload,
            fixture.nonce,
        );
        // Trailing bytes after the canonical encoding are still part of the hashed message
        calldata.extend_from_slice(&[0u8; 32]);
        let data = IOvmCrossDomainMessenger::SentMessage {
            message: Bytes::from(calldata.clone()),
        }
        .encode_log_data();
        let log = LogEntry {
            address: route.source_messenger,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number: Some(50),
            tx_hash: Some(B256::repeat_byte(0x11)),
            log_index: Some(0),
        };

        let message = extract(&receipt(vec![log]), &route).unwrap().remove(0);

        assert_eq!(message.target, fixture.target);
        assert_eq!(message.relay_calldata, Some(Bytes::from(calldata.clone())));
        assert_eq!(identify(&message), MessageId::from_bytes(keccak256(&calldata)));
        assert_ne!(
            identify(&message),
            MessageId::from_bytes(hash_cross_domain_message_v0(
                fixture.target,
                fixture.sender,
                &fixture.payload,
                fixture.nonce,
            ))
        );
    }

    #[test]
    fn test_identify_is_deterministic() {
        let route = test_route();
        let a = extract(&receipt(sent_message_logs(&route, &v0_fixture(), 50, 0)), &route).unwrap();
        let b = extract(&receipt(sent_message_logs(&route, &v0_fixture(), 77, 9)), &route).unwrap();

        // Log position and block do not influence identity
        assert_eq!(identify(&a[0]), identify(&b[0]));
        assert_eq!(identify(&a[0]), identify(&a[0].clone()));
    }

    #[test]
    fn test_decode_relay_log_indexed_and_ovm() {
        let route = test_route();
        let id = MessageId::from_bytes([0x42; 32]);

        let relayed = decode_relay_log(&relayed_message_log(&route, id, 105, 3, true))
            .unwrap()
            .unwrap();
        assert_eq!(relayed.message_id, id);
        assert_eq!(relayed.block_number, 105);
        assert_eq!(relayed.log_index, 3);
        assert!(relayed.success);

        let failed = decode_relay_log(&relayed_message_log(&route, id, 106, 0, false))
            .unwrap()
            .unwrap();
        assert!(!failed.success);

        let ovm = decode_relay_log(&ovm_relayed_message_log(&route, id, 107, 1))
            .unwrap()
            .unwrap();
        assert_eq!(ovm.message_id, id);
        assert!(ovm.success);
    }

    #[test]
    fn test_decode_relay_log_ignores_other_events() {
        let route = test_route();
        let logs = sent_message_logs(&route, &v0_fixture(), 50, 0);
        assert_eq!(decode_relay_log(&logs[0]).unwrap(), None);
    }

    #[test]
    fn test_decode_relay_log_rejects_short_data() {
        let route = test_route();
        let mut log = ovm_relayed_message_log(&route, MessageId::from_bytes([1; 32]), 10, 0);
        log.data = Bytes::from(vec![0u8; 16]);
        assert!(decode_relay_log(&log).is_err());
    }
}
