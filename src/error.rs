//! Error taxonomy
//!
//! - [`CodecError`] - a log matched a known signature but did not decode (schema drift)
//! - [`SourceError`] - the chain log source failed, classified transient or fatal
//! - [`FailureReason`] - why a single watched message ended in `Outcome::Failed`
//! - [`WatchError`] - request-level failures surfaced before polling starts

use alloy::primitives::{B256, U256};
use thiserror::Error;

use crate::retry::{classify_error, ErrorClass};

/// Decoding failure for a log with a recognised event signature
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed {event} log (log index {log_index:?}): {reason}")]
    Malformed {
        event: &'static str,
        log_index: Option<u64>,
        reason: String,
    },

    #[error("unsupported messenger version {version} in nonce {nonce}")]
    UnsupportedVersion { version: u16, nonce: U256 },
}

impl CodecError {
    pub(crate) fn malformed(
        event: &'static str,
        log_index: Option<u64>,
        reason: impl Into<String>,
    ) -> Self {
        CodecError::Malformed {
            event,
            log_index,
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`crate::source::ChainLogSource`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Network, timeout or rate limit; retried with backoff
    #[error("transient RPC error: {0}")]
    Transient(String),

    /// Unauthorized, malformed request, unsupported method; never retried
    #[error("fatal RPC error: {0}")]
    Fatal(String),
}

impl SourceError {
    /// Classify a raw client error message
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_error(&message) {
            ErrorClass::Permanent => SourceError::Fatal(message),
            ErrorClass::Transient | ErrorClass::Unknown => SourceError::Transient(message),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Why a watched message failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("destination log source failed: {0}")]
    Source(SourceError),

    #[error("gave up after {attempts} consecutive transient errors, last: {last}")]
    RetriesExhausted { attempts: u32, last: SourceError },

    #[error("undecodable relay log on the destination messenger: {0}")]
    Decode(CodecError),

    #[error(
        "protocol mismatch: {observed} relay events observed on the destination messenger, \
         none matched a computed message id"
    )]
    ProtocolMismatch { observed: u64 },
}

/// Request-level failure of the correlation pipeline
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to decode source receipt: {0}")]
    Decode(#[from] CodecError),

    #[error("transaction {0} emitted no cross-domain messages")]
    NoMessages(B256),

    #[error("receipt not found for transaction {0}")]
    ReceiptNotFound(B256),

    #[error("source transaction {0} reverted")]
    Reverted(B256),

    #[error("invalid watch options: {0}")]
    InvalidOptions(String),

    #[error("cancelled before the watch started")]
    Cancelled,

    #[error(transparent)]
    Source(#[from] SourceError),
}
