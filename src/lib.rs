//! Crossdomain-Watcher: Cross-Domain Message Correlation
//!
//! Tracks a message sent through an Optimism-style cross-domain messenger
//! (deposit on L1, withdrawal on L2) until the matching relay shows up on the
//! other chain:
//!
//! - **Message Codec** - Decodes `SentMessage` logs and computes the messenger's message hash
//! - **Chain Log Source** - Narrow async read interface over a chain (receipts, logs, head)
//! - **Relay Poller** - Per-request state machine with high-water-mark scanning, backoff,
//!   deadline and cancellation
//! - **Correlation Service** - `extract -> identify -> poll` pipeline with per-message outcomes
//!
//! ## Usage
//!
//! ```ignore
//! let l2 = Arc::new(EvmLogSource::new(&config.l2_rpc_url, config.l2_chain_id)?);
//! let service = CorrelationService::new(l2, config.deposit_route()?);
//! let report = service
//!     .await_relay(&deposit_receipt, config.watch_options(), CancellationToken::new())
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `evm` - alloy HTTP-backed [`source::evm::EvmLogSource`] (default)
//! - `testing` - in-memory [`testing::MemoryLogSource`] and log builders
//! - `full` - Enable all features

pub mod codec;
pub mod config;
pub mod contracts;
pub mod correlation;
pub mod error;
pub mod hash;
pub mod poller;
pub mod redact;
pub mod retry;
pub mod source;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use codec::{decode_relay_log, extract, identify};
pub use correlation::CorrelationService;
pub use error::{CodecError, FailureReason, SourceError, WatchError};
pub use poller::{RelayPoller, WatchOptions, WatchReport, WatchRequest};
pub use source::{ChainLogSource, MessengerRegistry};
pub use types::{
    BridgeMessage, LogEntry, LogFilter, MessageId, MessageVersion, MessengerRoute, Outcome,
    Receipt, RelayEvent,
};

pub use tokio_util::sync::CancellationToken;
