//! Chain Log Source
//!
//! The narrow read interface the watcher needs from a chain. Implementations
//! classify every failure as [`SourceError::Transient`] or [`SourceError::Fatal`];
//! retry policy lives in the poller, not here.

#[cfg(feature = "evm")]
pub mod evm;

#[cfg(feature = "evm")]
pub use evm::EvmLogSource;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

use crate::error::SourceError;
use crate::types::{LogEntry, LogFilter, Receipt};

/// Read access to one chain
#[async_trait]
pub trait ChainLogSource: Send + Sync {
    /// Chain this source reads from
    fn chain_id(&self) -> u64;

    /// Receipt of a mined transaction, `None` if unknown or still pending
    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, SourceError>;

    /// Logs matching `filter`, inclusive block range
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, SourceError>;

    /// Current head block number
    async fn get_block_number(&self) -> Result<u64, SourceError>;

    /// Stream of new head block numbers, strictly increasing
    ///
    /// Polls `get_block_number` every `poll_interval`. Heads that did not move
    /// are skipped. Errors are yielded and polling continues.
    fn new_blocks(&self, poll_interval: Duration) -> BoxStream<'_, Result<u64, SourceError>> {
        stream::unfold(
            (self, None::<u64>, false),
            move |(source, last, started)| async move {
                loop {
                    if started {
                        tokio::time::sleep(poll_interval).await;
                    }
                    match source.get_block_number().await {
                        Ok(head) if last.map_or(true, |prev| head > prev) => {
                            return Some((Ok(head), (source, Some(head), true)));
                        }
                        // head did not move; `started` is always true here
                        Ok(_) => continue,
                        Err(e) => return Some((Err(e), (source, last, true))),
                    }
                }
            },
        )
        .boxed()
    }
}

/// Name-to-address lookup in a `Lib_AddressManager` style registry
#[async_trait]
pub trait MessengerRegistry: Send + Sync {
    /// Address registered under `name` in `address_manager`
    async fn lookup(&self, address_manager: Address, name: &str) -> Result<Address, SourceError>;
}
