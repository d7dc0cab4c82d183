//! alloy-backed log source over JSON-RPC
//!
//! Wraps a `RootProvider<Http<Client>>` and converts alloy's RPC types into the
//! crate's narrow [`Receipt`] / [`LogEntry`] types.

use alloy::{
    primitives::{Address, B256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::{Filter, Log, TransactionReceipt},
    transports::http::{Client, Http},
};
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::{debug, info};

use crate::contracts::AddressManager;
use crate::error::SourceError;
use crate::redact::redact_url;
use crate::source::{ChainLogSource, MessengerRegistry};
use crate::types::{LogEntry, LogFilter, Receipt};

/// Read-only EVM log source
pub struct EvmLogSource {
    provider: RootProvider<Http<Client>>,
    chain_id: u64,
}

impl EvmLogSource {
    /// Create a source for `rpc_url`
    pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self> {
        let provider = ProviderBuilder::new().on_http(
            rpc_url
                .parse()
                .map_err(|e| eyre!("Invalid RPC URL: {}", e))?,
        );

        info!(
            rpc_url = %redact_url(rpc_url),
            chain_id = chain_id,
            "Created EVM log source"
        );

        Ok(Self { provider, chain_id })
    }

    /// Get the underlying provider
    pub fn provider(&self) -> &RootProvider<Http<Client>> {
        &self.provider
    }

    /// Look up a messenger address in a `Lib_AddressManager` registry
    ///
    /// Older deployments only publish the registry address; the messengers are
    /// found under [`crate::contracts::L1_MESSENGER_NAME`] and
    /// [`crate::contracts::L2_MESSENGER_NAME`].
    pub async fn resolve_messenger(
        &self,
        address_manager: Address,
        name: &str,
    ) -> Result<Address, SourceError> {
        let manager = AddressManager::new(address_manager, &self.provider);
        let result = manager
            .getAddress(name.to_string())
            .call()
            .await
            .map_err(|e| SourceError::classify(e.to_string()))?;

        if result._0 == Address::ZERO {
            return Err(SourceError::Fatal(format!(
                "{} is not registered in address manager {}",
                name, address_manager
            )));
        }

        debug!(name = name, address = %result._0, "Resolved messenger address");
        Ok(result._0)
    }
}

#[async_trait]
impl MessengerRegistry for EvmLogSource {
    async fn lookup(&self, address_manager: Address, name: &str) -> Result<Address, SourceError> {
        self.resolve_messenger(address_manager, name).await
    }
}

#[async_trait]
impl ChainLogSource for EvmLogSource {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, SourceError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| SourceError::classify(e.to_string()))?;

        Ok(receipt.map(convert_receipt))
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, SourceError> {
        let mut rpc_filter = Filter::new()
            .address(filter.address)
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        if !filter.event_signatures.is_empty() {
            rpc_filter = rpc_filter.event_signature(filter.event_signatures.clone());
        }

        let logs = self.provider.get_logs(&rpc_filter).await.map_err(|e| {
            SourceError::classify(format!(
                "Failed to get logs from block {} to {}: {}",
                filter.from_block, filter.to_block, e
            ))
        })?;

        Ok(logs.iter().map(convert_log).collect())
    }

    async fn get_block_number(&self) -> Result<u64, SourceError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| SourceError::classify(e.to_string()))
    }
}

fn convert_log(log: &Log) -> LogEntry {
    LogEntry {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
        block_number: log.block_number,
        tx_hash: log.transaction_hash,
        log_index: log.log_index,
    }
}

fn convert_receipt(receipt: TransactionReceipt) -> Receipt {
    Receipt {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        status: receipt.status(),
        logs: receipt.inner.logs().iter().map(convert_log).collect(),
    }
}
