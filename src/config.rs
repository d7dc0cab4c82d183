//! Watcher configuration
//!
//! Loaded from a `.env` file (if present) and the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `L1_RPC_URL`, `L2_RPC_URL` | required |
//! | `L1_CHAIN_ID`, `L2_CHAIN_ID` | required |
//! | `L1_MESSENGER_ADDRESS` | none (resolve through `ADDRESS_MANAGER_ADDRESS`) |
//! | `L2_MESSENGER_ADDRESS` | predeploy, or resolved through `ADDRESS_MANAGER_ADDRESS` when that is set |
//! | `ADDRESS_MANAGER_ADDRESS` | none |
//! | `WATCH_POLL_INTERVAL_MS` | 2000 |
//! | `WATCH_MAX_POLL_INTERVAL_MS` | 60000 |
//! | `WATCH_TIMEOUT_MS` | 1200000 |
//! | `WATCH_MAX_RETRIES` | 5 |
//! | `WATCH_MAX_BLOCK_RANGE` | 1000 |
//! | `WATCH_CONFIRMATIONS` | 0 |
//! | `WATCH_LOOKBACK_BLOCKS` | 1000 |
//! | `WATCH_JITTER` | 0.1 |

use alloy::primitives::{address, Address};
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::contracts::{L1_MESSENGER_NAME, L2_MESSENGER_NAME};
use crate::poller::WatchOptions;
use crate::redact::redact_url;
use crate::source::MessengerRegistry;
use crate::types::MessengerRoute;

/// L2 messenger predeploy address
pub const L2_MESSENGER_PREDEPLOY: Address = address!("4200000000000000000000000000000000000007");

/// One chain of the messenger pair
#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Messenger contract; `None` until resolved through the address manager
    #[serde(default)]
    pub messenger: Option<Address>,
}

/// Custom Debug that redacts API keys embedded in the RPC URL.
impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &redact_url(&self.rpc_url))
            .field("chain_id", &self.chain_id)
            .field("messenger", &self.messenger)
            .finish()
    }
}

/// Polling parameters
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_poll_interval_ms() -> u64 {
    60_000
}

fn default_timeout_ms() -> u64 {
    20 * 60 * 1000
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_block_range() -> u64 {
    1000
}

fn default_lookback_blocks() -> u64 {
    1000
}

fn default_jitter() -> f64 {
    0.1
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            max_block_range: default_max_block_range(),
            confirmations: 0,
            lookback_blocks: default_lookback_blocks(),
            jitter: default_jitter(),
        }
    }
}

/// Full watcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub l1: ChainConfig,
    pub l2: ChainConfig,
    /// `Lib_AddressManager` used to look up messengers that are not configured
    #[serde(default)]
    pub address_manager: Option<Address>,
    #[serde(default)]
    pub watch: WatchConfig,
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn required_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| eyre!("{} environment variable is required", name))
}

fn optional_address(name: &str) -> Result<Option<Address>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => Ok(Some(
            raw.trim()
                .parse()
                .wrap_err_with(|| format!("{} must be a 0x-prefixed 20-byte address", name))?,
        )),
        _ => Ok(None),
    }
}

impl WatcherConfig {
    /// Load configuration from `.env` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from_file(".env")
    }

    /// Load from a specific .env file path, then the environment
    pub fn load_from_file(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path)
                .wrap_err_with(|| format!("Failed to load .env file from {}", path))?;
            tracing::debug!(path = path, "Loaded .env file");
        }
        Self::load_from_env()
    }

    fn load_from_env() -> Result<Self> {
        let l1 = ChainConfig {
            rpc_url: required_env("L1_RPC_URL")?,
            chain_id: required_env("L1_CHAIN_ID")?
                .parse()
                .wrap_err("L1_CHAIN_ID must be a valid u64")?,
            messenger: optional_address("L1_MESSENGER_ADDRESS")?,
        };

        let address_manager = optional_address("ADDRESS_MANAGER_ADDRESS")?;

        // Without a registry the L2 messenger is the predeploy
        let l2_messenger = match optional_address("L2_MESSENGER_ADDRESS")? {
            Some(messenger) => Some(messenger),
            None if address_manager.is_some() => None,
            None => Some(L2_MESSENGER_PREDEPLOY),
        };
        let l2 = ChainConfig {
            rpc_url: required_env("L2_RPC_URL")?,
            chain_id: required_env("L2_CHAIN_ID")?
                .parse()
                .wrap_err("L2_CHAIN_ID must be a valid u64")?,
            messenger: l2_messenger,
        };

        let watch = WatchConfig {
            poll_interval_ms: parse_env("WATCH_POLL_INTERVAL_MS")
                .unwrap_or(default_poll_interval_ms()),
            max_poll_interval_ms: parse_env("WATCH_MAX_POLL_INTERVAL_MS")
                .unwrap_or(default_max_poll_interval_ms()),
            timeout_ms: parse_env("WATCH_TIMEOUT_MS").unwrap_or(default_timeout_ms()),
            max_retries: parse_env("WATCH_MAX_RETRIES").unwrap_or(default_max_retries()),
            max_block_range: parse_env("WATCH_MAX_BLOCK_RANGE")
                .unwrap_or(default_max_block_range()),
            confirmations: parse_env("WATCH_CONFIRMATIONS").unwrap_or(0),
            lookback_blocks: parse_env("WATCH_LOOKBACK_BLOCKS")
                .unwrap_or(default_lookback_blocks()),
            jitter: parse_env("WATCH_JITTER").unwrap_or(default_jitter()),
        };

        let config = WatcherConfig {
            l1,
            l2,
            address_manager,
            watch,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, chain) in [("l1", &self.l1), ("l2", &self.l2)] {
            if chain.rpc_url.trim().is_empty() {
                return Err(eyre!("{}.rpc_url cannot be empty", name));
            }
            url::Url::parse(&chain.rpc_url)
                .wrap_err_with(|| format!("{}.rpc_url is not a valid URL", name))?;
        }

        if self.l1.chain_id == self.l2.chain_id {
            return Err(eyre!(
                "l1.chain_id and l2.chain_id must differ (both {})",
                self.l1.chain_id
            ));
        }

        if self.address_manager.is_none() {
            if self.l1.messenger.is_none() {
                return Err(eyre!(
                    "L1_MESSENGER_ADDRESS or ADDRESS_MANAGER_ADDRESS must be set"
                ));
            }
            if self.l2.messenger.is_none() {
                return Err(eyre!(
                    "L2_MESSENGER_ADDRESS or ADDRESS_MANAGER_ADDRESS must be set"
                ));
            }
        }

        let watch = &self.watch;
        if watch.poll_interval_ms == 0 {
            return Err(eyre!("watch.poll_interval_ms must be greater than 0"));
        }
        if watch.max_poll_interval_ms < watch.poll_interval_ms {
            return Err(eyre!(
                "watch.max_poll_interval_ms ({}) must be >= watch.poll_interval_ms ({})",
                watch.max_poll_interval_ms,
                watch.poll_interval_ms
            ));
        }
        if watch.max_block_range == 0 {
            return Err(eyre!("watch.max_block_range must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&watch.jitter) {
            return Err(eyre!("watch.jitter must be within 0.0..=1.0"));
        }
        self.watch_options().validate()?;

        Ok(())
    }

    /// Fill unset messenger addresses from the address manager
    ///
    /// Both names are registered in the L1 registry, so `l1_registry` must read
    /// L1. Explicitly configured addresses are kept.
    pub async fn resolve_messengers<R: MessengerRegistry + ?Sized>(
        &mut self,
        l1_registry: &R,
    ) -> Result<()> {
        let Some(manager) = self.address_manager else {
            return Ok(());
        };

        if self.l1.messenger.is_none() {
            let messenger = l1_registry
                .lookup(manager, L1_MESSENGER_NAME)
                .await
                .wrap_err_with(|| format!("Failed to resolve {}", L1_MESSENGER_NAME))?;
            self.l1.messenger = Some(messenger);
        }
        if self.l2.messenger.is_none() {
            let messenger = l1_registry
                .lookup(manager, L2_MESSENGER_NAME)
                .await
                .wrap_err_with(|| format!("Failed to resolve {}", L2_MESSENGER_NAME))?;
            self.l2.messenger = Some(messenger);
        }

        tracing::info!(
            address_manager = %manager,
            l1_messenger = ?self.l1.messenger,
            l2_messenger = ?self.l2.messenger,
            "Resolved messengers"
        );
        Ok(())
    }

    fn messengers(&self) -> Result<(Address, Address)> {
        let l1 = self.l1.messenger.ok_or_else(|| {
            eyre!("L1 messenger not configured; resolve it through the address manager first")
        })?;
        let l2 = self.l2.messenger.ok_or_else(|| {
            eyre!("L2 messenger not configured; resolve it through the address manager first")
        })?;
        Ok((l1, l2))
    }

    /// L1 → L2 route
    pub fn deposit_route(&self) -> Result<MessengerRoute> {
        let (l1, l2) = self.messengers()?;
        Ok(MessengerRoute {
            source_chain_id: self.l1.chain_id,
            source_messenger: l1,
            dest_chain_id: self.l2.chain_id,
            dest_messenger: l2,
        })
    }

    /// L2 → L1 route
    pub fn withdrawal_route(&self) -> Result<MessengerRoute> {
        Ok(self.deposit_route()?.reversed())
    }

    /// Poll options for a watch request
    pub fn watch_options(&self) -> WatchOptions {
        let watch = &self.watch;
        WatchOptions {
            poll_interval: Duration::from_millis(watch.poll_interval_ms),
            max_poll_interval: Duration::from_millis(watch.max_poll_interval_ms),
            jitter: watch.jitter,
            timeout: Duration::from_millis(watch.timeout_ms),
            max_transient_retries: watch.max_retries,
            max_block_range: watch.max_block_range,
            confirmations: watch.confirmations,
            lookback_blocks: watch.lookback_blocks,
            ..Default::default()
        }
    }
}
