//! In-memory [`ChainLogSource`]
//!
//! Holds a head block, a log set and receipts behind a mutex. Failures can be
//! queued per call kind and every call is counted, which is what the poller
//! tests assert on.

use alloy::primitives::B256;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::SourceError;
use crate::source::ChainLogSource;
use crate::types::{LogEntry, LogFilter, Receipt};

#[derive(Debug, Default)]
struct MemoryState {
    head: u64,
    head_step: u64,
    logs: Vec<LogEntry>,
    receipts: HashMap<B256, Receipt>,
    log_errors: VecDeque<SourceError>,
    head_errors: VecDeque<SourceError>,
    overlap: u64,
    latency: Duration,
    queried_ranges: Vec<(u64, u64)>,
    block_number_calls: u64,
    get_logs_calls: u64,
    receipt_calls: u64,
}

/// Programmable chain for tests
#[derive(Debug)]
pub struct MemoryLogSource {
    chain_id: u64,
    state: Mutex<MemoryState>,
}

impl MemoryLogSource {
    pub fn new(chain_id: u64, head: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(MemoryState {
                head,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    /// Advance the head by `step` after every `get_block_number` call
    pub fn set_head_step(&self, step: u64) {
        self.state().head_step = step;
    }

    pub fn push_log(&self, log: LogEntry) {
        self.state().logs.push(log);
    }

    pub fn push_logs(&self, logs: impl IntoIterator<Item = LogEntry>) {
        self.state().logs.extend(logs);
    }

    pub fn insert_receipt(&self, receipt: Receipt) {
        self.state().receipts.insert(receipt.tx_hash, receipt);
    }

    /// Fail the next `get_logs` call with `error` (queued, FIFO)
    pub fn fail_next_get_logs(&self, error: SourceError) {
        self.state().log_errors.push_back(error);
    }

    /// Fail the next `get_block_number` call with `error` (queued, FIFO)
    pub fn fail_next_block_number(&self, error: SourceError) {
        self.state().head_errors.push_back(error);
    }

    /// Widen every `get_logs` answer by `blocks` on both sides, like a provider
    /// that rounds ranges to its own page boundaries
    pub fn set_overlap(&self, blocks: u64) {
        self.state().overlap = blocks;
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Inclusive ranges requested so far, in call order
    pub fn queried_ranges(&self) -> Vec<(u64, u64)> {
        self.state().queried_ranges.clone()
    }

    pub fn get_logs_calls(&self) -> u64 {
        self.state().get_logs_calls
    }

    pub fn block_number_calls(&self) -> u64 {
        self.state().block_number_calls
    }

    pub fn receipt_calls(&self) -> u64 {
        self.state().receipt_calls
    }

    /// Total calls of any kind
    pub fn total_calls(&self) -> u64 {
        let state = self.state();
        state.get_logs_calls + state.block_number_calls + state.receipt_calls
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChainLogSource for MemoryLogSource {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, SourceError> {
        self.state().receipt_calls += 1;
        self.simulate_latency().await;
        Ok(self.state().receipts.get(&tx_hash).cloned())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, SourceError> {
        {
            let mut state = self.state();
            state.get_logs_calls += 1;
            state.queried_ranges.push((filter.from_block, filter.to_block));
        }
        self.simulate_latency().await;

        let mut state = self.state();
        if let Some(error) = state.log_errors.pop_front() {
            return Err(error);
        }

        let widened = LogFilter {
            from_block: filter.from_block.saturating_sub(state.overlap),
            to_block: filter.to_block.saturating_add(state.overlap),
            ..filter.clone()
        };
        Ok(state
            .logs
            .iter()
            .filter(|log| widened.matches(log))
            .cloned()
            .collect())
    }

    async fn get_block_number(&self) -> Result<u64, SourceError> {
        self.state().block_number_calls += 1;
        self.simulate_latency().await;

        let mut state = self.state();
        if let Some(error) = state.head_errors.pop_front() {
            return Err(error);
        }
        let head = state.head;
        state.head += state.head_step;
        Ok(head)
    }
}
