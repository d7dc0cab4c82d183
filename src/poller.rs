//! Relay Poller
//!
//! Watches the destination messenger for `RelayedMessage` logs matching a set
//! of [`MessageId`]s. Each id moves from pending to exactly one terminal
//! [`Outcome`]:
//!
//! ```text
//! Pending ──relay log──────────────▶ Found
//!    │────deadline─────────────────▶ TimedOut
//!    │────fatal / retries exhausted─▶ Failed
//!    └────cancellation token────────▶ Cancelled
//! ```
//!
//! ## Scanning
//!
//! One loop per request queries `[next_block, min(next_block + max_block_range - 1,
//! head - confirmations)]` for both relay signatures at once and checks every
//! decoded log against the whole pending set. `next_block` only moves after a
//! successful query, so consecutive ranges are contiguous and disjoint. Logs the
//! source returns outside the requested range are dropped.
//!
//! ## Suspension points
//!
//! Every source call and every sleep races the cancellation token and the
//! deadline, so neither waits on a slow RPC.

use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{decode_relay_log, relay_signatures};
use crate::error::{CodecError, FailureReason, SourceError, WatchError};
use crate::retry::{BackoffConfig, RetryAction, RetryContext};
use crate::source::ChainLogSource;
use crate::types::{LogFilter, MessageId, Outcome, RelayEvent};

/// Stand-in deadline for timeouts too large to add to an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Polling behaviour of one watch request
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Delay between successful polls
    pub poll_interval: Duration,
    /// Cap on the error backoff
    pub max_poll_interval: Duration,
    /// Growth factor of the error backoff
    pub backoff_multiplier: f64,
    /// Random extra delay as a fraction of each delay
    pub jitter: f64,
    /// Wall-clock budget measured from request creation
    pub timeout: Duration,
    /// Retries after consecutive transient errors before the request fails
    pub max_transient_retries: u32,
    /// Maximum blocks per `get_logs` query
    pub max_block_range: u64,
    /// Blocks behind head that are not scanned yet
    pub confirmations: u64,
    /// First block to scan; `None` starts `lookback_blocks` behind head
    pub start_block: Option<u64>,
    /// Blocks behind head to start from when `start_block` is unset
    pub lookback_blocks: u64,
    /// Resolve ids on `FailedRelayedMessage` instead of waiting for a replay
    pub resolve_on_failed_relay: bool,
    /// Fail the request once this many relay logs matched none of the ids
    pub protocol_mismatch_threshold: Option<u64>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_poll_interval: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: 0.1,
            timeout: Duration::from_secs(20 * 60),
            max_transient_retries: 5,
            max_block_range: 1000,
            confirmations: 0,
            start_block: None,
            lookback_blocks: 1000,
            resolve_on_failed_relay: false,
            protocol_mismatch_threshold: None,
        }
    }
}

impl WatchOptions {
    /// Backoff policy derived from these options
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_backoff: self.poll_interval,
            max_backoff: self.max_poll_interval,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            max_retries: self.max_transient_retries,
        }
    }

    /// Reject values the poller would otherwise clamp or ignore
    pub fn validate(&self) -> Result<(), WatchError> {
        let invalid = |msg: String| Err(WatchError::InvalidOptions(msg));
        if self.poll_interval.is_zero() {
            return invalid("poll_interval must be greater than 0".to_string());
        }
        if self.max_poll_interval < self.poll_interval {
            return invalid(format!(
                "max_poll_interval ({:?}) must be >= poll_interval ({:?})",
                self.max_poll_interval, self.poll_interval
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return invalid(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return invalid(format!("jitter must be within 0.0..=1.0, got {}", self.jitter));
        }
        if self.max_block_range == 0 {
            return invalid("max_block_range must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// One watch over a set of message ids
///
/// The deadline is fixed when the request is created, not when polling starts.
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Unique ids in first-seen order
    pub message_ids: Vec<MessageId>,
    pub options: WatchOptions,
    pub started_at: Instant,
    pub deadline: Instant,
}

impl WatchRequest {
    pub fn new(ids: impl IntoIterator<Item = MessageId>, options: WatchOptions) -> Self {
        let mut seen = HashSet::new();
        let message_ids = ids.into_iter().filter(|id| seen.insert(*id)).collect();
        let started_at = Instant::now();
        let deadline = started_at
            .checked_add(options.timeout)
            .unwrap_or_else(|| started_at + FAR_FUTURE);
        Self {
            message_ids,
            deadline,
            options,
            started_at,
        }
    }
}

/// Terminal outcome of every id in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchReport {
    pub outcomes: HashMap<MessageId, Outcome>,
    /// Highest destination block fully scanned
    pub scanned_through: Option<u64>,
    /// Poll iterations performed
    pub ticks: u32,
}

impl WatchReport {
    pub fn outcome(&self, id: &MessageId) -> Option<&Outcome> {
        self.outcomes.get(id)
    }

    pub fn all_found(&self) -> bool {
        self.outcomes.values().all(Outcome::is_found)
    }

    /// Relay records of found ids
    pub fn relays(&self) -> impl Iterator<Item = &RelayEvent> {
        self.outcomes.values().filter_map(Outcome::relay)
    }
}

/// Why a tick did not complete
#[derive(Debug)]
enum TickError {
    Source(SourceError),
    Decode(CodecError),
    ProtocolMismatch { observed: u64 },
}

impl From<SourceError> for TickError {
    fn from(e: SourceError) -> Self {
        TickError::Source(e)
    }
}

/// Mutable state of one request
struct ScanState {
    pending: HashSet<MessageId>,
    outcomes: HashMap<MessageId, Outcome>,
    next_block: Option<u64>,
    scanned_through: Option<u64>,
    unmatched_relays: u64,
    ticks: u32,
}

impl ScanState {
    fn new(ids: &[MessageId]) -> Self {
        Self {
            pending: ids.iter().copied().collect(),
            outcomes: HashMap::new(),
            next_block: None,
            scanned_through: None,
            unmatched_relays: 0,
            ticks: 0,
        }
    }

    /// Resolve every pending id with the outcome built by `outcome`
    fn resolve_pending(&mut self, outcome: impl Fn() -> Outcome) {
        for id in self.pending.drain() {
            self.outcomes.insert(id, outcome());
        }
    }

    fn observe(&mut self, event: RelayEvent, resolve_on_failed_relay: bool) {
        let id = event.message_id;

        if !self.pending.contains(&id) {
            if self.outcomes.contains_key(&id) {
                debug!(message_id = %id, block = event.block_number, "Ignoring repeated relay");
            } else {
                self.unmatched_relays += 1;
            }
            return;
        }

        if !event.success && !resolve_on_failed_relay {
            warn!(
                message_id = %id,
                block = event.block_number,
                tx = %event.dest_tx_hash,
                "Relay failed on destination, waiting for replay"
            );
            return;
        }

        info!(
            message_id = %id,
            block = event.block_number,
            tx = %event.dest_tx_hash,
            success = event.success,
            "Found relay"
        );
        self.pending.remove(&id);
        self.outcomes.insert(id, Outcome::Found(event));
    }

    fn into_report(self) -> WatchReport {
        WatchReport {
            outcomes: self.outcomes,
            scanned_through: self.scanned_through,
            ticks: self.ticks,
        }
    }
}

/// Polls one destination messenger for relays
pub struct RelayPoller<S: ?Sized> {
    source: Arc<S>,
    dest_messenger: Address,
}

impl<S: ChainLogSource + ?Sized> RelayPoller<S> {
    pub fn new(source: Arc<S>, dest_messenger: Address) -> Self {
        Self {
            source,
            dest_messenger,
        }
    }

    /// Destination messenger this poller watches
    pub fn dest_messenger(&self) -> Address {
        self.dest_messenger
    }

    /// Poll until every id of `request` is terminal
    ///
    /// Never errors: failures of the shared query become `Outcome::Failed`
    /// for all ids that were still pending.
    pub async fn watch(&self, request: WatchRequest, cancel: CancellationToken) -> WatchReport {
        let options = &request.options;
        let deadline = request.deadline;
        let mut state = ScanState::new(&request.message_ids);
        let mut retry = RetryContext::with_config(options.backoff());

        info!(
            chain_id = self.source.chain_id(),
            messenger = %self.dest_messenger,
            messages = state.pending.len(),
            timeout = ?options.timeout,
            "Watching for relays"
        );

        while !state.pending.is_empty() {
            if Instant::now() >= deadline {
                state.resolve_pending(|| Outcome::TimedOut);
                break;
            }
            state.ticks += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    state.resolve_pending(|| Outcome::Cancelled);
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    state.resolve_pending(|| Outcome::TimedOut);
                    break;
                }
                result = self.tick(&mut state, options) => result,
            };

            let delay = match result {
                Ok(()) => {
                    retry.reset();
                    options.backoff().jittered_backoff(0)
                }
                Err(TickError::Source(e)) => {
                    retry.record_failure(e.clone());
                    match retry.next_action() {
                        RetryAction::RetryAfter(backoff) => {
                            warn!(
                                error = %e,
                                attempt = retry.attempt,
                                ?backoff,
                                "Relay poll failed, backing off"
                            );
                            backoff
                        }
                        RetryAction::GiveUp => {
                            let reason = if e.is_transient() {
                                FailureReason::RetriesExhausted {
                                    attempts: retry.attempt,
                                    last: e,
                                }
                            } else {
                                FailureReason::Source(e)
                            };
                            error!(reason = %reason, "Relay poll giving up");
                            state.resolve_pending(|| Outcome::Failed(reason.clone()));
                            break;
                        }
                    }
                }
                Err(TickError::Decode(e)) => {
                    error!(error = %e, "Undecodable relay log on destination messenger");
                    state.resolve_pending(|| Outcome::Failed(FailureReason::Decode(e.clone())));
                    break;
                }
                Err(TickError::ProtocolMismatch { observed }) => {
                    error!(
                        observed = observed,
                        messenger = %self.dest_messenger,
                        "Relay events match none of the watched ids, message hashing is out of date"
                    );
                    state.resolve_pending(|| {
                        Outcome::Failed(FailureReason::ProtocolMismatch { observed })
                    });
                    break;
                }
            };

            if state.pending.is_empty() {
                break;
            }

            // Sleep never runs past the deadline
            let sleep_for = delay.min(deadline.saturating_duration_since(Instant::now()));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    state.resolve_pending(|| Outcome::Cancelled);
                    break;
                }
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        let report = state.into_report();
        info!(
            found = report.outcomes.values().filter(|o| o.is_found()).count(),
            total = report.outcomes.len(),
            ticks = report.ticks,
            scanned_through = ?report.scanned_through,
            elapsed = ?request.started_at.elapsed(),
            "Relay watch finished"
        );
        report
    }

    /// Scan the next block range
    async fn tick(&self, state: &mut ScanState, options: &WatchOptions) -> Result<(), TickError> {
        let head = self.source.get_block_number().await?;
        let safe_head = head.saturating_sub(options.confirmations);

        let from = *state.next_block.get_or_insert_with(|| {
            options
                .start_block
                .unwrap_or_else(|| safe_head.saturating_sub(options.lookback_blocks))
        });

        if safe_head < from {
            debug!(head = head, next_block = from, "No new blocks to scan");
            return Ok(());
        }

        let to = from
            .saturating_add(options.max_block_range.max(1) - 1)
            .min(safe_head);
        let filter = LogFilter::new(self.dest_messenger)
            .event_signatures(relay_signatures())
            .block_range(from, to);

        let mut logs = self.source.get_logs(&filter).await?;
        logs.retain(|log| filter.matches(log));
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        logs.dedup_by_key(|log| (log.block_number, log.log_index));

        debug!(from = from, to = to, logs = logs.len(), "Scanned relay range");

        for log in &logs {
            match decode_relay_log(log) {
                Ok(Some(event)) => state.observe(event, options.resolve_on_failed_relay),
                Ok(None) => {}
                Err(e) => return Err(TickError::Decode(e)),
            }
        }

        state.next_block = Some(to + 1);
        state.scanned_through = Some(to);

        if let Some(threshold) = options.protocol_mismatch_threshold {
            if state.outcomes.is_empty() && state.unmatched_relays >= threshold {
                return Err(TickError::ProtocolMismatch {
                    observed: state.unmatched_relays,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::testing::{
        assert_found, assert_outcome, fixture_tx_hash, relayed_message_log, test_route,
        MemoryLogSource,
    };

    fn id(byte: u8) -> MessageId {
        MessageId::from_bytes([byte; 32])
    }

    fn options() -> WatchOptions {
        WatchOptions {
            poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(8),
            jitter: 0.0,
            timeout: Duration::from_secs(60),
            max_block_range: 2,
            start_block: Some(100),
            ..Default::default()
        }
    }

    fn poller(source: &Arc<MemoryLogSource>) -> RelayPoller<MemoryLogSource> {
        RelayPoller::new(source.clone(), test_route().dest_messenger)
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_at_block_105_with_two_block_step() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 105, 0, true));

        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], options()), CancellationToken::new())
            .await;

        let relay = assert_found(&report, &id(1)).unwrap();
        assert_eq!(relay.block_number, 105);
        assert_eq!(relay.dest_tx_hash, fixture_tx_hash(105));
        assert_eq!(report.scanned_through, Some(105));
        assert_eq!(report.ticks, 3);
        assert_eq!(
            source.queried_ranges(),
            vec![(100, 101), (102, 103), (104, 105)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_five_ticks() {
        let source = Arc::new(MemoryLogSource::new(420, 200));
        let opts = WatchOptions {
            timeout: Duration::from_secs(5),
            ..options()
        };

        let started = Instant::now();
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        assert_outcome(&report, &id(1), "timed_out").unwrap();
        assert_eq!(report.ticks, 5);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ranges_are_contiguous_and_disjoint() {
        let source = Arc::new(MemoryLogSource::new(420, 100));
        source.set_head_step(3);
        let opts = WatchOptions {
            timeout: Duration::from_secs(10),
            max_block_range: 4,
            ..options()
        };

        poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        let ranges = source.queried_ranges();
        assert!(ranges.len() > 3);
        assert_eq!(ranges[0].0, 100);
        for pair in ranges.windows(2) {
            assert_eq!(pair[1].0, pair[0].1 + 1);
            assert!(pair[0].0 <= pair[0].1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_source_answers_processed_once() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.set_overlap(3);
        // Unrelated relays that every widened answer would repeat
        for block in 100..110 {
            source.push_log(relayed_message_log(&route, id(0xee), block, 0, true));
        }
        source.push_log(relayed_message_log(&route, id(1), 107, 1, true));

        let opts = WatchOptions {
            protocol_mismatch_threshold: Some(11),
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1), id(2)], opts), CancellationToken::new())
            .await;

        // Re-evaluating the widened answers would cross the threshold before block 107
        assert_eq!(assert_found(&report, &id(1)).unwrap().block_number, 107);
        assert_outcome(&report, &id(2), "timed_out").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_found_untouched() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 101, 0, true));

        let opts = WatchOptions {
            timeout: Duration::from_secs(4),
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1), id(2)], opts), CancellationToken::new())
            .await;

        assert_eq!(assert_found(&report, &id(1)).unwrap().block_number, 101);
        assert_outcome(&report, &id(2), "timed_out").unwrap();
        assert_eq!(report.outcomes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_before_start_issues_no_calls() {
        let source = Arc::new(MemoryLogSource::new(420, 200));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = poller(&source)
            .watch(WatchRequest::new([id(1), id(2)], options()), cancel)
            .await;

        assert_outcome(&report, &id(1), "cancelled").unwrap();
        assert_outcome(&report, &id(2), "cancelled").unwrap();
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_in_flight_call() {
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.set_latency(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], options()), cancel)
            .await;

        assert_outcome(&report, &id(1), "cancelled").unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        let calls = source.total_calls();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.total_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_found_ids() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 100, 0, true));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let report = poller(&source)
            .watch(WatchRequest::new([id(1), id(2)], options()), cancel)
            .await;

        assert_eq!(assert_found(&report, &id(1)).unwrap().block_number, 100);
        assert_outcome(&report, &id(2), "cancelled").unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_then_found() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 100, 0, true));
        source.fail_next_get_logs(SourceError::Transient("connection reset".into()));
        source.fail_next_get_logs(SourceError::Transient("429 Too Many Requests".into()));

        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], options()), CancellationToken::new())
            .await;

        assert_found(&report, &id(1)).unwrap();
        assert_eq!(report.ticks, 3);
        // Failed ranges are retried, not skipped
        assert_eq!(
            source.queried_ranges(),
            vec![(100, 101), (100, 101), (100, 101)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_and_caps() {
        let source = Arc::new(MemoryLogSource::new(420, 200));
        for _ in 0..4 {
            source.fail_next_block_number(SourceError::Transient("timeout".into()));
        }

        let opts = WatchOptions {
            max_transient_retries: 10,
            timeout: Duration::from_secs(25),
            ..options()
        };
        let started = Instant::now();
        poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        // Four failures back off 2s, 4s, 8s and 8s (capped), then polls at 22s, 23s and 24s
        assert_eq!(source.block_number_calls(), 7);
        assert_eq!(source.get_logs_calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_fails_all_pending() {
        let source = Arc::new(MemoryLogSource::new(420, 200));
        for _ in 0..3 {
            source.fail_next_get_logs(SourceError::Transient("timeout".into()));
        }

        let opts = WatchOptions {
            max_transient_retries: 2,
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1), id(2)], opts), CancellationToken::new())
            .await;

        for message in [id(1), id(2)] {
            match report.outcome(&message) {
                Some(Outcome::Failed(FailureReason::RetriesExhausted { attempts, .. })) => {
                    assert_eq!(*attempts, 3)
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        assert_eq!(source.get_logs_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_fails_immediately() {
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.fail_next_get_logs(SourceError::Fatal("401 Unauthorized".into()));

        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], options()), CancellationToken::new())
            .await;

        assert_eq!(
            report.outcome(&id(1)),
            Some(&Outcome::Failed(FailureReason::Source(SourceError::Fatal(
                "401 Unauthorized".into()
            ))))
        );
        assert_eq!(report.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_relay_keeps_waiting_for_replay() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 100, 0, false));
        source.push_log(relayed_message_log(&route, id(1), 103, 0, true));

        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], options()), CancellationToken::new())
            .await;

        let relay = assert_found(&report, &id(1)).unwrap();
        assert_eq!(relay.block_number, 103);
        assert!(relay.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_relay_resolves_when_requested() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 100, 0, false));

        let opts = WatchOptions {
            resolve_on_failed_relay: true,
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        assert!(!assert_found(&report, &id(1)).unwrap().success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protocol_mismatch() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        for (i, block) in (100..104).enumerate() {
            source.push_log(relayed_message_log(&route, id(0x10 + i as u8), block, 0, true));
        }

        let opts = WatchOptions {
            protocol_mismatch_threshold: Some(3),
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        assert_eq!(
            report.outcome(&id(1)),
            Some(&Outcome::Failed(FailureReason::ProtocolMismatch { observed: 4 }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmations_hold_back_scanning() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 104));
        source.push_log(relayed_message_log(&route, id(1), 102, 0, true));

        let opts = WatchOptions {
            confirmations: 3,
            max_block_range: 10,
            timeout: Duration::from_secs(3),
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        assert_outcome(&report, &id(1), "timed_out").unwrap();
        assert_eq!(report.scanned_through, Some(101));
        assert_eq!(source.queried_ranges(), vec![(100, 101)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_block_defaults_to_lookback() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 500));
        source.push_log(relayed_message_log(&route, id(1), 460, 0, true));

        let opts = WatchOptions {
            start_block: None,
            lookback_blocks: 50,
            max_block_range: 100,
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        assert_found(&report, &id(1)).unwrap();
        assert_eq!(source.queried_ranges(), vec![(450, 500)]);
    }

    #[test]
    fn test_watch_request_dedups_ids() {
        let request = WatchRequest::new([id(1), id(2), id(1)], WatchOptions::default());
        assert_eq!(request.message_ids, vec![id(1), id(2)]);
        assert_eq!(request.deadline - request.started_at, Duration::from_secs(20 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_backoff_options_are_clamped() {
        let route = test_route();
        let source = Arc::new(MemoryLogSource::new(420, 200));
        source.push_log(relayed_message_log(&route, id(1), 102, 0, true));
        source.fail_next_get_logs(SourceError::Transient("timeout".into()));

        let opts = WatchOptions {
            jitter: f64::NAN,
            backoff_multiplier: -2.0,
            ..options()
        };
        let report = poller(&source)
            .watch(WatchRequest::new([id(1)], opts), CancellationToken::new())
            .await;

        assert_eq!(assert_found(&report, &id(1)).unwrap().block_number, 102);
    }

    #[test]
    fn test_options_validate() {
        assert!(WatchOptions::default().validate().is_ok());
        assert!(options().validate().is_ok());

        let invalid = [
            WatchOptions { jitter: f64::NAN, ..options() },
            WatchOptions { jitter: 1.5, ..options() },
            WatchOptions { backoff_multiplier: -2.0, ..options() },
            WatchOptions { backoff_multiplier: f64::INFINITY, ..options() },
            WatchOptions { poll_interval: Duration::ZERO, ..options() },
            WatchOptions { max_poll_interval: Duration::from_millis(500), ..options() },
            WatchOptions { max_block_range: 0, ..options() },
        ];
        for opts in invalid {
            match opts.validate() {
                Err(WatchError::InvalidOptions(_)) => {}
                other => panic!("expected InvalidOptions for {:?}, got {:?}", opts, other),
            }
        }
    }

    #[test]
    fn test_unbounded_timeout_does_not_overflow() {
        let request = WatchRequest::new(
            [id(1)],
            WatchOptions {
                timeout: Duration::MAX,
                ..options()
            },
        );
        assert!(request.deadline > request.started_at);
    }

    #[test]
    fn test_options_backoff() {
        let backoff = options().backoff();
        assert_eq!(backoff.initial_backoff, Duration::from_secs(1));
        assert_eq!(backoff.max_backoff, Duration::from_secs(8));
        assert_eq!(backoff.max_retries, 5);
    }
}
