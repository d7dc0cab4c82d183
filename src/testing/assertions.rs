//! Outcome Assertions
//!
//! Assertion helpers over [`WatchReport`]s, returning `eyre` errors so they
//! compose with `?` in integration tests.

use eyre::{eyre, Result};

use crate::poller::WatchReport;
use crate::types::{MessageId, Outcome, RelayEvent};

/// Assert that `id` was found and return its relay record
pub fn assert_found<'a>(report: &'a WatchReport, id: &MessageId) -> Result<&'a RelayEvent> {
    match report.outcomes.get(id) {
        Some(Outcome::Found(event)) => Ok(event),
        Some(other) => Err(eyre!("Message {} expected found, got {}", id, other)),
        None => Err(eyre!("Message {} missing from report", id)),
    }
}

/// Assert the terminal state name (`found`, `timed_out`, `failed`, `cancelled`) of `id`
pub fn assert_outcome(report: &WatchReport, id: &MessageId, expected: &str) -> Result<()> {
    let outcome = report
        .outcomes
        .get(id)
        .ok_or_else(|| eyre!("Message {} missing from report", id))?;
    if outcome.as_str() != expected {
        return Err(eyre!(
            "Message {} expected {}, got {}",
            id,
            expected,
            outcome
        ));
    }
    Ok(())
}
