//! Backoff and error classification for destination polling
//!
//! Provides exponential backoff with jitter and the transient/permanent split
//! used to decide whether a failed log query is retried.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::SourceError;

/// Poll backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay between successful polls, and the base of the error backoff
    pub initial_backoff: Duration,
    /// Upper bound for any single delay (before jitter)
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
    /// Extra random delay as a fraction of the computed delay (0.0 disables)
    pub jitter: f64,
    /// Retries allowed after consecutive transient failures before giving up
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: 0.1,
            max_retries: 5,
        }
    }
}

impl BackoffConfig {
    /// Multiplier actually applied: non-finite or shrinking values fall back to 1.0
    fn effective_multiplier(&self) -> f64 {
        if self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        }
    }

    /// Jitter actually applied, within `0.0..=1.0`; NaN disables it
    fn effective_jitter(&self) -> f64 {
        if self.jitter > 0.0 {
            self.jitter.min(1.0)
        } else {
            0.0
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed), without jitter
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs = self.initial_backoff.as_secs_f64()
            * self.effective_multiplier().powi(attempt.min(i32::MAX as u32) as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    /// Backoff for an attempt with up to `jitter * backoff` added
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        let jitter = self.effective_jitter();
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.0..=jitter);
        let extra = Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(base);
        base.saturating_add(extra)
    }

    /// Check if another retry is allowed after `failures` consecutive failures
    pub fn should_retry(&self, failures: u32) -> bool {
        failures <= self.max_retries
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues, rate limits)
    Transient,
    /// Permanent failure - do not retry (auth, malformed request)
    Permanent,
    /// Unknown error - may retry with backoff
    Unknown,
}

/// Classify an error message for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    // Transient errors
    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("429")
        || error_lower.contains("502")
        || error_lower.contains("503")
        || error_lower.contains("504")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("header not found")
        || error_lower.contains("limit exceeded")
    {
        return ErrorClass::Transient;
    }

    // Permanent errors
    if error_lower.contains("unauthorized")
        || error_lower.contains("401")
        || error_lower.contains("403")
        || error_lower.contains("forbidden")
        || error_lower.contains("invalid api key")
        || error_lower.contains("method not found")
        || error_lower.contains("invalid params")
        || error_lower.contains("invalid request")
        || error_lower.contains("parse error")
        || error_lower.contains("unsupported")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Consecutive-failure tracker for one watch request
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub config: BackoffConfig,
    pub attempt: u32,
    pub last_error: Option<SourceError>,
}

impl RetryContext {
    pub fn with_config(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt: 0,
            last_error: None,
        }
    }

    /// Record a failed attempt
    pub fn record_failure(&mut self, error: SourceError) {
        self.attempt += 1;
        self.last_error = Some(error);
    }

    /// Get the decision for the next attempt
    pub fn next_action(&self) -> RetryAction {
        let Some(error) = self.last_error.as_ref() else {
            return RetryAction::RetryAfter(self.config.initial_backoff);
        };

        match error {
            SourceError::Fatal(message) => {
                warn!(error = %message, "Fatal log source error - not retrying");
                RetryAction::GiveUp
            }
            SourceError::Transient(message) => {
                if !self.config.should_retry(self.attempt) {
                    return RetryAction::GiveUp;
                }
                let backoff = self.config.jittered_backoff(self.attempt);
                debug!(
                    ?backoff,
                    attempt = self.attempt,
                    error = %message,
                    "Transient error - retrying"
                );
                RetryAction::RetryAfter(backoff)
            }
        }
    }

    /// Reset after a successful poll
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_error = None;
    }
}

/// Action to take after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAction {
    /// Retry after a backoff period
    RetryAfter(Duration),
    /// Stop polling and fail the pending messages
    GiveUp,
}
