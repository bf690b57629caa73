// crates/xpart-store-http/src/retry.rs
// ============================================================================
// Module: Throttling Retry Policy
// Description: Bounded retries for rate-limited requests.
// Purpose: Decide whether and how long to wait after a 429 response.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Throttled requests are retried up to a fixed number of times and within a
//! cumulative wait budget. The service's suggested delay is honored when
//! present; otherwise the delay doubles from a small base.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// First fallback delay when the service suggests none.
const BASE_DELAY: Duration = Duration::from_millis(100);
/// Upper bound for a single fallback delay.
const MAX_FALLBACK_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Retry budget for throttled requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    pub max_attempts_on_throttled: u32,
    /// Maximum cumulative wait across retries.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_on_throttled: 9,
            max_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `retry` (zero-based), or `None`
    /// when the budget is exhausted.
    #[must_use]
    pub fn next_delay(
        &self,
        retry: u32,
        waited: Duration,
        suggested: Option<Duration>,
    ) -> Option<Duration> {
        if retry >= self.max_attempts_on_throttled {
            return None;
        }
        let delay = suggested.unwrap_or_else(|| fallback_delay(retry));
        let total = waited.checked_add(delay)?;
        (total <= self.max_wait).then_some(delay)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Exponential fallback delay capped at [`MAX_FALLBACK_DELAY`].
fn fallback_delay(retry: u32) -> Duration {
    let factor = 1_u32.checked_shl(retry).unwrap_or(u32::MAX);
    BASE_DELAY.checked_mul(factor).map_or(MAX_FALLBACK_DELAY, |delay| delay.min(MAX_FALLBACK_DELAY))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
