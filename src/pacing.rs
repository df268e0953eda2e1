//! Poll pacing between replication pages.
//!
//! After a page is fully processed, the cursor sleeps until the next one
//! is nominally due, so it tracks the feed's publish cadence instead of
//! hammering the server. The target instant is
//!
//! ```text
//! last_page_nominal_timestamp + expected_interval + fudge
//! ```
//!
//! where `fudge` is the backoff debt accumulated by
//! [`FetchPolicy`](crate::fetch::FetchPolicy) — a feed that has been
//! publishing late gets polled a little later, and the fudge decays away
//! once fetches stop missing. If the target is already in the past, the
//! delay is zero: the cursor is behind and should catch up immediately.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

/// Computes the sleep between pages for one feed.
#[derive(Debug, Clone, Copy)]
pub struct PacingController {
    expected_interval: Duration,
}

impl PacingController {
    /// `expected_interval` is the feed's nominal publish interval
    /// (one minute for the minutely diffs).
    pub fn new(expected_interval: Duration) -> Self {
        Self { expected_interval }
    }

    /// Delay before the next poll, given the last page's nominal
    /// timestamp and the current fudge. Reads the wall clock.
    pub fn next_delay(&self, last: DateTime<Utc>, fudge: f64) -> Duration {
        next_delay_at(last, self.expected_interval, fudge, Utc::now())
    }
}

/// Pure form of the pacing rule with an injected "now", used directly by
/// tests and by [`PacingController::next_delay`].
pub fn next_delay_at(
    last: DateTime<Utc>,
    expected_interval: Duration,
    fudge: f64,
    now: DateTime<Utc>,
) -> Duration {
    let interval = ChronoDuration::milliseconds(expected_interval.as_millis() as i64);
    let fudge = ChronoDuration::milliseconds((fudge * 1000.0) as i64);
    let target = last + interval + fudge;

    if now >= target {
        Duration::ZERO
    } else {
        (target - now).to_std().unwrap_or(Duration::ZERO)
    }
}
