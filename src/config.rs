//! Configuration for replication cursors.
//!
//! A [`FeedConfig`] names one feed endpoint and how to consume it.
//! Construct one with [`FeedConfig::minute()`] or
//! [`FeedConfig::changesets()`] and adjust fields as needed:
//!
//! ```rust
//! use osm_replication_engine::config::FeedConfig;
//!
//! let config = FeedConfig {
//!     start_sequence: Some(141_042),
//!     ..FeedConfig::minute()
//! };
//! ```
//!
//! # Fields
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `base_url` | Feed root, no trailing slash |
//! | `expected_interval` | Nominal publish cadence, drives pacing |
//! | `parse_timestamps` | Parse timestamps vs. keep raw strings |
//! | `state_dir` | Where to persist the checkpoint (`None` = don't) |
//! | `start_sequence` | Explicit starting page, overrides everything |
//!
//! Start precedence when the cursor initializes: `start_sequence` if
//! set; else a checkpoint found in `state_dir`; else the feed's remote
//! "current sequence" pointer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default minute-diff endpoint.
pub const MINUTE_BASE_URL: &str = "https://planet.openstreetmap.org/replication/minute";
/// Default changeset-dump endpoint.
pub const CHANGESET_BASE_URL: &str = "https://planet.openstreetmap.org/replication/changesets";

/// Configuration for one replication feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Feed root URL, without a trailing slash.
    pub base_url: String,

    /// The feed's nominal publish interval.
    #[serde(with = "duration_secs")]
    pub expected_interval: Duration,

    /// Parse timestamp attributes into instants (`true`) or keep the
    /// raw source strings (`false`). The parser never guesses.
    pub parse_timestamps: bool,

    /// Directory for the checkpoint file. Must already exist when set;
    /// `None` disables persistence (the cursor still runs, it just
    /// can't resume).
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Explicit starting sequence number. Takes precedence over both
    /// the checkpoint and the remote state pointer.
    #[serde(default)]
    pub start_sequence: Option<u64>,
}

impl FeedConfig {
    /// The public minutely diff feed.
    pub fn minute() -> Self {
        Self {
            base_url: MINUTE_BASE_URL.to_string(),
            expected_interval: Duration::from_secs(60),
            parse_timestamps: true,
            state_dir: None,
            start_sequence: None,
        }
    }

    /// The public changeset replication feed.
    pub fn changesets() -> Self {
        Self {
            base_url: CHANGESET_BASE_URL.to_string(),
            expected_interval: Duration::from_secs(60),
            parse_timestamps: true,
            state_dir: None,
            start_sequence: None,
        }
    }

    /// A config pointed at a local mock server, starting from an
    /// explicit sequence. Used by the test suites.
    pub fn for_testing(base_url: impl Into<String>, start_sequence: u64) -> Self {
        Self {
            base_url: base_url.into(),
            expected_interval: Duration::from_secs(60),
            parse_timestamps: true,
            state_dir: None,
            start_sequence: Some(start_sequence),
        }
    }
}

/// Serialize `Duration` as whole seconds, matching the feed's own units.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
