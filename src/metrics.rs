//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Page fetches and 404 backoff
//! - Entities parsed per feed
//! - Cursor position and checkpoint writes
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `osm_replication_` and follow
//! Prometheus conventions: counters end in `_total`, gauges represent
//! current state, histograms track distributions.
//!
//! The host application installs whatever `metrics` recorder it wants
//! (Prometheus exporter, statsd, none); this crate only records.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a successful page (or state pointer) fetch.
pub fn record_fetch(url: &str, bytes: usize) {
    counter!("osm_replication_fetches_total").increment(1);
    histogram!("osm_replication_fetch_bytes").record(bytes as f64);
    let _ = url; // Unlabelled: URLs are unbounded cardinality
}

/// Record one "not yet published" backoff sleep.
pub fn record_backoff(delay: Duration) {
    counter!("osm_replication_backoffs_total").increment(1);
    histogram!("osm_replication_backoff_seconds").record(delay.as_secs_f64());
}

/// Record entities delivered from one page.
pub fn record_entities(feed: &'static str, count: u64) {
    counter!("osm_replication_entities_total", "feed" => feed).increment(count);
}

/// Record the cursor's current sequence number.
pub fn record_sequence(feed: &'static str, sequence: u64) {
    gauge!("osm_replication_sequence", "feed" => feed).set(sequence as f64);
}

/// Record a checkpoint write.
pub fn record_checkpoint(feed: &'static str) {
    counter!("osm_replication_checkpoints_total", "feed" => feed).increment(1);
}

/// Record the pacing sleep chosen after a page.
pub fn record_pacing_delay(feed: &'static str, delay: Duration) {
    histogram!("osm_replication_pacing_seconds", "feed" => feed).record(delay.as_secs_f64());
}

/// Record one realtime frame delivered.
pub fn record_frame(bytes: usize) {
    counter!("osm_replication_frames_total").increment(1);
    histogram!("osm_replication_frame_bytes").record(bytes as f64);
}
