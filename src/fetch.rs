// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Page fetching with "not yet published" backoff.
//!
//! Replication pages are published slightly behind their nominal
//! schedule, so a 404 on a page URL usually means "too early", not
//! "gone". [`FetchPolicy`] retries 404s forever with exponential backoff
//! and keeps a running **fudge** total — the accumulated backoff time —
//! that [`pacing`](crate::pacing) later folds into the next poll delay so
//! the cursor's long-term interval tracks the feed instead of drifting.
//!
//! Every other HTTP status and any transport failure is fatal and
//! propagates immediately.
//!
//! The [`Transport`] trait is the seam for tests: the cursor is generic
//! over it, and the integration suite drives it with a scripted mock.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ReplicationError, Result};
use crate::metrics;

/// Backoff starts at one second and doubles per miss, capped at the
/// feed's conventional 13-second ceiling.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(13);

/// Outcome of one HTTP GET against a feed URL.
///
/// "Not yet published" is a first-class outcome, not an error: retry
/// logic for it lives in [`FetchPolicy`], visibly, rather than in a
/// catch block.
#[derive(Debug, Clone)]
pub enum FetchResponse {
    /// 200 with the page bytes.
    Body(Bytes),
    /// 404: the page is expected to exist soon.
    NotYetPublished,
}

/// Minimal HTTP GET abstraction.
///
/// Implementations map 404 to [`FetchResponse::NotYetPublished`], any
/// other non-success status to [`ReplicationError::Http`], and transport
/// failures to [`ReplicationError::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse>;
}

/// [`Transport`] over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with this crate's User-Agent.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                "osm-replication-engine/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (custom proxy, timeouts, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Ok(FetchResponse::NotYetPublished);
        }
        if !status.is_success() {
            return Err(ReplicationError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(FetchResponse::Body(response.bytes().await?))
    }
}

/// Retry-and-pacing policy for one cursor.
///
/// One instance per cursor: the fudge accumulator is fed by every fetch
/// the cursor performs (state pointers and page bodies alike) and decays
/// by half on each success, so it converges back to zero once the feed
/// catches up.
#[derive(Debug)]
pub struct FetchPolicy {
    fudge: f64,
}

impl FetchPolicy {
    pub fn new() -> Self {
        Self { fudge: 0.0 }
    }

    /// Accumulated backoff in seconds. Read by the pacing controller;
    /// only this policy mutates it.
    pub fn fudge(&self) -> f64 {
        self.fudge
    }

    /// Fetch one URL, sleeping through "not yet published" until the
    /// page appears. There is no retry limit: the page is assumed to
    /// eventually exist.
    ///
    /// Each miss sleeps the current delay, adds the slept time to the
    /// fudge total, then doubles the delay up to [`MAX_BACKOFF`]. Success
    /// halves the fudge (decay toward zero, not a reset).
    pub async fn fetch<T: Transport + ?Sized>(&mut self, transport: &T, url: &str) -> Result<Bytes> {
        let mut delay = INITIAL_BACKOFF;
        loop {
            match transport.get(url).await? {
                FetchResponse::Body(bytes) => {
                    self.fudge -= self.fudge / 2.0;
                    trace!(url, bytes = bytes.len(), fudge = self.fudge, "fetched");
                    metrics::record_fetch(url, bytes.len());
                    return Ok(bytes);
                }
                FetchResponse::NotYetPublished => {
                    debug!(url, delay_secs = delay.as_secs_f64(), "not yet published, backing off");
                    metrics::record_backoff(delay);
                    tokio::time::sleep(delay).await;
                    self.fudge += delay.as_secs_f64();
                    delay = std::cmp::min(delay * 2, MAX_BACKOFF);
                }
            }
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Decompress a gzip envelope. A page either decodes completely or is
/// corrupt at the source; truncation is an error, not a partial result.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ReplicationError::Decompression(e.to_string()))?;
    Ok(out)
}
