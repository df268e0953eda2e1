//! Shared test fixtures: a scripted Transport and gzip helpers.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use osm_replication_engine::fetch::{FetchResponse, Transport};
use osm_replication_engine::{ReplicationError, Result};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Gzip a fixture payload the way the feed publishes pages.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Mock [`Transport`] with per-URL response scripts.
///
/// Responses for a URL are consumed front to back; the last one sticks,
/// so a single `Body` entry behaves like a published page that stays
/// published. Every request is recorded for assertions; clones share
/// state, so a test can keep a handle after moving one into a cursor.
#[derive(Default, Clone)]
pub struct MockTransport {
    scripts: Arc<Mutex<HashMap<String, Vec<FetchResponse>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one response to a URL's script.
    pub fn on(&self, url: &str, response: FetchResponse) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(response);
    }

    /// Script a URL to serve a body.
    pub fn on_body(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.on(url, FetchResponse::Body(Bytes::from(body.into())));
    }

    /// Script a URL to 404 once (before any later responses).
    pub fn on_missing(&self, url: &str) {
        self.on(url, FetchResponse::NotYetPublished);
    }

    /// Every URL requested so far, in order.
    #[allow(dead_code)] // Recorded for future detailed assertions
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// How many times one URL was requested.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        self.requests.lock().unwrap().push(url.to_string());

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
            Some(queue) if queue.len() == 1 => Ok(queue[0].clone()),
            _ => Err(ReplicationError::Http {
                status: 599,
                url: format!("unscripted URL: {url}"),
            }),
        }
    }
}
