// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication client.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Transport` | Yes | Connection failures, timeouts, TLS errors |
//! | `Http` | No | Non-404 HTTP status on a feed URL |
//! | `Decompression` | No | Gzip envelope corrupt or truncated |
//! | `Xml` | No | Malformed XML in a page body |
//! | `Structure` | No | Child element with no open parent entity |
//! | `MissingField` | No | Required attribute absent |
//! | `InvalidValue` | No | Attribute failed numeric/timestamp coercion |
//! | `Config` | No | Requested state directory does not exist |
//! | `Io` | No | Checkpoint read/write failure |
//! | `ConnectionClosed` | Yes | Realtime peer hung up |
//! | `InvalidState` | No | Cursor driven after termination |
//!
//! HTTP 404 on a replication page never appears here: "not yet published"
//! is an expected outcome of the feed's publish cadence, modeled as
//! [`FetchResponse::NotYetPublished`](crate::fetch::FetchResponse) and
//! retried inside [`FetchPolicy`](crate::fetch::FetchPolicy).
//!
//! # Retry Behavior
//!
//! The cursor itself never retries a fatal error: a page either parses
//! completely and advances the checkpoint, or the cursor stops without
//! having advanced it. [`ReplicationError::is_retryable()`] tells a
//! *supervisor* whether recreating the cursor (which resumes from the
//! checkpoint, at-least-once) is worth attempting.

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while consuming a replication feed.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Non-404 HTTP status on a feed URL.
    ///
    /// Only 404 is treated as "not yet published"; every other status is
    /// fatal and propagated.
    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    /// Connection-level HTTP failure (DNS, TLS, timeout, reset).
    ///
    /// Retryable by a supervisor: the checkpoint makes resumption safe.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Gzip envelope could not be decoded.
    ///
    /// Not retryable - the page is corrupt at the source.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// The XML reader reported malformed input.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A child element (`tag`, `nd`, `member`) arrived with no open
    /// parent entity. Indicates corrupt or out-of-order input.
    #[error("Structure error: {0}")]
    Structure(String),

    /// A required attribute was absent.
    #[error("Missing attribute `{attribute}` on <{element}>")]
    MissingField {
        element: &'static str,
        attribute: &'static str,
    },

    /// An attribute value failed numeric or timestamp coercion.
    #[error("Invalid value for `{attribute}`: {value:?}")]
    InvalidValue { attribute: String, value: String },

    /// Invalid or missing configuration (e.g. the requested state
    /// directory does not exist). Raised before any network activity.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint persistence failure.
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The realtime peer closed the connection. There is no clean
    /// end-of-stream in the protocol; reconnecting resumes the feed.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Cursor driven in the wrong state (e.g. after `terminate()`).
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl ReplicationError {
    /// Shorthand for a [`ReplicationError::Structure`].
    pub fn structure(msg: impl Into<String>) -> Self {
        Self::Structure(msg.into())
    }

    /// Check if this error is retryable by recreating the cursor.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true, // Network blips
            Self::ConnectionClosed => true,
            Self::Http { .. } => false, // Server said no, not "not yet"
            Self::Decompression(_) => false, // Data corruption
            Self::Xml(_) => false,
            Self::Structure(_) => false,
            Self::MissingField { .. } => false,
            Self::InvalidValue { .. } => false,
            Self::Config(_) => false,
            Self::Io(_) => false,
            Self::InvalidState { .. } => false,
        }
    }
}
