// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! State pointers and checkpoint persistence.
//!
//! Both feeds describe their current position with tiny line-oriented
//! key/value files:
//!
//! - `state.txt` (minute diffs): `key=value`, `#` comment lines, and
//!   Java-properties-style escaped colons in the timestamp
//!   (`2024-03-01T12\:00\:00Z`).
//! - `state.yaml` (changesets): `key: value`, with `---` document
//!   markers and `#` comments ignored.
//!
//! The checkpoint file reuses the same shape: the cursor writes it after
//! each fully-delivered page and reads it back verbatim on resume.
//!
//! # Crash Semantics
//!
//! The checkpoint stores the sequence number of the **last fully
//! delivered** page; resume continues at `checkpoint + 1`. It is written
//! only after every entity of a page has been yielded, with an atomic
//! write-then-rename, so a crash mid-page replays that whole page on
//! restart (at-least-once delivery — consumers must tolerate a replayed
//! page).

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{ReplicationError, Result};
use crate::model::TIMESTAMP_FORMAT;

/// Parse a line-oriented key/value state file.
///
/// Lines starting with `---` or `#` and blank lines are ignored. Values
/// are trimmed and `\:` escapes are unescaped. `sep` is `'='` for
/// `state.txt` and `':'` for `state.yaml`.
pub fn read_state(text: &str, sep: char) -> Result<HashMap<String, String>> {
    let mut state = HashMap::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with("---") || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once(sep).ok_or_else(|| {
            ReplicationError::structure(format!("state line without {sep:?}: {line:?}"))
        })?;
        state.insert(
            key.trim().to_string(),
            value.trim().replace("\\:", ":"),
        );
    }

    Ok(state)
}

/// A parsed state pointer: which sequence a feed is at, and (for the
/// minute feed) when that page was nominally published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatePointer {
    pub sequence: u64,
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatePointer {
    /// Parse minute-feed `state.txt` (`sequenceNumber`, `timestamp`).
    pub fn from_state_txt(text: &str) -> Result<Self> {
        let state = read_state(text, '=')?;
        let sequence = state
            .get("sequenceNumber")
            .ok_or(ReplicationError::MissingField {
                element: "state.txt",
                attribute: "sequenceNumber",
            })?
            .parse::<u64>()
            .map_err(|_| ReplicationError::InvalidValue {
                attribute: "sequenceNumber".to_string(),
                value: state["sequenceNumber"].clone(),
            })?;

        let timestamp = state
            .get("timestamp")
            .map(|raw| {
                NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                    .map(|naive| naive.and_utc())
                    .map_err(|_| ReplicationError::InvalidValue {
                        attribute: "timestamp".to_string(),
                        value: raw.clone(),
                    })
            })
            .transpose()?;

        Ok(Self {
            sequence,
            timestamp,
        })
    }

    /// Parse changeset-feed `state.yaml` (`sequence`; no timestamp).
    pub fn from_state_yaml(text: &str) -> Result<Self> {
        let state = read_state(text, ':')?;
        let raw = state.get("sequence").ok_or(ReplicationError::MissingField {
            element: "state.yaml",
            attribute: "sequence",
        })?;
        let sequence = raw
            .parse::<u64>()
            .map_err(|_| ReplicationError::InvalidValue {
                attribute: "sequence".to_string(),
                value: raw.clone(),
            })?;

        Ok(Self {
            sequence,
            timestamp: None,
        })
    }
}

/// Flat-file checkpoint for one cursor.
///
/// Each cursor owns its own checkpoint path; there is no concurrent
/// writer contract. The write is a single atomic file replace.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// `state_dir` must already exist: a missing directory is a
    /// configuration error, raised here, before any network activity.
    pub fn new(state_dir: impl Into<PathBuf>, file_name: &str) -> Result<Self> {
        let dir = state_dir.into();
        if !dir.is_dir() {
            return Err(ReplicationError::Config(format!(
                "state_dir {:?} doesn't exist",
                dir
            )));
        }
        Ok(Self {
            path: dir.join(file_name),
        })
    }

    /// Read back the last persisted checkpoint, verbatim. `None` on a
    /// first run (no file yet).
    pub async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the checkpoint: write a sibling temp file,
    /// then rename over the target.
    pub async fn save(&self, contents: &str) -> Result<()> {
        let mut tmp = self.path.clone();
        tmp.as_mut_os_string().push(".tmp");

        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = ?self.path, "checkpoint persisted");
        Ok(())
    }
}
