// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replication cursor: an infinite, resumable stream of map edits.
//!
//! A [`ReplicationCursor`] walks a numbered-page feed one page at a time,
//! yielding every entity in the page and then a single
//! [`Event::Finished`] marker, forever. The caller drives progress by
//! asking for the next event (pull-based); production may block on the
//! network, a 404 backoff, or the end-of-page pacing sleep, and none of
//! those hold any lock.
//!
//! # State Transitions
//!
//! ```text
//!                (start resolved: explicit > checkpoint > remote pointer)
//! Uninitialized ──────────────────────────────────────────→ Resolving
//!                                                               │
//!                              (page URL built, state fetched)  │
//!                                                               ↓
//!        ┌─────────────────────────────────────────────── Fetching
//!        │                                                      │
//!        │ (sequence + 1)                 (body fetched,        │
//!        │                                 gunzipped)           ↓
//!      Paced ←──────────────────────────────────────────── Parsing
//!        ↑          (entities drained, Finished emitted,        │
//!        │           checkpoint persisted)                      │
//!        └──────────────────────────────────────────────────────┘
//!
//! Terminated: only via terminate() or a fatal error — the feed itself
//! never ends.
//! ```
//!
//! # Feed Flavors
//!
//! | | Minute diffs | Changeset dumps |
//! |---|---|---|
//! | Page | `NNN/NNN/NNN.osc.gz` | `NNN/NNN/NNN.osm.gz` |
//! | Pointer | `state.txt` (`=`) | `state.yaml` (`:`) |
//! | Entities | `Event::Change(action, element)` | bare `Event::Element` |
//! | Nominal timestamp | per-page `.state.txt` | none |
//! | Pacing | timestamp + interval + fudge | 404 backoff only |
//!
//! # Delivery Guarantee
//!
//! The checkpoint is written only after a page's entities have all been
//! yielded, so a crash mid-page replays that whole page on restart:
//! at-least-once, never lost. Consumers own idempotency.

use std::fmt;
use std::io::Cursor as IoCursor;

use chrono::{DateTime, Utc};
use futures::Stream;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::error::{ReplicationError, Result};
use crate::fetch::{gunzip, FetchPolicy, HttpTransport, Transport};
use crate::metrics;
use crate::model::{Action, Element, Event, Finished, Timestamp};
use crate::pacing::PacingController;
use crate::parser::{ChangeReader, OsmReader};
use crate::state::{CheckpointStore, StatePointer};

/// Shard a sequence number into the feed's on-disk path convention:
/// zero-padded to 9 digits, split into three 3-digit segments.
///
/// `141042` → `000/141/042`.
pub fn sequence_path(sequence: u64) -> String {
    let padded = format!("{sequence:09}");
    format!("{}/{}/{}", &padded[0..3], &padded[3..6], &padded[6..9])
}

/// Where the cursor is in its page loop. See the module docs for the
/// transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Created, starting sequence not yet determined.
    Uninitialized,
    /// Determining the page's URL and (minute feed) nominal timestamp.
    Resolving,
    /// Fetching and decompressing the page body.
    Fetching,
    /// Draining entities out of the current page.
    Parsing,
    /// Page complete; sleeping off the publish cadence before the next.
    Paced,
    /// Stopped by the caller or a fatal error. Final.
    Terminated,
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CursorState::Uninitialized => "Uninitialized",
            CursorState::Resolving => "Resolving",
            CursorState::Fetching => "Fetching",
            CursorState::Parsing => "Parsing",
            CursorState::Paced => "Paced",
            CursorState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Which feed shape this cursor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Minute,
    Changesets,
}

impl FeedKind {
    fn label(self) -> &'static str {
        match self {
            FeedKind::Minute => "minute",
            FeedKind::Changesets => "changesets",
        }
    }

    fn page_ext(self) -> &'static str {
        match self {
            FeedKind::Minute => "osc.gz",
            FeedKind::Changesets => "osm.gz",
        }
    }

    fn pointer_name(self) -> &'static str {
        match self {
            FeedKind::Minute => "state.txt",
            FeedKind::Changesets => "state.yaml",
        }
    }

    fn parse_pointer(self, text: &str) -> Result<StatePointer> {
        match self {
            FeedKind::Minute => StatePointer::from_state_txt(text),
            FeedKind::Changesets => StatePointer::from_state_yaml(text),
        }
    }
}

type PageIter = Box<dyn Iterator<Item = Result<(Option<Action>, Element)>> + Send>;

/// A pull-based cursor over one replication feed.
///
/// Single logical thread of control: no two pages are fetched or parsed
/// concurrently by one cursor. Run independent cursors for overlap.
pub struct ReplicationCursor<T: Transport = HttpTransport> {
    config: FeedConfig,
    kind: FeedKind,
    transport: T,
    policy: FetchPolicy,
    pacing: PacingController,
    checkpoint: Option<CheckpointStore>,
    state: CursorState,
    sequence: u64,
    /// Nominal publish instant of the current page (minute feed only).
    page_timestamp: Option<DateTime<Utc>>,
    /// Verbatim text of the current page's state.txt, persisted as the
    /// checkpoint (minute feed only).
    page_state_text: Option<String>,
    /// State pointer text fetched during start resolution, reused for
    /// the first page instead of re-fetching it.
    resolved_state: Option<(u64, String)>,
    page: Option<PageIter>,
    entities_in_page: u64,
}

impl<T: Transport> fmt::Debug for ReplicationCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationCursor")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl ReplicationCursor<HttpTransport> {
    /// Cursor over the minutely diff feed.
    pub fn minute(config: FeedConfig) -> Result<Self> {
        Self::minute_with_transport(config, HttpTransport::new()?)
    }

    /// Cursor over the changeset replication feed.
    pub fn changesets(config: FeedConfig) -> Result<Self> {
        Self::changesets_with_transport(config, HttpTransport::new()?)
    }
}

impl<T: Transport> ReplicationCursor<T> {
    /// Minute-diff cursor over a caller-supplied transport.
    pub fn minute_with_transport(config: FeedConfig, transport: T) -> Result<Self> {
        Self::with_kind(FeedKind::Minute, config, transport)
    }

    /// Changeset cursor over a caller-supplied transport.
    pub fn changesets_with_transport(config: FeedConfig, transport: T) -> Result<Self> {
        Self::with_kind(FeedKind::Changesets, config, transport)
    }

    fn with_kind(kind: FeedKind, config: FeedConfig, transport: T) -> Result<Self> {
        // Checkpoint directory problems surface here, before any
        // network activity.
        let checkpoint = config
            .state_dir
            .as_ref()
            .map(|dir| CheckpointStore::new(dir, kind.pointer_name()))
            .transpose()?;

        Ok(Self {
            pacing: PacingController::new(config.expected_interval),
            config,
            kind,
            transport,
            policy: FetchPolicy::new(),
            checkpoint,
            state: CursorState::Uninitialized,
            sequence: 0,
            page_timestamp: None,
            page_state_text: None,
            resolved_state: None,
            page: None,
            entities_in_page: 0,
        })
    }

    /// Current position in the state machine.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// The sequence number being worked on, once resolved.
    pub fn sequence(&self) -> Option<u64> {
        if self.state == CursorState::Uninitialized {
            None
        } else {
            Some(self.sequence)
        }
    }

    /// Stop the cursor. Cooperative: the current page is not abandoned
    /// retroactively — the caller simply stops seeing events.
    pub fn terminate(&mut self) {
        info!(feed = self.kind.label(), "cursor terminated");
        self.state = CursorState::Terminated;
    }

    /// Produce the next event, blocking as needed on fetches, 404
    /// backoff, or the pacing sleep.
    ///
    /// Any error is fatal for this cursor: it transitions to
    /// `Terminated` without having advanced the checkpoint, so a fresh
    /// cursor resumes from the last fully-delivered page.
    pub async fn next_event(&mut self) -> Result<Event> {
        let result = self.advance().await;
        if result.is_err() {
            self.state = CursorState::Terminated;
        }
        result
    }

    /// Adapt the cursor into a `futures::Stream`. The stream is
    /// logically infinite; dropping it cancels the cursor.
    pub fn into_stream(self) -> impl Stream<Item = Result<Event>>
    where
        T: 'static,
    {
        futures::stream::try_unfold(self, |mut cursor| async move {
            let event = cursor.next_event().await?;
            Ok(Some((event, cursor)))
        })
    }

    async fn advance(&mut self) -> Result<Event> {
        loop {
            match self.state {
                CursorState::Uninitialized => {
                    self.resolve_start().await?;
                    self.state = CursorState::Resolving;
                }
                CursorState::Resolving => {
                    self.resolve_page_state().await?;
                    self.state = CursorState::Fetching;
                }
                CursorState::Fetching => {
                    self.fetch_page().await?;
                    self.state = CursorState::Parsing;
                }
                CursorState::Parsing => match self.page.as_mut().and_then(Iterator::next) {
                    Some(Ok((Some(action), element))) => {
                        self.entities_in_page += 1;
                        return Ok(Event::Change(action, element));
                    }
                    Some(Ok((None, element))) => {
                        self.entities_in_page += 1;
                        return Ok(Event::Element(element));
                    }
                    Some(Err(e)) => return Err(e),
                    None => return self.finish_page().await.map(Event::Finished),
                },
                CursorState::Paced => {
                    self.pace().await;
                    self.sequence += 1;
                    self.state = CursorState::Resolving;
                }
                CursorState::Terminated => {
                    return Err(ReplicationError::InvalidState {
                        expected: "an active cursor".to_string(),
                        actual: CursorState::Terminated.to_string(),
                    });
                }
            }
        }
    }

    /// Determine the starting sequence number, by precedence: explicit
    /// config, persisted checkpoint (resume at `+1`), remote pointer.
    async fn resolve_start(&mut self) -> Result<()> {
        if let Some(sequence) = self.config.start_sequence {
            info!(feed = self.kind.label(), sequence, "starting from explicit sequence");
            self.sequence = sequence;
            return Ok(());
        }

        if let Some(store) = &self.checkpoint {
            if let Some(text) = store.load().await? {
                let pointer = self.kind.parse_pointer(&text)?;
                self.sequence = pointer.sequence + 1;
                info!(
                    feed = self.kind.label(),
                    checkpoint = pointer.sequence,
                    sequence = self.sequence,
                    "resuming from checkpoint"
                );
                return Ok(());
            }
        }

        let url = format!("{}/{}", self.config.base_url, self.kind.pointer_name());
        let body = self.policy.fetch(&self.transport, &url).await?;
        let text = String::from_utf8_lossy(&body).into_owned();
        let pointer = self.kind.parse_pointer(&text)?;
        self.sequence = pointer.sequence;
        self.resolved_state = Some((pointer.sequence, text));
        info!(
            feed = self.kind.label(),
            sequence = self.sequence,
            "starting from remote state pointer"
        );
        Ok(())
    }

    /// Fetch the page's own state pointer (minute feed) to learn its
    /// nominal timestamp and the checkpoint text to persist later.
    async fn resolve_page_state(&mut self) -> Result<()> {
        self.page_timestamp = None;
        self.page_state_text = None;

        if self.kind == FeedKind::Changesets {
            return Ok(());
        }

        let text = match self.resolved_state.take() {
            Some((sequence, text)) if sequence == self.sequence => text,
            _ => {
                let url = format!(
                    "{}/{}.state.txt",
                    self.config.base_url,
                    sequence_path(self.sequence)
                );
                let body = self.policy.fetch(&self.transport, &url).await?;
                String::from_utf8_lossy(&body).into_owned()
            }
        };

        let pointer = StatePointer::from_state_txt(&text)?;
        self.page_timestamp = pointer.timestamp;
        self.page_state_text = Some(text);
        Ok(())
    }

    /// Fetch and decompress the page body, and set up the lazy entity
    /// iterator over it.
    async fn fetch_page(&mut self) -> Result<()> {
        let url = format!(
            "{}/{}.{}",
            self.config.base_url,
            sequence_path(self.sequence),
            self.kind.page_ext()
        );
        debug!(feed = self.kind.label(), sequence = self.sequence, url, "fetching page");

        let body = self.policy.fetch(&self.transport, &url).await?;
        let xml = gunzip(&body)?;
        let parse_timestamps = self.config.parse_timestamps;

        let iter: PageIter = match self.kind {
            FeedKind::Minute => Box::new(
                ChangeReader::new(IoCursor::new(xml), parse_timestamps)
                    .map(|item| item.map(|(action, el)| (Some(action), el))),
            ),
            FeedKind::Changesets => Box::new(
                OsmReader::new(IoCursor::new(xml), parse_timestamps)
                    .map(|item| item.map(|el| (None, el))),
            ),
        };

        self.page = Some(iter);
        self.entities_in_page = 0;
        metrics::record_sequence(self.kind.label(), self.sequence);
        Ok(())
    }

    /// Close out a fully-delivered page: persist the checkpoint (the
    /// one moment it may move), then hand back the `Finished` marker.
    async fn finish_page(&mut self) -> Result<Finished> {
        self.page = None;
        metrics::record_entities(self.kind.label(), self.entities_in_page);
        debug!(
            feed = self.kind.label(),
            sequence = self.sequence,
            entities = self.entities_in_page,
            "page complete"
        );

        self.persist_checkpoint().await?;
        self.state = CursorState::Paced;

        Ok(Finished {
            sequence: self.sequence,
            timestamp: self.page_timestamp.map(Timestamp::Utc),
        })
    }

    async fn persist_checkpoint(&self) -> Result<()> {
        let Some(store) = &self.checkpoint else {
            return Ok(());
        };
        let contents = match self.kind {
            FeedKind::Minute => self
                .page_state_text
                .clone()
                .unwrap_or_else(|| format!("sequenceNumber={}\n", self.sequence)),
            FeedKind::Changesets => format!("sequence: {}\n", self.sequence),
        };
        store.save(&contents).await?;
        metrics::record_checkpoint(self.kind.label());
        Ok(())
    }

    async fn pace(&mut self) {
        let Some(last) = self.page_timestamp else {
            // No nominal timestamp (changeset feed): the 404 backoff on
            // the next page paces the loop.
            return;
        };
        let delay = self.pacing.next_delay(last, self.policy.fudge());
        metrics::record_pacing_delay(self.kind.label(), delay);
        if !delay.is_zero() {
            debug!(
                feed = self.kind.label(),
                delay_secs = delay.as_secs_f64(),
                "pacing before next page"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
