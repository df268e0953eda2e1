//! Domain model for OSM map entities and stream control signals.
//!
//! Everything in here is an immutable value once constructed: the parser
//! builds an entity incrementally while its element is open, then hands it
//! to the caller and never touches it again. Identity is `(id, version)`
//! for [`Node`]/[`Way`]/[`Relation`] and `id` alone for [`Changeset`].
//!
//! Consumers dispatch on the closed sums [`Element`] and [`Event`] with
//! exhaustive matching. Adding a new entity kind is a deliberate breaking
//! change for every match site.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, Result};

/// The fixed timestamp format used by every replication feed.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A timestamp attribute, parsed or raw depending on the caller's
/// `parse_timestamps` flag. The parser never guesses: it parses the fixed
/// feed format when asked and fails fast on a mismatch, otherwise it keeps
/// the source string untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Parsed instant (`parse_timestamps = true`).
    Utc(DateTime<Utc>),
    /// Verbatim source string (`parse_timestamps = false`).
    Raw(String),
}

impl Timestamp {
    /// Build a `Timestamp` from an attribute value.
    pub fn from_raw(raw: &str, parse: bool) -> Result<Self> {
        if parse {
            let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| {
                ReplicationError::InvalidValue {
                    attribute: "timestamp".to_string(),
                    value: raw.to_string(),
                }
            })?;
            Ok(Timestamp::Utc(naive.and_utc()))
        } else {
            Ok(Timestamp::Raw(raw.to_string()))
        }
    }

    /// The parsed instant, if this timestamp was parsed.
    pub fn as_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Utc(dt) => Some(*dt),
            Timestamp::Raw(_) => None,
        }
    }
}

/// A `k`/`v` tag attached to nodes, ways, relations, and changesets.
///
/// Tag order carries no OSM semantics but is preserved from source order
/// for round-trip fidelity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single point on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub version: Option<i32>,
    pub changeset: Option<i64>,
    pub user: Option<String>,
    pub uid: Option<i64>,
    pub visible: Option<bool>,
    pub timestamp: Option<Timestamp>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub tags: Vec<Tag>,
}

/// An ordered list of node references.
///
/// `nds` order is load-bearing: it defines the line geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    pub version: Option<i32>,
    pub changeset: Option<i64>,
    pub user: Option<String>,
    pub uid: Option<i64>,
    pub visible: Option<bool>,
    pub timestamp: Option<Timestamp>,
    pub nds: Vec<i64>,
    pub tags: Vec<Tag>,
}

/// What kind of entity a relation member references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "node" => Some(MemberType::Node),
            "way" => Some(MemberType::Way),
            "relation" => Some(MemberType::Relation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Node => "node",
            MemberType::Way => "way",
            MemberType::Relation => "relation",
        }
    }
}

/// One member of a relation, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_type: MemberType,
    pub ref_id: i64,
    pub role: String,
}

/// An ordered group of members with roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub version: Option<i32>,
    pub changeset: Option<i64>,
    pub user: Option<String>,
    pub uid: Option<i64>,
    pub visible: Option<bool>,
    pub timestamp: Option<Timestamp>,
    pub members: Vec<Member>,
    pub tags: Vec<Tag>,
}

/// A changeset bounding box. The four corners are jointly present or the
/// whole box is absent; there is no partial box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// A user's batch of edits. Distinct identity rule from the map
/// primitives: `id` alone, no version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: i64,
    pub created_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub open: bool,
    pub bounds: Option<Bounds>,
    pub user: Option<String>,
    pub uid: Option<i64>,
    pub tags: Vec<Tag>,
}

/// A map note. Produced only by the notes poller, which is out of scope
/// for this crate; the type is part of the model for completeness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub created_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub status: String,
    pub comments: Vec<Comment>,
}

/// One comment on a [`Note`], in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub created_at: Option<Timestamp>,
    pub user: Option<String>,
    pub uid: Option<i64>,
    pub action: String,
    pub text: Option<String>,
}

/// Control signal: the page currently being read has been fully
/// delivered. Not a map entity. This is a safe resumption point — the
/// cursor persists its checkpoint immediately before emitting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finished {
    /// Sequence number of the completed page.
    pub sequence: u64,
    /// The page's nominal publish timestamp, when the feed provides one
    /// (the minute-diff feed does, the changeset feed does not).
    pub timestamp: Option<Timestamp>,
}

/// The action a diff applies to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Modify,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Modify => "modify",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully-assembled map entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
    Changeset(Changeset),
}

impl Element {
    /// Entity id, present on every kind.
    pub fn id(&self) -> i64 {
        match self {
            Element::Node(n) => n.id,
            Element::Way(w) => w.id,
            Element::Relation(r) => r.id,
            Element::Changeset(c) => c.id,
        }
    }

    /// Entity version. Changesets have no version.
    pub fn version(&self) -> Option<i32> {
        match self {
            Element::Node(n) => n.version,
            Element::Way(w) => w.version,
            Element::Relation(r) => r.version,
            Element::Changeset(_) => None,
        }
    }

    /// The changeset this edit belongs to, when recorded.
    pub fn changeset(&self) -> Option<i64> {
        match self {
            Element::Node(n) => n.changeset,
            Element::Way(w) => w.changeset,
            Element::Relation(r) => r.changeset,
            Element::Changeset(c) => Some(c.id),
        }
    }

    /// Tags in source order.
    pub fn tags(&self) -> &[Tag] {
        match self {
            Element::Node(n) => &n.tags,
            Element::Way(w) => &w.tags,
            Element::Relation(r) => &r.tags,
            Element::Changeset(c) => &c.tags,
        }
    }

    /// The element name as it appears in the XML vocabulary.
    pub fn kind(&self) -> &'static str {
        match self {
            Element::Node(_) => "node",
            Element::Way(_) => "way",
            Element::Relation(_) => "relation",
            Element::Changeset(_) => "changeset",
        }
    }
}

/// One item of a replication stream.
///
/// The changeset feed yields bare `Element`s (a changeset dump has no
/// action wrapper — everything is effectively a create). The minute-diff
/// feed yields `Change(action, element)` pairs. Both yield exactly one
/// `Finished` per page, after all the page's entities.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A bare entity from an object dump.
    Element(Element),
    /// An action-tagged entity from a diff.
    Change(Action, Element),
    /// End-of-page marker; safe to record progress.
    Finished(Finished),
}
