// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Incremental XML-to-entity assembler.
//!
//! Converts the forward-only event stream of a [`quick_xml::Reader`]
//! (element-open, element-close) into fully-built [`Element`]s, one at a
//! time, without ever holding more than the entity under construction in
//! memory. The same assembler core drives both document shapes:
//!
//! - [`OsmReader`]: plain object files (`.osm`) — bare entities.
//! - [`ChangeReader`]: diff files (`osmChange`) — entities paired with the
//!   `create`/`modify`/`delete` wrapper they appeared under.
//!
//! # Assembly Lifecycle
//!
//! An entity accumulator opens on `node`/`way`/`relation`/`changeset`,
//! collects `tag`/`nd`/`member` children as sibling opens arrive, and is
//! finalized and yielded exactly once, on the matching close. A new entity
//! open discards any unfinished accumulator: the assembler trusts
//! well-formed input and is not a validating parser. A child arriving with
//! no open accumulator is fatal (`Structure`) — that indicates corrupt or
//! out-of-order input, not sloppy nesting.
//!
//! # Coercion Rules
//!
//! Required attributes (`id` on every entity) fail fast when absent.
//! Optional attributes resolve to `None`, never to a guessed default.
//! Integers are base-10 signed 64-bit; booleans recognize exactly the
//! literal `"true"`; timestamps use the fixed feed format and fail fast
//! on mismatch (see [`Timestamp::from_raw`]).
//!
//! Both readers are single-pass and not restartable; re-reading requires a
//! fresh reader over a fresh byte source.

use std::io::BufRead;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use tracing::trace;

use crate::error::{ReplicationError, Result};
use crate::model::{
    Action, Bounds, Changeset, Element, Member, MemberType, Node, Relation, Tag, Timestamp, Way,
};

/// Parse an optional attribute as a base-10 signed 64-bit integer.
pub fn maybe_i64(value: Option<&str>, attribute: &str) -> Result<Option<i64>> {
    match value {
        None => Ok(None),
        Some(s) => s.parse::<i64>().map(Some).map_err(|_| invalid(attribute, s)),
    }
}

/// Parse an optional attribute as a 32-bit version counter.
pub fn maybe_i32(value: Option<&str>, attribute: &str) -> Result<Option<i32>> {
    match value {
        None => Ok(None),
        Some(s) => s.parse::<i32>().map(Some).map_err(|_| invalid(attribute, s)),
    }
}

/// Parse an optional attribute as a float.
pub fn maybe_f64(value: Option<&str>, attribute: &str) -> Result<Option<f64>> {
    match value {
        None => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(|_| invalid(attribute, s)),
    }
}

/// Coerce an optional attribute to a boolean. Exactly the literal
/// `"true"` is true; any other present value is false; absent stays
/// absent.
pub fn maybe_bool(value: Option<&str>) -> Option<bool> {
    value.map(|s| s == "true")
}

fn invalid(attribute: &str, value: &str) -> ReplicationError {
    ReplicationError::InvalidValue {
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

fn missing(element: &'static str, attribute: &'static str) -> ReplicationError {
    ReplicationError::MissingField { element, attribute }
}

fn maybe_timestamp(
    value: Option<&str>,
    parse: bool,
    attribute: &str,
) -> Result<Option<Timestamp>> {
    match value {
        None => Ok(None),
        Some(s) => Timestamp::from_raw(s, parse)
            .map(Some)
            .map_err(|_| invalid(attribute, s)),
    }
}

/// Attributes common to node/way/relation headers, collected in one pass
/// over the open tag.
#[derive(Default)]
struct PrimitiveAttrs {
    id: Option<String>,
    version: Option<String>,
    changeset: Option<String>,
    user: Option<String>,
    uid: Option<String>,
    visible: Option<String>,
    timestamp: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
}

fn unescape(attr: &Attribute<'_>) -> Result<String> {
    Ok(attr.unescape_value()?.into_owned())
}

fn collect_primitive_attrs(e: &BytesStart<'_>) -> Result<PrimitiveAttrs> {
    let mut out = PrimitiveAttrs::default();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        match attr.key.as_ref() {
            b"id" => out.id = Some(unescape(&attr)?),
            b"version" => out.version = Some(unescape(&attr)?),
            b"changeset" => out.changeset = Some(unescape(&attr)?),
            b"user" => out.user = Some(unescape(&attr)?),
            b"uid" => out.uid = Some(unescape(&attr)?),
            b"visible" => out.visible = Some(unescape(&attr)?),
            b"timestamp" => out.timestamp = Some(unescape(&attr)?),
            b"lat" => out.lat = Some(unescape(&attr)?),
            b"lon" => out.lon = Some(unescape(&attr)?),
            _ => {} // Unknown attributes are ignored, not errors
        }
    }
    Ok(out)
}

fn start_node(e: &BytesStart<'_>, parse_timestamps: bool) -> Result<Node> {
    let a = collect_primitive_attrs(e)?;
    Ok(Node {
        id: maybe_i64(a.id.as_deref(), "id")?.ok_or_else(|| missing("node", "id"))?,
        version: maybe_i32(a.version.as_deref(), "version")?,
        changeset: maybe_i64(a.changeset.as_deref(), "changeset")?,
        user: a.user,
        uid: maybe_i64(a.uid.as_deref(), "uid")?,
        visible: maybe_bool(a.visible.as_deref()),
        timestamp: maybe_timestamp(a.timestamp.as_deref(), parse_timestamps, "timestamp")?,
        lat: maybe_f64(a.lat.as_deref(), "lat")?,
        lon: maybe_f64(a.lon.as_deref(), "lon")?,
        tags: Vec::new(),
    })
}

fn start_way(e: &BytesStart<'_>, parse_timestamps: bool) -> Result<Way> {
    let a = collect_primitive_attrs(e)?;
    Ok(Way {
        id: maybe_i64(a.id.as_deref(), "id")?.ok_or_else(|| missing("way", "id"))?,
        version: maybe_i32(a.version.as_deref(), "version")?,
        changeset: maybe_i64(a.changeset.as_deref(), "changeset")?,
        user: a.user,
        uid: maybe_i64(a.uid.as_deref(), "uid")?,
        visible: maybe_bool(a.visible.as_deref()),
        timestamp: maybe_timestamp(a.timestamp.as_deref(), parse_timestamps, "timestamp")?,
        nds: Vec::new(),
        tags: Vec::new(),
    })
}

fn start_relation(e: &BytesStart<'_>, parse_timestamps: bool) -> Result<Relation> {
    let a = collect_primitive_attrs(e)?;
    Ok(Relation {
        id: maybe_i64(a.id.as_deref(), "id")?.ok_or_else(|| missing("relation", "id"))?,
        version: maybe_i32(a.version.as_deref(), "version")?,
        changeset: maybe_i64(a.changeset.as_deref(), "changeset")?,
        user: a.user,
        uid: maybe_i64(a.uid.as_deref(), "uid")?,
        visible: maybe_bool(a.visible.as_deref()),
        timestamp: maybe_timestamp(a.timestamp.as_deref(), parse_timestamps, "timestamp")?,
        members: Vec::new(),
        tags: Vec::new(),
    })
}

fn start_changeset(e: &BytesStart<'_>, parse_timestamps: bool) -> Result<Changeset> {
    let mut id = None;
    let mut created_at = None;
    let mut closed_at = None;
    let mut open = None;
    let mut min_lat = None;
    let mut max_lat = None;
    let mut min_lon = None;
    let mut max_lon = None;
    let mut user = None;
    let mut uid = None;

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        match attr.key.as_ref() {
            b"id" => id = Some(unescape(&attr)?),
            b"created_at" => created_at = Some(unescape(&attr)?),
            b"closed_at" => closed_at = Some(unescape(&attr)?),
            b"open" => open = Some(unescape(&attr)?),
            b"min_lat" => min_lat = Some(unescape(&attr)?),
            b"max_lat" => max_lat = Some(unescape(&attr)?),
            b"min_lon" => min_lon = Some(unescape(&attr)?),
            b"max_lon" => max_lon = Some(unescape(&attr)?),
            b"user" => user = Some(unescape(&attr)?),
            b"uid" => uid = Some(unescape(&attr)?),
            _ => {}
        }
    }

    // The bbox is jointly present or jointly absent; a partial box means
    // the page is malformed.
    let bounds = if min_lat.is_some() || max_lat.is_some() || min_lon.is_some() || max_lon.is_some()
    {
        Some(Bounds {
            min_lat: maybe_f64(min_lat.as_deref(), "min_lat")?
                .ok_or_else(|| missing("changeset", "min_lat"))?,
            max_lat: maybe_f64(max_lat.as_deref(), "max_lat")?
                .ok_or_else(|| missing("changeset", "max_lat"))?,
            min_lon: maybe_f64(min_lon.as_deref(), "min_lon")?
                .ok_or_else(|| missing("changeset", "min_lon"))?,
            max_lon: maybe_f64(max_lon.as_deref(), "max_lon")?
                .ok_or_else(|| missing("changeset", "max_lon"))?,
        })
    } else {
        None
    };

    Ok(Changeset {
        id: maybe_i64(id.as_deref(), "id")?.ok_or_else(|| missing("changeset", "id"))?,
        created_at: maybe_timestamp(created_at.as_deref(), parse_timestamps, "created_at")?,
        closed_at: maybe_timestamp(closed_at.as_deref(), parse_timestamps, "closed_at")?,
        open: maybe_bool(open.as_deref()).ok_or_else(|| missing("changeset", "open"))?,
        bounds,
        user,
        uid: maybe_i64(uid.as_deref(), "uid")?,
        tags: Vec::new(),
    })
}

fn start_tag(e: &BytesStart<'_>) -> Result<Tag> {
    let mut key = None;
    let mut value = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        match attr.key.as_ref() {
            b"k" => key = Some(unescape(&attr)?),
            b"v" => value = Some(unescape(&attr)?),
            _ => {}
        }
    }
    Ok(Tag {
        key: key.ok_or_else(|| missing("tag", "k"))?,
        value: value.ok_or_else(|| missing("tag", "v"))?,
    })
}

fn start_member(e: &BytesStart<'_>) -> Result<Member> {
    let mut member_type = None;
    let mut ref_id = None;
    let mut role = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        match attr.key.as_ref() {
            b"type" => member_type = Some(unescape(&attr)?),
            b"ref" => ref_id = Some(unescape(&attr)?),
            b"role" => role = Some(unescape(&attr)?),
            _ => {}
        }
    }
    let raw_type = member_type.ok_or_else(|| missing("member", "type"))?;
    Ok(Member {
        member_type: MemberType::parse(&raw_type).ok_or_else(|| invalid("type", &raw_type))?,
        ref_id: maybe_i64(ref_id.as_deref(), "ref")?.ok_or_else(|| missing("member", "ref"))?,
        role: role.ok_or_else(|| missing("member", "role"))?,
    })
}

/// The shared open/close-event state machine behind both readers.
struct Assembler {
    parse_timestamps: bool,
    pending: Option<Element>,
    action: Option<Action>,
}

impl Assembler {
    fn new(parse_timestamps: bool) -> Self {
        Self {
            parse_timestamps,
            pending: None,
            action: None,
        }
    }

    /// Feed one element-open event.
    fn open(&mut self, e: &BytesStart<'_>) -> Result<()> {
        match e.name().as_ref() {
            b"node" => {
                self.pending = Some(Element::Node(start_node(e, self.parse_timestamps)?));
            }
            b"way" => {
                self.pending = Some(Element::Way(start_way(e, self.parse_timestamps)?));
            }
            b"relation" => {
                self.pending = Some(Element::Relation(start_relation(e, self.parse_timestamps)?));
            }
            b"changeset" => {
                self.pending = Some(Element::Changeset(start_changeset(
                    e,
                    self.parse_timestamps,
                )?));
            }
            b"tag" => {
                let tag = start_tag(e)?;
                match self.pending.as_mut() {
                    Some(Element::Node(n)) => n.tags.push(tag),
                    Some(Element::Way(w)) => w.tags.push(tag),
                    Some(Element::Relation(r)) => r.tags.push(tag),
                    Some(Element::Changeset(c)) => c.tags.push(tag),
                    None => return Err(ReplicationError::structure("<tag> with no open entity")),
                }
            }
            b"nd" => {
                let mut ref_id = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
                    if attr.key.as_ref() == b"ref" {
                        ref_id = Some(unescape(&attr)?);
                    }
                }
                let ref_id = maybe_i64(ref_id.as_deref(), "ref")?
                    .ok_or_else(|| missing("nd", "ref"))?;
                match self.pending.as_mut() {
                    Some(Element::Way(w)) => w.nds.push(ref_id),
                    Some(other) => {
                        return Err(ReplicationError::structure(format!(
                            "<nd> inside <{}>",
                            other.kind()
                        )))
                    }
                    None => return Err(ReplicationError::structure("<nd> with no open entity")),
                }
            }
            b"member" => {
                let member = start_member(e)?;
                match self.pending.as_mut() {
                    Some(Element::Relation(r)) => r.members.push(member),
                    Some(other) => {
                        return Err(ReplicationError::structure(format!(
                            "<member> inside <{}>",
                            other.kind()
                        )))
                    }
                    None => {
                        return Err(ReplicationError::structure("<member> with no open entity"))
                    }
                }
            }
            b"create" => self.action = Some(Action::Create),
            b"modify" => self.action = Some(Action::Modify),
            b"delete" => self.action = Some(Action::Delete),
            other => {
                // Envelope elements (osm, osmChange, bounds, ...) and
                // anything we don't consume.
                trace!(element = %String::from_utf8_lossy(other), "skipping element");
            }
        }
        Ok(())
    }

    /// Feed one element-close event. Returns the finalized entity (with
    /// the action in effect) when the close matches the open accumulator.
    fn close(&mut self, name: &[u8]) -> Option<(Option<Action>, Element)> {
        match name {
            b"node" | b"way" | b"relation" | b"changeset" => {
                let matches = self
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.kind().as_bytes() == name);
                if matches {
                    self.pending.take().map(|el| (self.action, el))
                } else {
                    None
                }
            }
            b"create" | b"modify" | b"delete" => {
                self.action = None;
                None
            }
            _ => None,
        }
    }
}

/// Lazy reader over a plain OSM object document (`.osm`): yields bare
/// entities in document order.
pub struct OsmReader<R: BufRead> {
    reader: Reader<R>,
    assembler: Assembler,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> OsmReader<R> {
    /// Wrap a byte source containing OSM XML.
    pub fn new(source: R, parse_timestamps: bool) -> Self {
        Self {
            reader: Reader::from_reader(source),
            assembler: Assembler::new(parse_timestamps),
            buf: Vec::new(),
            done: false,
        }
    }

    fn next_entity(&mut self) -> Result<Option<Element>> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                XmlEvent::Eof => return Ok(None),
                XmlEvent::Start(e) => self.assembler.open(&e)?,
                XmlEvent::End(e) => {
                    if let Some((_, el)) = self.assembler.close(e.name().as_ref()) {
                        return Ok(Some(el));
                    }
                }
                XmlEvent::Empty(e) => {
                    // A self-closing element is an open immediately
                    // followed by its close.
                    self.assembler.open(&e)?;
                    let name = e.name();
                    if let Some((_, el)) = self.assembler.close(name.as_ref()) {
                        return Ok(Some(el));
                    }
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for OsmReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_entity() {
            Ok(Some(el)) => Some(Ok(el)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Lazy reader over an `osmChange` diff document: yields each entity
/// paired with the `create`/`modify`/`delete` wrapper it appeared under.
pub struct ChangeReader<R: BufRead> {
    reader: Reader<R>,
    assembler: Assembler,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> ChangeReader<R> {
    /// Wrap a byte source containing osmChange XML.
    pub fn new(source: R, parse_timestamps: bool) -> Self {
        Self {
            reader: Reader::from_reader(source),
            assembler: Assembler::new(parse_timestamps),
            buf: Vec::new(),
            done: false,
        }
    }

    fn next_change(&mut self) -> Result<Option<(Action, Element)>> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                XmlEvent::Eof => return Ok(None),
                XmlEvent::Start(e) => self.assembler.open(&e)?,
                XmlEvent::End(e) => {
                    if let Some(pair) = self.assembler.close(e.name().as_ref()) {
                        return Self::require_action(pair).map(Some);
                    }
                }
                XmlEvent::Empty(e) => {
                    self.assembler.open(&e)?;
                    let name = e.name();
                    if let Some(pair) = self.assembler.close(name.as_ref()) {
                        return Self::require_action(pair).map(Some);
                    }
                }
                _ => {}
            }
        }
    }

    fn require_action(pair: (Option<Action>, Element)) -> Result<(Action, Element)> {
        match pair {
            (Some(action), el) => Ok((action, el)),
            (None, el) => Err(ReplicationError::structure(format!(
                "<{}> outside create/modify/delete wrapper",
                el.kind()
            ))),
        }
    }
}

impl<R: BufRead> Iterator for ChangeReader<R> {
    type Item = Result<(Action, Element)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_change() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// One-shot convenience: read a whole OSM document into memory, grouped
/// by kind. Only sensible for small documents; the iterators are the
/// streaming path.
pub fn read_osm_document<R: BufRead>(
    source: R,
    parse_timestamps: bool,
) -> Result<(Vec<Node>, Vec<Way>, Vec<Relation>)> {
    let mut nodes = Vec::new();
    let mut ways = Vec::new();
    let mut relations = Vec::new();

    for entity in OsmReader::new(source, parse_timestamps) {
        match entity? {
            Element::Node(n) => nodes.push(n),
            Element::Way(w) => ways.push(w),
            Element::Relation(r) => relations.push(r),
            Element::Changeset(_) => {} // Not part of an object document
        }
    }

    Ok((nodes, ways, relations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(xml: &str) -> Vec<Element> {
        OsmReader::new(xml.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_node_with_tags_in_order() {
        let xml = r#"<osm>
            <node id="1" version="2" changeset="3" user="alice" uid="10"
                  visible="true" timestamp="2024-01-01T00:00:00Z"
                  lat="51.5074" lon="-0.1278">
                <tag k="amenity" v="pub"/>
                <tag k="name" v="The Crown &amp; Anchor"/>
            </node>
        </osm>"#;
        let entities = parse_all(xml);
        assert_eq!(entities.len(), 1);
        let Element::Node(node) = &entities[0] else {
            panic!("expected node, got {:?}", entities[0]);
        };
        assert_eq!(node.id, 1);
        assert_eq!(node.version, Some(2));
        assert_eq!(node.changeset, Some(3));
        assert_eq!(node.user.as_deref(), Some("alice"));
        assert_eq!(node.uid, Some(10));
        assert_eq!(node.visible, Some(true));
        assert_eq!(node.lat, Some(51.5074));
        assert_eq!(node.lon, Some(-0.1278));
        assert_eq!(node.tags[0], Tag::new("amenity", "pub"));
        assert_eq!(node.tags[1], Tag::new("name", "The Crown & Anchor"));
    }

    #[test]
    fn test_optional_fields_absent_not_defaulted() {
        let entities = parse_all(r#"<osm><node id="5"/></osm>"#);
        let Element::Node(node) = &entities[0] else {
            panic!();
        };
        assert_eq!(node.version, None);
        assert_eq!(node.changeset, None);
        assert_eq!(node.uid, None);
        assert_eq!(node.visible, None);
        assert_eq!(node.lat, None);
        assert_eq!(node.lon, None);
    }

    #[test]
    fn test_way_preserves_nd_order() {
        let xml = r#"<osm><way id="7">
            <nd ref="30"/><nd ref="10"/><nd ref="20"/>
            <tag k="highway" v="residential"/>
        </way></osm>"#;
        let entities = parse_all(xml);
        let Element::Way(way) = &entities[0] else {
            panic!();
        };
        assert_eq!(way.nds, vec![30, 10, 20]);
    }

    #[test]
    fn test_relation_members_in_order() {
        let xml = r#"<osm><relation id="9">
            <member type="way" ref="1" role="outer"/>
            <member type="node" ref="2" role=""/>
            <member type="relation" ref="3" role="subarea"/>
        </relation></osm>"#;
        let entities = parse_all(xml);
        let Element::Relation(rel) = &entities[0] else {
            panic!();
        };
        assert_eq!(rel.members.len(), 3);
        assert_eq!(rel.members[0].member_type, MemberType::Way);
        assert_eq!(rel.members[0].role, "outer");
        assert_eq!(rel.members[1].ref_id, 2);
        assert_eq!(rel.members[2].member_type, MemberType::Relation);
    }

    #[test]
    fn test_document_order_preserved() {
        let xml = r#"<osm>
            <node id="1"/><way id="2"/><node id="3"/><relation id="4"/>
        </osm>"#;
        let kinds: Vec<_> = parse_all(xml).iter().map(|e| (e.kind(), e.id())).collect();
        assert_eq!(
            kinds,
            vec![("node", 1), ("way", 2), ("node", 3), ("relation", 4)]
        );
    }

    #[test]
    fn test_changeset_with_full_bbox() {
        let xml = r#"<osm>
            <changeset id="100" created_at="2024-01-01T00:00:00Z" open="true"
                       min_lat="50.0" max_lat="51.0" min_lon="-1.0" max_lon="0.0"
                       user="bob" uid="99">
                <tag k="comment" v="survey"/>
            </changeset>
        </osm>"#;
        let entities = parse_all(xml);
        let Element::Changeset(cs) = &entities[0] else {
            panic!();
        };
        assert_eq!(cs.id, 100);
        assert!(cs.open);
        let bounds = cs.bounds.unwrap();
        assert_eq!(bounds.min_lat, 50.0);
        assert_eq!(bounds.max_lon, 0.0);
        assert_eq!(cs.tags.len(), 1);
    }

    #[test]
    fn test_changeset_partial_bbox_is_error() {
        let xml = r#"<osm><changeset id="100" open="false" min_lat="50.0"/></osm>"#;
        let err = OsmReader::new(xml.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, ReplicationError::MissingField { .. }));
    }

    #[test]
    fn test_changeset_open_false_for_other_literals() {
        let xml = r#"<osm><changeset id="1" open="yes"/></osm>"#;
        let entities = parse_all(xml);
        let Element::Changeset(cs) = &entities[0] else {
            panic!();
        };
        assert!(!cs.open); // Only the literal "true" is true
    }

    #[test]
    fn test_missing_id_fails_fast() {
        let err = OsmReader::new(r#"<osm><node lat="1.0"/></osm>"#.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::MissingField {
                element: "node",
                attribute: "id"
            }
        ));
    }

    #[test]
    fn test_orphan_tag_is_structure_error() {
        let err = OsmReader::new(r#"<osm><tag k="a" v="b"/></osm>"#.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Structure(_)));
    }

    #[test]
    fn test_nd_inside_node_is_structure_error() {
        let xml = r#"<osm><node id="1"><nd ref="2"/></node></osm>"#;
        let err = OsmReader::new(xml.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Structure(_)));
    }

    #[test]
    fn test_raw_timestamps_when_not_parsing() {
        let xml = r#"<osm><node id="1" timestamp="2024-01-01T00:00:00Z"/></osm>"#;
        let entities: Vec<_> = OsmReader::new(xml.as_bytes(), false)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let Element::Node(node) = &entities[0] else {
            panic!();
        };
        assert_eq!(
            node.timestamp,
            Some(Timestamp::Raw("2024-01-01T00:00:00Z".to_string()))
        );
    }

    #[test]
    fn test_diff_actions_tracked() {
        let xml = r#"<osmChange>
            <create><node id="1" lat="1.0" lon="2.0"/></create>
            <modify><way id="2"><nd ref="1"/></way></modify>
            <delete><node id="3"/></delete>
        </osmChange>"#;
        let changes: Vec<_> = ChangeReader::new(xml.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].0, Action::Create);
        assert_eq!(changes[0].1.id(), 1);
        assert_eq!(changes[1].0, Action::Modify);
        assert_eq!(changes[1].1.kind(), "way");
        assert_eq!(changes[2].0, Action::Delete);
    }

    #[test]
    fn test_diff_wrapper_can_hold_many_entities() {
        let xml = r#"<osmChange><create>
            <node id="1"/><node id="2"/><node id="3"/>
        </create></osmChange>"#;
        let changes: Vec<_> = ChangeReader::new(xml.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let ids: Vec<_> = changes.iter().map(|(a, e)| (*a, e.id())).collect();
        assert_eq!(
            ids,
            vec![
                (Action::Create, 1),
                (Action::Create, 2),
                (Action::Create, 3)
            ]
        );
    }

    #[test]
    fn test_diff_entity_outside_wrapper_is_error() {
        let xml = r#"<osmChange><node id="1"/></osmChange>"#;
        let err = ChangeReader::new(xml.as_bytes(), true)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Structure(_)));
    }

    #[test]
    fn test_maybe_coercions() {
        assert_eq!(maybe_i64(None, "x").unwrap(), None);
        assert_eq!(maybe_i64(Some("-7"), "x").unwrap(), Some(-7));
        assert!(maybe_i64(Some("seven"), "x").is_err());
        assert_eq!(maybe_bool(Some("true")), Some(true));
        assert_eq!(maybe_bool(Some("false")), Some(false));
        assert_eq!(maybe_bool(Some("TRUE")), Some(false));
        assert_eq!(maybe_bool(None), None);
        assert_eq!(maybe_f64(Some("-0.5"), "x").unwrap(), Some(-0.5));
    }

    #[test]
    fn test_read_osm_document_groups_by_kind() {
        let xml = r#"<osm>
            <node id="1"/><node id="2"/><way id="3"/><relation id="4"/>
        </osm>"#;
        let (nodes, ways, relations) = read_osm_document(xml.as_bytes(), true).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(ways.len(), 1);
        assert_eq!(relations.len(), 1);
    }
}
