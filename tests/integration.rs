// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration tests for the replication cursors.
//!
//! All network traffic goes through the scripted [`MockTransport`], so
//! these run without any server.
//!
//! # Test Organization
//! - `minute_*` - minutely diff feed (action-tagged entities, pacing)
//! - `changeset_*` - changeset dump feed (bare entities, 404 pacing)
//! - `cursor_*` - resolution precedence, checkpointing, failure modes

mod common;

use common::{gzip, MockTransport};
use osm_replication_engine::{
    Action, CursorState, Event, FeedConfig, ReplicationCursor, ReplicationError,
};

const MINUTE_BASE: &str = "http://feed.test/replication/minute";
const CHANGESET_BASE: &str = "http://feed.test/replication/changesets";

fn minute_state(sequence: u64) -> String {
    format!("sequenceNumber={sequence}\ntimestamp=2024-03-01T12\\:00\\:00Z\n")
}

fn two_entity_diff() -> Vec<u8> {
    gzip(
        br#"<osmChange version="0.6">
            <create><node id="1" lat="51.5" lon="-0.1" version="1" changeset="900"/></create>
            <modify><way id="2" version="4"><nd ref="1"/><nd ref="3"/></way></modify>
        </osmChange>"#,
    )
}

fn two_changeset_dump() -> Vec<u8> {
    gzip(
        br#"<osm version="0.6">
            <changeset id="100" open="true" created_at="2024-03-01T11:59:00Z" uid="7" user="alice"/>
            <changeset id="101" open="false" created_at="2024-03-01T11:58:00Z"
                       closed_at="2024-03-01T11:59:30Z"
                       min_lat="50.0" max_lat="51.0" min_lon="-1.0" max_lon="0.0">
                <tag k="comment" v="resurvey"/>
            </changeset>
        </osm>"#,
    )
}

// =============================================================================
// Minute Diff Feed
// =============================================================================

#[tokio::test]
async fn minute_cursor_yields_changes_then_finished() {
    let transport = MockTransport::new();
    transport.on_body(
        &format!("{MINUTE_BASE}/000/141/042.state.txt"),
        minute_state(141_042),
    );
    transport.on_body(&format!("{MINUTE_BASE}/000/141/042.osc.gz"), two_entity_diff());

    let config = FeedConfig::for_testing(MINUTE_BASE, 141_042);
    let mut cursor = ReplicationCursor::minute_with_transport(config, transport).unwrap();

    let first = cursor.next_event().await.unwrap();
    let Event::Change(Action::Create, el) = first else {
        panic!("expected create, got {first:?}");
    };
    assert_eq!(el.kind(), "node");
    assert_eq!(el.id(), 1);

    let second = cursor.next_event().await.unwrap();
    let Event::Change(Action::Modify, el) = second else {
        panic!("expected modify, got {second:?}");
    };
    assert_eq!(el.kind(), "way");
    assert_eq!(el.id(), 2);

    let third = cursor.next_event().await.unwrap();
    let Event::Finished(finished) = third else {
        panic!("expected finished, got {third:?}");
    };
    assert_eq!(finished.sequence, 141_042);
    assert!(finished.timestamp.is_some());
}

#[tokio::test]
async fn minute_cursor_persists_state_text_verbatim() {
    let state_dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    let state_text = minute_state(141_042);
    transport.on_body(&format!("{MINUTE_BASE}/000/141/042.state.txt"), state_text.clone());
    transport.on_body(&format!("{MINUTE_BASE}/000/141/042.osc.gz"), two_entity_diff());

    let config = FeedConfig {
        state_dir: Some(state_dir.path().to_path_buf()),
        ..FeedConfig::for_testing(MINUTE_BASE, 141_042)
    };
    let mut cursor = ReplicationCursor::minute_with_transport(config, transport).unwrap();

    // Checkpoint must not move until the page is fully delivered.
    cursor.next_event().await.unwrap();
    assert!(!state_dir.path().join("state.txt").exists());

    // Drain the page: way, then Finished.
    cursor.next_event().await.unwrap();
    let Event::Finished(finished) = cursor.next_event().await.unwrap() else {
        panic!("expected finished");
    };

    let persisted = std::fs::read_to_string(state_dir.path().join("state.txt")).unwrap();
    assert_eq!(persisted, state_text);
    let pointer = osm_replication_engine::StatePointer::from_state_txt(&persisted).unwrap();
    assert_eq!(pointer.sequence, finished.sequence);
}

#[tokio::test]
async fn minute_cursor_resumes_after_checkpoint() {
    let state_dir = tempfile::tempdir().unwrap();
    std::fs::write(state_dir.path().join("state.txt"), minute_state(10)).unwrap();

    let transport = MockTransport::new();
    transport.on_body(&format!("{MINUTE_BASE}/000/000/011.state.txt"), minute_state(11));
    transport.on_body(
        &format!("{MINUTE_BASE}/000/000/011.osc.gz"),
        gzip(br#"<osmChange><delete><node id="5" version="2"/></delete></osmChange>"#),
    );

    let config = FeedConfig {
        base_url: MINUTE_BASE.to_string(),
        state_dir: Some(state_dir.path().to_path_buf()),
        ..FeedConfig::minute()
    };
    let mut cursor = ReplicationCursor::minute_with_transport(config, transport.clone()).unwrap();

    // Checkpoint holds the last completed page (10); resume at 11.
    let event = cursor.next_event().await.unwrap();
    assert!(matches!(event, Event::Change(Action::Delete, _)));
    assert_eq!(cursor.sequence(), Some(11));

    // The checkpoint satisfied start resolution; the feed's top-level
    // pointer was never consulted.
    assert_eq!(transport.request_count(&format!("{MINUTE_BASE}/state.txt")), 0);
}

#[tokio::test]
async fn minute_cursor_resolves_remote_pointer_once() {
    let transport = MockTransport::new();
    transport.on_body(&format!("{MINUTE_BASE}/state.txt"), minute_state(42));
    transport.on_body(&format!("{MINUTE_BASE}/000/000/042.osc.gz"), two_entity_diff());

    let config = FeedConfig {
        base_url: MINUTE_BASE.to_string(),
        ..FeedConfig::minute()
    };
    let mut cursor = ReplicationCursor::minute_with_transport(config, transport.clone()).unwrap();

    cursor.next_event().await.unwrap();
    assert_eq!(cursor.sequence(), Some(42));

    // The pointer text fetched during resolution doubles as the page's
    // state; the per-page copy is not re-fetched.
    assert_eq!(transport.request_count(&format!("{MINUTE_BASE}/state.txt")), 1);
    assert_eq!(
        transport.request_count(&format!("{MINUTE_BASE}/000/000/042.state.txt")),
        0
    );
}

// =============================================================================
// Changeset Feed
// =============================================================================

#[tokio::test]
async fn changeset_cursor_yields_bare_elements() {
    let transport = MockTransport::new();
    transport.on_body(
        &format!("{CHANGESET_BASE}/005/873/461.osm.gz"),
        two_changeset_dump(),
    );

    let config = FeedConfig::for_testing(CHANGESET_BASE, 5_873_461);
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();

    let first = cursor.next_event().await.unwrap();
    let Event::Element(el) = first else {
        panic!("expected bare element, got {first:?}");
    };
    assert_eq!(el.id(), 100);

    let second = cursor.next_event().await.unwrap();
    let Event::Element(el) = second else {
        panic!("expected bare element, got {second:?}");
    };
    assert_eq!(el.id(), 101);
    assert_eq!(el.tags().len(), 1);

    let Event::Finished(finished) = cursor.next_event().await.unwrap() else {
        panic!("expected finished");
    };
    assert_eq!(finished.sequence, 5_873_461);
    // The changeset feed has no nominal page timestamp.
    assert!(finished.timestamp.is_none());
}

#[tokio::test]
async fn changeset_cursor_advances_across_pages() {
    let transport = MockTransport::new();
    transport.on_body(
        &format!("{CHANGESET_BASE}/000/000/001.osm.gz"),
        gzip(br#"<osm><changeset id="1" open="true"/></osm>"#),
    );
    transport.on_body(
        &format!("{CHANGESET_BASE}/000/000/002.osm.gz"),
        gzip(br#"<osm><changeset id="2" open="true"/></osm>"#),
    );

    let config = FeedConfig::for_testing(CHANGESET_BASE, 1);
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        match cursor.next_event().await.unwrap() {
            Event::Element(el) => seen.push(format!("changeset:{}", el.id())),
            Event::Finished(f) => seen.push(format!("finished:{}", f.sequence)),
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(
        seen,
        vec!["changeset:1", "finished:1", "changeset:2", "finished:2"]
    );
}

#[tokio::test]
async fn changeset_cursor_persists_and_resumes() {
    let state_dir = tempfile::tempdir().unwrap();
    let page_one = format!("{CHANGESET_BASE}/000/000/007.osm.gz");
    let page_two = format!("{CHANGESET_BASE}/000/000/008.osm.gz");

    {
        let transport = MockTransport::new();
        transport.on_body(&page_one, gzip(br#"<osm><changeset id="70" open="true"/></osm>"#));
        let config = FeedConfig {
            state_dir: Some(state_dir.path().to_path_buf()),
            ..FeedConfig::for_testing(CHANGESET_BASE, 7)
        };
        let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();
        cursor.next_event().await.unwrap(); // changeset 70
        cursor.next_event().await.unwrap(); // finished 7
    }

    let persisted = std::fs::read_to_string(state_dir.path().join("state.yaml")).unwrap();
    assert_eq!(persisted, "sequence: 7\n");

    // A fresh cursor with no explicit start resumes at 8.
    let transport = MockTransport::new();
    transport.on_body(&page_two, gzip(br#"<osm><changeset id="80" open="true"/></osm>"#));
    let config = FeedConfig {
        base_url: CHANGESET_BASE.to_string(),
        state_dir: Some(state_dir.path().to_path_buf()),
        ..FeedConfig::changesets()
    };
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();
    let event = cursor.next_event().await.unwrap();
    let Event::Element(el) = event else {
        panic!("expected element");
    };
    assert_eq!(el.id(), 80);
    assert_eq!(cursor.sequence(), Some(8));
}

#[tokio::test(start_paused = true)]
async fn changeset_cursor_backs_off_until_page_published() {
    let transport = MockTransport::new();
    let page = format!("{CHANGESET_BASE}/000/000/003.osm.gz");
    transport.on_missing(&page);
    transport.on_missing(&page);
    transport.on_body(&page, gzip(br#"<osm><changeset id="3" open="true"/></osm>"#));

    let config = FeedConfig::for_testing(CHANGESET_BASE, 3);
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport.clone()).unwrap();

    let event = cursor.next_event().await.unwrap();
    assert!(matches!(event, Event::Element(_)));
    assert_eq!(transport.request_count(&page), 3);
}

#[tokio::test]
async fn changeset_cursor_resolves_remote_yaml_pointer() {
    let transport = MockTransport::new();
    transport.on_body(
        &format!("{CHANGESET_BASE}/state.yaml"),
        "---\nlast_run: 2024-03-01 12:00:00 Z\nsequence: 5873461\n",
    );
    transport.on_body(
        &format!("{CHANGESET_BASE}/005/873/461.osm.gz"),
        gzip(br#"<osm><changeset id="1" open="true"/></osm>"#),
    );

    let config = FeedConfig {
        base_url: CHANGESET_BASE.to_string(),
        ..FeedConfig::changesets()
    };
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();
    cursor.next_event().await.unwrap();
    assert_eq!(cursor.sequence(), Some(5_873_461));
}

// =============================================================================
// Failure Modes
// =============================================================================

#[tokio::test]
async fn cursor_halts_on_http_error_without_advancing() {
    let state_dir = tempfile::tempdir().unwrap();
    let transport = MockTransport::new();
    // Nothing scripted: every fetch is a 599 from the mock.
    let config = FeedConfig {
        state_dir: Some(state_dir.path().to_path_buf()),
        ..FeedConfig::for_testing(CHANGESET_BASE, 1)
    };
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();

    let err = cursor.next_event().await.unwrap_err();
    assert!(matches!(err, ReplicationError::Http { .. }));
    assert_eq!(cursor.state(), CursorState::Terminated);
    assert!(!state_dir.path().join("state.yaml").exists());

    // Driving a terminated cursor is a state violation, not a hang.
    let err = cursor.next_event().await.unwrap_err();
    assert!(matches!(err, ReplicationError::InvalidState { .. }));
}

#[tokio::test]
async fn cursor_surfaces_corrupt_page() {
    let transport = MockTransport::new();
    transport.on_body(
        &format!("{CHANGESET_BASE}/000/000/001.osm.gz"),
        b"not gzip at all".to_vec(),
    );
    let config = FeedConfig::for_testing(CHANGESET_BASE, 1);
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();

    let err = cursor.next_event().await.unwrap_err();
    assert!(matches!(err, ReplicationError::Decompression(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn cursor_rejects_missing_state_dir_before_any_fetch() {
    let transport = MockTransport::new();
    let config = FeedConfig {
        state_dir: Some("/definitely/not/a/dir".into()),
        ..FeedConfig::for_testing(MINUTE_BASE, 1)
    };
    let err = ReplicationCursor::minute_with_transport(config, transport).unwrap_err();
    assert!(matches!(err, ReplicationError::Config(_)));
}

#[tokio::test]
async fn explicit_start_overrides_checkpoint() {
    let state_dir = tempfile::tempdir().unwrap();
    std::fs::write(state_dir.path().join("state.yaml"), "sequence: 99\n").unwrap();

    let transport = MockTransport::new();
    transport.on_body(
        &format!("{CHANGESET_BASE}/000/000/005.osm.gz"),
        gzip(br#"<osm><changeset id="5" open="true"/></osm>"#),
    );

    let config = FeedConfig {
        state_dir: Some(state_dir.path().to_path_buf()),
        ..FeedConfig::for_testing(CHANGESET_BASE, 5)
    };
    let mut cursor = ReplicationCursor::changesets_with_transport(config, transport).unwrap();
    cursor.next_event().await.unwrap();
    assert_eq!(cursor.sequence(), Some(5));
}
