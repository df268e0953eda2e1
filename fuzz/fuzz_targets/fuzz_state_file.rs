//! Fuzz target for state-file parsing.
//!
//! This tests that `read_state` and both `StatePointer` parsers never
//! panic on arbitrary input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use osm_replication_engine::state::read_state;
use osm_replication_engine::StatePointer;

fuzz_target!(|text: &str| {
    // Should never panic, only return Ok or Err
    let _ = read_state(text, '=');
    let _ = read_state(text, ':');
    let _ = StatePointer::from_state_txt(text);
    let _ = StatePointer::from_state_yaml(text);
});
