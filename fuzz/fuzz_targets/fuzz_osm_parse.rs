//! Fuzz target for the XML entity readers.
//!
//! This tests that `OsmReader` and `ChangeReader` never panic on
//! arbitrary bytes, whether or not they are valid XML.

#![no_main]

use libfuzzer_sys::fuzz_target;
use osm_replication_engine::{ChangeReader, OsmReader};

fuzz_target!(|data: &[u8]| {
    // Drain both readers; errors are fine, panics are not
    for entity in OsmReader::new(data, true) {
        if entity.is_err() {
            break;
        }
    }
    for change in ChangeReader::new(data, false) {
        if change.is_err() {
            break;
        }
    }
});
