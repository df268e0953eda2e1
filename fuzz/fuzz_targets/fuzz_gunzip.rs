//! Fuzz target for gzip envelope handling.
//!
//! This tests that `gunzip` never panics on arbitrary input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use osm_replication_engine::fetch::gunzip;

fuzz_target!(|data: &[u8]| {
    // Just call gunzip - it should never panic
    let _ = gunzip(data);
});
