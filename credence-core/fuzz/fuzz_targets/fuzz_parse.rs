#![no_main]

//! Fuzz target for asset parsing and verification
//!
//! Treats the input as a JPEG or PNG asset, parses any embedded store and
//! verifies it. Cyclic or dangling graphs must be rejected, never loop.
//!
//! Run with: cargo +nightly fuzz run fuzz_parse

use credence_core::{ManifestStore, TrustAnchors};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(store) = ManifestStore::parse(data) {
        let _ = store.verify(&TrustAnchors::empty(), chrono::Utc::now());
    }
});
