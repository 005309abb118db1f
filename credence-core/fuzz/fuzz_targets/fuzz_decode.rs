#![no_main]

//! Fuzz target for the manifest codec
//!
//! Arbitrary bytes are decoded as a store envelope and as a single manifest.
//! Anything that decodes must survive an encode/decode round trip.
//!
//! Run with: cargo +nightly fuzz run fuzz_decode

use credence_core::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = codec::decode_store(data);

    if let Ok(manifest) = codec::decode(data) {
        let encoded = codec::encode(&manifest).expect("decoded manifest re-encodes");
        assert_eq!(codec::decode(&encoded).expect("re-encoded manifest decodes"), manifest);
    }
});
