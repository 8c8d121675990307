#![no_main]

use libfuzzer_sys::fuzz_target;
use pdfkern::core::EngineConfig;
use pdfkern::document::Document;

fuzz_target!(|data: &[u8]| {
    // Must not panic — errors are fine, panics are bugs.
    let _ = Document::from_bytes(data.to_vec(), "", EngineConfig::default());
});
