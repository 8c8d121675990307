#![no_main]

use libfuzzer_sys::fuzz_target;
use pdfkern::filter::{FilterKind, decode_to_vec};

fuzz_target!(|data: &[u8]| {
    for kind in [
        FilterKind::AsciiHex,
        FilterKind::Ascii85,
        FilterKind::Flate,
        FilterKind::Lzw,
        FilterKind::RunLength,
    ] {
        // Decoders must reject garbage with errors, never panic.
        let _ = decode_to_vec(&[kind], &[None], data);
    }
});
