#![no_main]

use libfuzzer_sys::fuzz_target;
use pdfkern::core::WriteMode;
use pdfkern::core::lexer::Lexer;
use pdfkern::parser::parse_value;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = parse_value(&mut Lexer::new(data)) {
        // Whatever parses must serialise to something that parses again.
        // (Reals may lose digits past the sixth decimal, so no deep
        // equality here; the proptest suite covers exact roundtrips.)
        let mut out = Vec::new();
        if value.write(&mut out, WriteMode::Compact).is_ok() {
            parse_value(&mut Lexer::new(&out)).expect("own output must parse");
        }
    }
});
