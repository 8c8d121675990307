use pdfkern::core::WriteMode;
use pdfkern::core::lexer::Lexer;
use pdfkern::object::{Dictionary, Name, PdfString, Reference, Value};
use pdfkern::parser::parse_value;

fn write(value: &Value, mode: WriteMode) -> Vec<u8> {
    let mut out = Vec::new();
    value.write(&mut out, mode).unwrap();
    out
}

fn reparse(bytes: &[u8]) -> Value {
    parse_value(&mut Lexer::new(bytes)).unwrap()
}

fn sample_values() -> Vec<Value> {
    let mut dict = Dictionary::new();
    dict.set("Type", "Page");
    dict.set("MediaBox", vec![
        Value::Integer(0),
        Value::Integer(0),
        Value::Real(595.276),
        Value::Real(841.89),
    ]);
    dict.set("Parent", Value::Reference(Reference::new(2, 0)));
    dict.set("Odd key", PdfString::literal(b"va(lu)e \\ with specials".to_vec()));

    vec![
        Value::Null,
        Value::Boolean(true),
        Value::Boolean(false),
        Value::Integer(0),
        Value::Integer(i64::MAX),
        Value::Integer(i64::MIN),
        Value::Real(0.5),
        Value::Real(-123.456789),
        Value::Name(Name::from("Name")),
        Value::Name(Name::new(b"needs escaping ()<>".to_vec())),
        Value::String(PdfString::literal(b"literal \x01 bytes \xff".to_vec())),
        Value::String(PdfString::hex(vec![0xDE, 0xAD, 0xBE, 0xEF])),
        Value::String(PdfString::from_unicode("äöü 漢字")),
        Value::Reference(Reference::new(4711, 7)),
        Value::Array(vec![Value::Null, Value::Integer(1), Value::Real(2.5)]),
        Value::Dictionary(dict),
    ]
}

// --- Roundtrip ---

#[test]
fn every_sample_value_survives_write_then_parse() {
    for value in sample_values() {
        for mode in [WriteMode::Compact, WriteMode::Clean] {
            let bytes = write(&value, mode);
            let back = reparse(&bytes);
            assert_eq!(back, value, "mode {mode:?}, bytes {}", String::from_utf8_lossy(&bytes));
        }
    }
}

#[test]
fn real_precision_is_kept_to_six_decimals() {
    for real in [0.000001, 123.456789, -0.333333, 9999999.5] {
        let bytes = write(&Value::Real(real), WriteMode::Compact);
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(!text.contains('e') && !text.contains('E'), "{text}");
        match reparse(&bytes) {
            Value::Real(back) => assert!((back - real).abs() < 5e-7, "{real} vs {back}"),
            other => panic!("{real} reparsed as {other:?}"),
        }
    }
}

#[test]
fn serialisation_is_deterministic() {
    let values = sample_values();
    let a: Vec<Vec<u8>> = values.iter().map(|v| write(v, WriteMode::Compact)).collect();
    let b: Vec<Vec<u8>> = values.iter().map(|v| write(v, WriteMode::Compact)).collect();
    assert_eq!(a, b);
}

// --- Dictionary semantics ---

#[test]
fn output_order_equals_insertion_order() {
    let mut dict = Dictionary::new();
    for key in ["Zeta", "Alpha", "Mu", "Beta"] {
        dict.set(key, 1i64);
    }
    let text = String::from_utf8(write(&Value::Dictionary(dict), WriteMode::Compact)).unwrap();
    let positions: Vec<usize> = ["Zeta", "Alpha", "Mu", "Beta"]
        .iter()
        .map(|k| text.find(&format!("/{k}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
}

#[test]
fn name_keys_compare_after_escape_resolution() {
    // `/A#42` and `/AB` are the same key.
    let value = reparse(b"<</A#42 1/AB 2>>");
    let dict = value.as_dict().unwrap();
    assert_eq!(dict.len(), 1);
    assert_eq!(dict.get_integer(b"AB"), Some(2));
}

#[test]
fn deep_equality_is_structural_and_references_stay_shallow() {
    let a = reparse(b"<</Kids [1 0 R] /Count 1>>");
    let b = reparse(b"<< /Kids[1 0 R]/Count 1 >>");
    assert_eq!(a, b);
    // Same reference, different target semantics: still equal by (n, g).
    assert_eq!(
        Value::Reference(Reference::new(1, 0)),
        Value::Reference(Reference::new(1, 0)),
    );
    assert_ne!(
        Value::Reference(Reference::new(1, 0)),
        Value::Reference(Reference::new(1, 1)),
    );
}

#[test]
fn clean_mode_is_parse_equivalent_to_compact() {
    for value in sample_values() {
        let clean = reparse(&write(&value, WriteMode::Clean));
        let compact = reparse(&write(&value, WriteMode::Compact));
        assert_eq!(clean, compact);
    }
}

#[test]
fn unicode_flag_survives_roundtrip() {
    let original = PdfString::from_unicode("Grüße aus Köln");
    let bytes = write(&Value::String(original.clone()), WriteMode::Compact);
    match reparse(&bytes) {
        Value::String(back) => {
            assert!(back.is_unicode());
            assert_eq!(back.to_text(), "Grüße aus Köln");
        }
        other => panic!("reparsed as {other:?}"),
    }
}
