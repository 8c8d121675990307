use std::io::Cursor;

use pdfkern::core::{EngineConfig, OutputDevice, WriteMode};
use pdfkern::document::Document;
use pdfkern::object::{PdfString, Reference, Value};
use pdfkern::writer::apply_signature;

fn save(doc: &mut Document) -> Vec<u8> {
    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    doc.save_to(&mut device).unwrap();
    device.into_inner().into_inner()
}

/// A five-page document built at the object level.
fn five_page_doc() -> Document {
    let mut doc = Document::new(EngineConfig::default());
    let pages_id = doc.create_object(Some("Pages"));
    let catalog = doc.catalog_ref().unwrap();
    doc.get_object_mut(catalog)
        .unwrap()
        .dict_mut()
        .unwrap()
        .set("Pages", Value::Reference(pages_id));

    let mut kids = Vec::new();
    for _ in 0..5 {
        let page = doc.create_object(Some("Page"));
        {
            let dict = doc.get_object_mut(page).unwrap().dict_mut().unwrap();
            dict.set("Parent", Value::Reference(pages_id));
            dict.set(
                "MediaBox",
                vec![
                    Value::Integer(0),
                    Value::Integer(0),
                    Value::Integer(595),
                    Value::Integer(842),
                ],
            );
        }
        kids.push(Value::Reference(page));
    }
    {
        let dict = doc.get_object_mut(pages_id).unwrap().dict_mut().unwrap();
        dict.set("Kids", kids);
        dict.set("Count", 5i64);
    }
    doc
}

fn first_page_ref(doc: &Document) -> Reference {
    let catalog = doc.catalog().unwrap().dict().unwrap();
    let pages = catalog.get(b"Pages").and_then(Value::as_reference).unwrap();
    doc.get_object(pages)
        .unwrap()
        .dict()
        .unwrap()
        .get_array(b"Kids")
        .unwrap()[0]
        .as_reference()
        .unwrap()
}

// --- Full writer ---

#[test]
fn output_starts_with_header_and_binary_marker() {
    let bytes = save(&mut five_page_doc());
    assert!(bytes.starts_with(b"%PDF-1.7\n"));
    // Four bytes above 0x80 right after the version line.
    let marker = &bytes[9..14];
    assert_eq!(marker[0], b'%');
    assert!(marker[1..].iter().all(|&b| b >= 0x80), "{marker:?}");
    assert!(bytes.ends_with(b"%%EOF\n"));
}

#[test]
fn repeated_saves_are_byte_identical() {
    let mut doc = five_page_doc();
    let first = save(&mut doc);
    let second = save(&mut doc);
    assert_eq!(first, second);
}

#[test]
fn clean_and_compact_modes_parse_the_same() {
    let mut config = EngineConfig::default();
    config.write_mode = WriteMode::Clean;
    let mut doc = Document::new(config);
    doc.set_info_entry("Subject", "modes").unwrap();
    let clean_bytes = save(&mut doc);
    assert!(clean_bytes.windows(2).any(|w| w == b">\n" || w == b"\n/"));

    let back = Document::from_bytes(clean_bytes, "", EngineConfig::default()).unwrap();
    assert_eq!(back.info_entry("Subject").unwrap(), "modes");
}

#[test]
fn dangling_reference_on_save_is_internal_logic() {
    let mut doc = Document::new(EngineConfig::default());
    let holder = doc.create_object(None);
    doc.get_object_mut(holder)
        .unwrap()
        .dict_mut()
        .unwrap()
        .set("Target", Value::Reference(Reference::new(999, 0)));
    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    let err = doc.save_to(&mut device).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InternalLogic);
}

#[test]
fn freed_slots_emit_a_free_chain() {
    let mut doc = Document::new(EngineConfig::default());
    let a = doc.create_object(None);
    let _b = doc.create_object(None);
    doc.remove_object(a).unwrap();
    let bytes = save(&mut doc);
    let text = String::from_utf8_lossy(&bytes);
    // The freed slot appears as an `f` entry with its bumped generation.
    assert!(text.contains("00001 f"), "{text}");
}

// --- Incremental writer ---

#[test]
fn incremental_output_is_a_strict_prefix_extension() {
    let mut doc = five_page_doc();
    let original = save(&mut doc);

    let mut loaded = Document::from_bytes(original.clone(), "", EngineConfig::default()).unwrap();
    let page = first_page_ref(&loaded);
    loaded
        .get_object_mut(page)
        .unwrap()
        .dict_mut()
        .unwrap()
        .set("Rotate", 90i64);

    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    loaded.save_incremental_to(&mut device).unwrap();
    let updated = device.into_inner().into_inner();

    assert!(updated.len() > original.len());
    assert_eq!(&updated[..original.len()], &original[..]);
}

#[test]
fn incremental_update_parses_with_prev_chain() {
    let mut doc = five_page_doc();
    let original = save(&mut doc);

    let mut loaded = Document::from_bytes(original.clone(), "", EngineConfig::default()).unwrap();
    let page = first_page_ref(&loaded);

    // Append an annotation to page 0: one new object, one dirtied page.
    let annot = loaded.create_object(Some("Annot"));
    {
        let dict = loaded.get_object_mut(annot).unwrap().dict_mut().unwrap();
        dict.set("Subtype", "Text");
        dict.set(
            "Contents",
            PdfString::literal(b"reviewed".to_vec()),
        );
        dict.set("P", Value::Reference(page));
    }
    loaded
        .get_object_mut(page)
        .unwrap()
        .dict_mut()
        .unwrap()
        .set("Annots", vec![Value::Reference(annot)]);

    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    loaded.save_incremental_to(&mut device).unwrap();
    let updated = device.into_inner().into_inner();
    assert_eq!(&updated[..original.len()], &original[..]);

    // The update carries exactly the page and the annotation.
    let tail = String::from_utf8_lossy(&updated[original.len()..]);
    assert!(tail.contains("/Annots"), "{tail}");
    assert!(tail.contains("/Subtype /Text"), "{tail}");
    assert!(tail.contains("/Prev"), "{tail}");

    let reloaded = Document::from_bytes(updated, "", EngineConfig::default()).unwrap();
    let annots = reloaded
        .get_object(page)
        .unwrap()
        .dict()
        .unwrap()
        .get_array(b"Annots")
        .unwrap()
        .to_vec();
    assert_eq!(annots, vec![Value::Reference(annot)]);
    let text = reloaded
        .get_object(annot)
        .unwrap()
        .dict()
        .unwrap()
        .get(b"Contents")
        .and_then(Value::as_string)
        .unwrap()
        .to_text();
    assert_eq!(text, "reviewed");
}

#[test]
fn incremental_save_without_changes_is_rejected() {
    let mut doc = five_page_doc();
    let original = save(&mut doc);
    let mut loaded = Document::from_bytes(original, "", EngineConfig::default()).unwrap();
    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    let err = loaded.save_incremental_to(&mut device).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InvalidInput);
}

// --- Signature beacon ---

#[test]
fn signature_byte_ranges_bracket_the_reservation() {
    let mut doc = five_page_doc();
    let original = save(&mut doc);
    let mut loaded = Document::from_bytes(original.clone(), "", EngineConfig::default()).unwrap();
    let page = first_page_ref(&loaded);
    loaded
        .create_signature_field(page, [400.0, 50.0, 550.0, 100.0], "Signature1")
        .unwrap();

    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    let beacon = loaded.save_incremental_signed(&mut device).unwrap();
    let bytes = device.into_inner().into_inner();

    // Prefix invariant still holds for the signed update.
    assert_eq!(&bytes[..original.len()], &original[..]);
    assert_eq!(bytes.len() as u64, beacon.file_len);

    // [0 n1 n2 n3]: the gap holds `<` + hex + `>`.
    let [zero, n1, n2, n3] = beacon.byte_range;
    assert_eq!(zero, 0);
    assert_eq!(n2 - n1, 2 * beacon.capacity as i64 + 2);
    assert_eq!(n1 + n3, bytes.len() as i64 - (n2 - n1));
    assert_eq!(bytes[n1 as usize], b'<');
    assert_eq!(bytes[n2 as usize - 1], b'>');

    // The /ByteRange placeholder was patched in place with fixed widths.
    let brange = String::from_utf8_lossy(&bytes[beacon.byte_range_offset as usize..][..45]);
    assert!(brange.starts_with("[0000000000 "), "{brange}");

    // %%EOF position is final before patching.
    assert!(bytes.ends_with(b"%%EOF\n"));
}

#[test]
fn applying_a_signature_preserves_length_and_eof() {
    let mut doc = five_page_doc();
    let original = save(&mut doc);
    let mut loaded = Document::from_bytes(original, "", EngineConfig::default()).unwrap();
    let page = first_page_ref(&loaded);
    loaded
        .create_signature_field(page, [0.0, 0.0, 100.0, 50.0], "Sig")
        .unwrap();

    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    let beacon = loaded.save_incremental_signed(&mut device).unwrap();
    let before = device.tell();

    let fake_der = vec![0x30, 0x82, 0x01, 0x00, 0xAA, 0xBB];
    apply_signature(&mut device, &beacon, &fake_der).unwrap();
    assert_eq!(device.tell(), before);

    let bytes = device.into_inner().into_inner();
    assert_eq!(bytes.len() as u64, beacon.file_len);
    let hex_start = beacon.contents_offset as usize + 1;
    assert_eq!(&bytes[hex_start..hex_start + 12], b"30820100AABB");
    assert!(bytes.ends_with(b"%%EOF\n"));
}

#[test]
fn oversized_signature_is_rejected() {
    let mut config = EngineConfig::default();
    config.signature_capacity = 16;
    let mut doc = Document::new(config.clone());
    let page = doc.create_object(Some("Page"));
    // Wire a minimal pages tree so references resolve.
    let catalog = doc.catalog_ref().unwrap();
    doc.get_object_mut(catalog)
        .unwrap()
        .dict_mut()
        .unwrap()
        .set("Pages", Value::Reference(page));
    let original = save(&mut doc);

    let mut loaded = Document::from_bytes(original, "", config).unwrap();
    let page = {
        let catalog = loaded.catalog().unwrap().dict().unwrap();
        catalog.get(b"Pages").and_then(Value::as_reference).unwrap()
    };
    loaded
        .create_signature_field(page, [0.0, 0.0, 10.0, 10.0], "S")
        .unwrap();
    let mut device = OutputDevice::new(Cursor::new(Vec::new()));
    let beacon = loaded.save_incremental_signed(&mut device).unwrap();
    let err = apply_signature(&mut device, &beacon, &[0u8; 64]).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::ValueOutOfRange);
}
