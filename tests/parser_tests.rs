use pdfkern::core::EngineConfig;
use pdfkern::document::Document;
use pdfkern::object::{Reference, Value};

/// Assemble a minimal classic-xref file, computing offsets as we go.
fn classic_pdf() -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::new();
    let objects: Vec<String> = vec![
        "1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n".into(),
        "2 0 obj\n<</Type /Pages /Kids [3 0 R] /Count 1>>\nendobj\n".into(),
        "3 0 obj\n<</Type /Page /Parent 2 0 R /Contents 4 0 R>>\nendobj\n".into(),
        "4 0 obj\n<</Length 8>>\nstream\nBT ET Tj\nendstream\nendobj\n".into(),
    ];
    for body in &objects {
        offsets.push(out.len());
        out.extend_from_slice(body.as_bytes());
    }

    let xref_at = out.len();
    out.extend_from_slice(b"xref\n0 5\n0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(b"trailer\n<</Size 5 /Root 1 0 R>>\n");
    out.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF\n").as_bytes());
    out
}

/// A file whose cross-reference is a stream and whose small objects live in
/// an object stream.
fn xref_stream_pdf() -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n");

    // Object stream no. 3 holds objects 1 (catalog) and 2 (pages).
    let first_member = "<</Type /Catalog /Pages 2 0 R>>";
    let second_member = "<</Type /Pages /Kids [] /Count 0>>";
    let header = format!("1 0 2 {} ", first_member.len() + 1);
    let payload = format!("{header}{first_member} {second_member}");
    let first = header.len();

    let objstm_offset = out.len();
    out.extend_from_slice(
        format!(
            "3 0 obj\n<</Type /ObjStm /N 2 /First {first} /Length {}>>\nstream\n{payload}\nendstream\nendobj\n",
            payload.len()
        )
        .as_bytes(),
    );

    // Cross-reference stream as object 4: W [1 2 1], entries for 0..=4.
    let xref_offset = out.len();
    let mut rows: Vec<u8> = Vec::new();
    rows.extend_from_slice(&[0, 0, 0, 255]); // 0: free
    rows.extend_from_slice(&[2, 0, 3, 0]); // 1: in stream 3, index 0
    rows.extend_from_slice(&[2, 0, 3, 1]); // 2: in stream 3, index 1
    let objstm = u16::try_from(objstm_offset).unwrap().to_be_bytes();
    rows.extend_from_slice(&[1, objstm[0], objstm[1], 0]); // 3: offset
    let xref16 = u16::try_from(xref_offset).unwrap().to_be_bytes();
    rows.extend_from_slice(&[1, xref16[0], xref16[1], 0]); // 4: itself
    let mut stream_obj = format!(
        "4 0 obj\n<</Type /XRef /Size 5 /W [1 2 1] /Index [0 5] /Root 1 0 R /Length {}>>\nstream\n",
        rows.len()
    )
    .into_bytes();
    stream_obj.extend_from_slice(&rows);
    stream_obj.extend_from_slice(b"\nendstream\nendobj\n");
    out.extend_from_slice(&stream_obj);

    out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
    out
}

// --- Classic tables ---

#[test]
fn classic_document_loads() {
    let doc = Document::from_bytes(classic_pdf(), "", EngineConfig::default()).unwrap();
    assert_eq!(doc.version(), (1, 4));
    assert!(!doc.is_linearized());
    assert_eq!(doc.collection().len(), 4);

    let catalog = doc.catalog().unwrap();
    let pages = catalog.dict().unwrap().get(b"Pages").unwrap();
    assert_eq!(*pages, Value::Reference(Reference::new(2, 0)));
}

#[test]
fn deferred_stream_materialises_from_the_source() {
    let doc = Document::from_bytes(classic_pdf(), "", EngineConfig::default()).unwrap();
    let content = doc.stream_bytes(Reference::new(4, 0)).unwrap();
    assert_eq!(content, b"BT ET Tj");
}

#[test]
fn loaded_objects_start_clean() {
    let mut doc = Document::from_bytes(classic_pdf(), "", EngineConfig::default()).unwrap();
    assert_eq!(doc.collection().dirty_objects().count(), 0);
    doc.get_object_mut(Reference::new(3, 0)).unwrap();
    assert_eq!(doc.collection().dirty_objects().count(), 1);
}

#[test]
fn missing_header_is_invalid_pdf() {
    let err = Document::from_bytes(b"not a pdf at all".to_vec(), "", EngineConfig::default())
        .unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InvalidPdf);
}

#[test]
fn truncated_xref_offset_is_rejected() {
    let mut bytes = classic_pdf();
    let pos = bytes.windows(9).rposition(|w| w == b"startxref").unwrap();
    bytes.truncate(pos);
    bytes.extend_from_slice(b"startxref\n999999\n%%EOF\n");
    let err = Document::from_bytes(bytes, "", EngineConfig::default()).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InvalidXRef);
}

// --- Cross-reference and object streams ---

#[test]
fn xref_stream_document_loads() {
    let doc = Document::from_bytes(xref_stream_pdf(), "", EngineConfig::default()).unwrap();
    // Members of the object stream are materialised; the container and the
    // xref stream itself are not kept as objects.
    let catalog = doc.get_object(Reference::new(1, 0)).unwrap();
    assert_eq!(
        catalog.dict().unwrap().get_name(b"Type").unwrap().as_bytes(),
        b"Catalog"
    );
    let pages = doc.get_object(Reference::new(2, 0)).unwrap();
    assert_eq!(pages.dict().unwrap().get_integer(b"Count"), Some(0));
    assert!(doc.get_object(Reference::new(3, 0)).is_none());
    assert!(doc.get_object(Reference::new(4, 0)).is_none());
}

#[test]
fn object_stream_members_are_gen_zero_and_clean() {
    let doc = Document::from_bytes(xref_stream_pdf(), "", EngineConfig::default()).unwrap();
    assert_eq!(doc.collection().dirty_objects().count(), 0);
    assert_eq!(
        doc.get_object(Reference::new(1, 0)).unwrap().reference(),
        Reference::new(1, 0)
    );
}

// --- Writer to parser roundtrip ---

#[test]
fn written_documents_parse_back() {
    let mut doc = Document::new(EngineConfig::default());
    doc.set_info_entry("Title", "Roundtrip").unwrap();
    let content = doc.create_object(None);
    {
        let obj = doc.get_object_mut(content).unwrap();
        obj.begin_stream_append(&[pdfkern::filter::FilterKind::Flate], true)
            .unwrap();
        obj.append_stream(b"0 0 m 100 100 l S").unwrap();
        obj.end_stream_append().unwrap();
    }

    let mut device = pdfkern::core::OutputDevice::new(std::io::Cursor::new(Vec::new()));
    doc.save_to(&mut device).unwrap();
    let bytes = device.into_inner().into_inner();

    let back = Document::from_bytes(bytes, "", EngineConfig::default()).unwrap();
    assert_eq!(back.info_entry("Title").unwrap(), "Roundtrip");
    assert_eq!(back.stream_bytes(content).unwrap(), b"0 0 m 100 100 l S");
}

#[test]
fn dangling_reference_resolves_to_null_on_read() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"%PDF-1.4\n");
    let obj_at = bytes.len();
    bytes.extend_from_slice(b"1 0 obj\n<</Type /Catalog /Broken 99 0 R>>\nendobj\n");
    let xref_at = bytes.len();
    bytes.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    bytes.extend_from_slice(format!("{obj_at:010} 00000 n \n").as_bytes());
    bytes.extend_from_slice(b"trailer\n<</Size 2 /Root 1 0 R>>\n");
    bytes.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF\n").as_bytes());

    let doc = Document::from_bytes(bytes, "", EngineConfig::default()).unwrap();
    let broken = doc
        .catalog()
        .unwrap()
        .dict()
        .unwrap()
        .get(b"Broken")
        .unwrap()
        .clone();
    assert!(doc.collection().resolve(&broken).is_null());
}

#[test]
fn linearization_flag_is_detected() {
    // A linearisation dictionary as the first object; the xref is walked
    // normally regardless.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"%PDF-1.4\n");
    let lin_at = bytes.len();
    bytes.extend_from_slice(b"5 0 obj\n<</Linearized 1 /L 1234>>\nendobj\n");
    let cat_at = bytes.len();
    bytes.extend_from_slice(b"1 0 obj\n<</Type /Catalog>>\nendobj\n");
    let xref_at = bytes.len();
    bytes.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
    bytes.extend_from_slice(format!("{cat_at:010} 00000 n \n").as_bytes());
    bytes.extend_from_slice(b"5 1\n");
    bytes.extend_from_slice(format!("{lin_at:010} 00000 n \n").as_bytes());
    bytes.extend_from_slice(b"trailer\n<</Size 6 /Root 1 0 R>>\n");
    bytes.extend_from_slice(format!("startxref\n{xref_at}\n%%EOF\n").as_bytes());

    let doc = Document::from_bytes(bytes, "", EngineConfig::default()).unwrap();
    assert!(doc.is_linearized());
}
