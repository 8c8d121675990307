use pdfkern::filter::{FilterKind, decode_to_vec, encode_to_vec};
use pdfkern::object::{Dictionary, Value};

// --- ASCII85 ---

#[test]
fn ascii85_decodes_the_classic_sample() {
    let out = decode_to_vec(
        &[FilterKind::Ascii85],
        &[None],
        b"9jqo^BlbD-BleB1DJ+*+F(f,q~>",
    )
    .unwrap();
    assert_eq!(out.len(), 20);
    assert_eq!(out, b"Man is distinguished");
}

#[test]
fn ascii85_roundtrips_binary_data() {
    let data: Vec<u8> = (0u16..600).map(|i| (i * 7 % 256) as u8).collect();
    let encoded = encode_to_vec(&[FilterKind::Ascii85], &data).unwrap();
    assert!(encoded.ends_with(b"~>"));
    let decoded = decode_to_vec(&[FilterKind::Ascii85], &[None], &encoded).unwrap();
    assert_eq!(decoded, data);
}

// --- ASCIIHex ---

#[test]
fn asciihex_pads_the_odd_final_nibble() {
    let out = decode_to_vec(&[FilterKind::AsciiHex], &[None], b"901FA").unwrap();
    assert_eq!(out, vec![0x90, 0x1F, 0xA0]);
}

#[test]
fn asciihex_ignores_interleaved_whitespace() {
    let out = decode_to_vec(
        &[FilterKind::AsciiHex],
        &[None],
        b"\t48 65 6c\r\n6c 6f>",
    )
    .unwrap();
    assert_eq!(out, b"Hello");
}

// --- Flate ---

#[test]
fn flate_compresses_zeros_below_one_percent() {
    let data = vec![0u8; 10_000];
    let encoded = encode_to_vec(&[FilterKind::Flate], &data).unwrap();
    assert!(encoded.len() < 100, "10k zeros became {} bytes", encoded.len());
    let decoded = decode_to_vec(&[FilterKind::Flate], &[None], &encoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn flate_error_on_corrupt_stream() {
    let err = decode_to_vec(&[FilterKind::Flate], &[None], b"\x00corrupt").unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::FlateError);
}

// --- Predictors ---

fn predictor_parms(predictor: i64, columns: i64, colors: i64) -> Dictionary {
    let mut parms = Dictionary::new();
    parms.set("Predictor", predictor);
    parms.set("Columns", columns);
    parms.set("Colors", colors);
    parms
}

/// Apply a PNG row filter in the encoding direction, byte by byte.
fn png_filter_rows(rows: &[Vec<u8>], tag: u8, bpp: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous = vec![0u8; rows[0].len()];
    for row in rows {
        out.push(tag);
        for (i, &b) in row.iter().enumerate() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let upper_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => {
                    let (a, b2, c) = (
                        i32::from(left),
                        i32::from(up),
                        i32::from(upper_left),
                    );
                    let p = a + b2 - c;
                    let (pa, pb, pc) = ((p - a).abs(), (p - b2).abs(), (p - c).abs());
                    if pa <= pb && pa <= pc {
                        left
                    } else if pb <= pc {
                        up
                    } else {
                        upper_left
                    }
                }
                _ => unreachable!(),
            };
            out.push(b.wrapping_sub(predicted));
        }
        previous = row.clone();
    }
    out
}

#[test]
fn flate_with_png_predictors_reproduces_reference_rows() {
    let rows: Vec<Vec<u8>> = vec![
        vec![10, 20, 30, 40, 50, 60],
        vec![11, 22, 33, 44, 55, 66],
        vec![9, 18, 27, 36, 45, 54],
        vec![200, 100, 50, 25, 12, 6],
    ];
    let expected: Vec<u8> = rows.iter().flatten().copied().collect();

    // PNG None, Sub, Up and Average row filters (predictors 10..13).
    for (tag, predictor) in [(0u8, 10i64), (1, 11), (2, 12), (3, 13), (4, 14)] {
        let filtered = png_filter_rows(&rows, tag, 2);
        let encoded = encode_to_vec(&[FilterKind::Flate], &filtered).unwrap();
        let parms = predictor_parms(predictor, 3, 2);
        let decoded =
            decode_to_vec(&[FilterKind::Flate], &[Some(parms)], &encoded).unwrap();
        assert_eq!(decoded, expected, "row filter tag {tag}");
    }
}

#[test]
fn tiff_predictor_two() {
    // Two components, three columns; deltas against the previous pixel.
    let raw = [5u8, 10, 5, 10, 5, 10];
    let encoded = encode_to_vec(&[FilterKind::Flate], &raw).unwrap();
    let parms = predictor_parms(2, 3, 2);
    let decoded = decode_to_vec(&[FilterKind::Flate], &[Some(parms)], &encoded).unwrap();
    assert_eq!(decoded, vec![5, 10, 10, 20, 15, 30]);
}

#[test]
fn optimum_predictor_is_rejected() {
    let encoded = encode_to_vec(&[FilterKind::Flate], &[0u8; 8]).unwrap();
    let parms = predictor_parms(15, 8, 1);
    let err = decode_to_vec(&[FilterKind::Flate], &[Some(parms)], &encoded).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InvalidPredictor);
}

#[test]
fn sixteen_bit_predictor_is_rejected() {
    let encoded = encode_to_vec(&[FilterKind::Flate], &[0u8; 8]).unwrap();
    let mut parms = predictor_parms(12, 4, 1);
    parms.set("BitsPerComponent", 16i64);
    let err = decode_to_vec(&[FilterKind::Flate], &[Some(parms)], &encoded).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InvalidPredictor);
}

// --- RunLength ---

#[test]
fn runlength_packbits_semantics() {
    let out = decode_to_vec(
        &[FilterKind::RunLength],
        &[None],
        b"\x03PDF!\xfd-\x80",
    )
    .unwrap();
    assert_eq!(out, b"PDF!----");
}

// --- Chains ---

#[test]
fn multi_stage_chain_roundtrip() {
    // Decoding applies Flate first, then ASCII85, then ASCIIHex.
    let kinds = [
        FilterKind::Flate,
        FilterKind::Ascii85,
        FilterKind::AsciiHex,
    ];
    let data = b"pipeline composition across three stages".repeat(20);
    let encoded = encode_to_vec(&kinds, &data).unwrap();
    let decoded = decode_to_vec(&kinds, &[None, None, None], &encoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn decode_parms_must_align_with_the_chain() {
    let mut dict = Dictionary::new();
    dict.set(
        "Filter",
        vec![Value::from("FlateDecode"), Value::from("ASCIIHexDecode")],
    );
    dict.set("DecodeParms", vec![Value::Null]);
    let err = pdfkern::filter::stream_filters(&dict).unwrap_err();
    assert_eq!(err.kind(), pdfkern::ErrorKind::InvalidStream);
}

#[test]
fn short_names_only_for_inline_images() {
    assert!(FilterKind::from_name(b"Fl", true).is_ok());
    assert!(FilterKind::from_name(b"Fl", false).is_err());
    assert!(FilterKind::from_name(b"RL", true).is_ok());
    assert!(FilterKind::from_name(b"DCT", true).is_ok());
}

#[test]
fn opaque_filters_are_accepted_in_chains() {
    for kind in [
        FilterKind::Dct,
        FilterKind::CcittFax,
        FilterKind::Jbig2,
        FilterKind::Jpx,
        FilterKind::Crypt,
    ] {
        let data = b"opaque payload".to_vec();
        let out = decode_to_vec(&[kind], &[None], &data).unwrap();
        assert_eq!(out, data, "{kind:?}");
    }
}
