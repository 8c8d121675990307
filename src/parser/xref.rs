//! Cross-reference machinery: classic tables, xref streams, and the `/Prev`
//! chain walk with first-occurrence-wins merging.

use std::collections::{BTreeMap, HashSet};

use log::warn;

use crate::core::lexer::Lexer;
use crate::core::{ErrorKind, PdfError, Result};
use crate::filter;
use crate::object::{Dictionary, Value};
use crate::parser::objects::parse_value;

/// One row of the merged cross-reference map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free { next_generation: u16 },
    InUse { offset: u64, generation: u16 },
    /// Object lives inside an object stream.
    InStream { container: u32, index: u32 },
}

/// Result of walking the whole xref chain.
#[derive(Debug)]
pub struct XrefMap {
    pub entries: BTreeMap<u32, XrefEntry>,
    /// Trailer of the newest section.
    pub trailer: Dictionary,
    /// True when any section in the chain was a cross-reference stream.
    pub saw_xref_stream: bool,
}

/// Walk the chain starting at `start_offset`, newest first. Within the walk
/// the first section to mention an object wins; a hybrid section's
/// `/XRefStm` entries take precedence over its own table rows.
pub fn walk_chain(data: &[u8], start_offset: u64) -> Result<XrefMap> {
    let mut entries: BTreeMap<u32, XrefEntry> = BTreeMap::new();
    let mut trailer: Option<Dictionary> = None;
    let mut saw_xref_stream = false;
    let mut visited: HashSet<u64> = HashSet::new();
    let mut queue: Vec<u64> = vec![start_offset];

    while let Some(offset) = queue.pop() {
        if !visited.insert(offset) {
            warn!("xref chain loops back to offset {offset}; stopping");
            continue;
        }
        let section = read_section(data, offset)?;
        if section.is_stream {
            saw_xref_stream = true;
        }
        if let Some(stm_offset) = section.xref_stm {
            // Hybrid file: the stream's entries beat the table's.
            let stream_section = read_section(data, stm_offset)?;
            saw_xref_stream = true;
            merge(&mut entries, stream_section.entries);
        }
        merge(&mut entries, section.entries);
        if trailer.is_none() {
            trailer = Some(section.trailer);
        }
        if let Some(prev) = section.prev {
            queue.push(prev);
        }
    }

    Ok(XrefMap {
        entries,
        trailer: trailer.ok_or_else(|| {
            PdfError::new(ErrorKind::InvalidTrailer, "xref chain yielded no trailer")
        })?,
        saw_xref_stream,
    })
}

fn merge(entries: &mut BTreeMap<u32, XrefEntry>, section: Vec<(u32, XrefEntry)>) {
    for (number, entry) in section {
        entries.entry(number).or_insert(entry);
    }
}

struct Section {
    entries: Vec<(u32, XrefEntry)>,
    trailer: Dictionary,
    prev: Option<u64>,
    xref_stm: Option<u64>,
    is_stream: bool,
}

fn read_section(data: &[u8], offset: u64) -> Result<Section> {
    if offset as usize >= data.len() {
        return Err(PdfError::new(
            ErrorKind::InvalidXRef,
            format!("xref offset {offset} beyond end of file"),
        ));
    }
    let mut lex = Lexer::new(data);
    lex.seek(offset as usize);
    if lex.try_keyword(b"xref") {
        read_table(&mut lex)
    } else {
        read_stream_section(data, offset)
    }
}

/// Classic `xref` table: subsections of 20-byte rows, closed by `trailer`.
fn read_table(lex: &mut Lexer<'_>) -> Result<Section> {
    let mut entries = Vec::new();
    loop {
        if lex.try_keyword(b"trailer") {
            break;
        }
        let first = lex.read_uint().map_err(|e| {
            e.push_frame("reading xref subsection header")
        })? as u32;
        let count = lex.read_uint()?;
        for i in 0..count {
            let number = first + i as u32;
            let field1 = lex.read_uint()?;
            let field2 = lex.read_uint()? as u16;
            lex.skip_whitespace();
            let kind = lex.read_token();
            let entry = match kind {
                b"n" => XrefEntry::InUse {
                    offset: field1,
                    generation: field2,
                },
                b"f" => XrefEntry::Free {
                    next_generation: field2,
                },
                other => {
                    return Err(PdfError::new(
                        ErrorKind::InvalidXRef,
                        format!(
                            "xref entry type `{}` for object {number}",
                            String::from_utf8_lossy(other)
                        ),
                    ));
                }
            };
            entries.push((number, entry));
        }
    }

    let trailer = match parse_value(lex)? {
        Value::Dictionary(dict) => dict,
        _ => {
            return Err(PdfError::new(
                ErrorKind::InvalidTrailer,
                "trailer is not a dictionary",
            ));
        }
    };
    let prev = trailer.get_integer(b"Prev").map(|p| p as u64);
    let xref_stm = trailer.get_integer(b"XRefStm").map(|p| p as u64);
    Ok(Section {
        entries,
        trailer,
        prev,
        xref_stm,
        is_stream: false,
    })
}

/// Cross-reference stream: `/Type /XRef` with `/W` field widths and
/// `/Index` subsection pairs over the decoded payload.
fn read_stream_section(data: &[u8], offset: u64) -> Result<Section> {
    let parsed = super::parse_indirect_at(data, offset as usize, &|_| None)
        .map_err(|e| e.push_frame("parsing cross-reference stream object"))?;
    let dict = match &parsed.value {
        Value::Dictionary(dict) => dict.clone(),
        _ => {
            return Err(PdfError::new(
                ErrorKind::InvalidXRefStream,
                format!("no xref table or stream at offset {offset}"),
            ));
        }
    };
    match dict.get_name(b"Type") {
        Some(name) if *name == "XRef" => {}
        _ => {
            return Err(PdfError::new(
                ErrorKind::InvalidXRefStream,
                format!("object at offset {offset} is not /Type /XRef"),
            ));
        }
    }

    let raw = parsed.stream_data(data).ok_or_else(|| {
        PdfError::new(ErrorKind::InvalidXRefStream, "xref stream carries no data")
    })?;
    let (kinds, parms) = filter::stream_filters(&dict)?;
    let decoded = if kinds.is_empty() {
        raw
    } else {
        filter::decode_to_vec(&kinds, &parms, &raw)
            .map_err(|e| e.push_frame("decoding cross-reference stream"))?
    };

    let widths: Vec<usize> = dict
        .get_array(b"W")
        .ok_or_else(|| {
            PdfError::new(ErrorKind::InvalidXRefStream, "xref stream without /W")
        })?
        .iter()
        .map(|w| {
            w.as_integer().filter(|w| (0..=8).contains(w)).map(|w| w as usize).ok_or_else(
                || PdfError::new(ErrorKind::InvalidXRefStream, "bad field width in /W"),
            )
        })
        .collect::<Result<_>>()?;
    if widths.len() != 3 {
        return Err(PdfError::new(
            ErrorKind::InvalidXRefStream,
            format!("/W has {} fields instead of 3", widths.len()),
        ));
    }
    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(PdfError::new(ErrorKind::InvalidXRefStream, "/W is all zero"));
    }

    let size = dict.get_integer(b"Size").unwrap_or(0).max(0) as u32;
    let index: Vec<(u32, u32)> = match dict.get_array(b"Index") {
        None => vec![(0, size)],
        Some(pairs) => {
            if pairs.len() % 2 != 0 {
                return Err(PdfError::new(
                    ErrorKind::InvalidXRefStream,
                    "/Index has an odd number of entries",
                ));
            }
            pairs
                .chunks_exact(2)
                .map(|pair| {
                    match (pair[0].as_integer(), pair[1].as_integer()) {
                        (Some(first), Some(count)) if first >= 0 && count >= 0 => {
                            Ok((first as u32, count as u32))
                        }
                        _ => Err(PdfError::new(
                            ErrorKind::InvalidXRefStream,
                            "non-integer /Index pair",
                        )),
                    }
                })
                .collect::<Result<_>>()?
        }
    };

    let mut entries = Vec::new();
    let mut records = decoded.chunks_exact(record_len);
    for (first, count) in index {
        for i in 0..count {
            let Some(record) = records.next() else {
                return Err(PdfError::new(
                    ErrorKind::InvalidXRefStream,
                    "xref stream data shorter than /Index declares",
                ));
            };
            let (type_field, rest) = record.split_at(widths[0]);
            let (field2, field3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to 1 (in use).
            let entry_type = if widths[0] == 0 { 1 } else { read_field(type_field) };
            let field2 = read_field(field2);
            let field3 = read_field(field3);
            let number = first + i;
            let entry = match entry_type {
                0 => XrefEntry::Free {
                    next_generation: field3 as u16,
                },
                1 => XrefEntry::InUse {
                    offset: field2,
                    generation: field3 as u16,
                },
                2 => XrefEntry::InStream {
                    container: field2 as u32,
                    index: field3 as u32,
                },
                other => {
                    warn!("unknown xref stream entry type {other} for object {number}");
                    continue;
                }
            };
            entries.push((number, entry));
        }
    }

    let prev = dict.get_integer(b"Prev").map(|p| p as u64);
    Ok(Section {
        entries,
        trailer: dict,
        prev,
        xref_stm: None,
        is_stream: true,
    })
}

fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b))
}
