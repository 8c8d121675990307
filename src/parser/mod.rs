//! Document parsing: header discovery, xref chain, object materialisation,
//! object streams, and linearisation detection.

mod objects;
mod xref;

pub use xref::{XrefEntry, XrefMap};

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;

use crate::core::lexer::Lexer;
use crate::core::{EngineConfig, ErrorContext, ErrorKind, PdfError, Result};
use crate::object::{
    Dictionary, Object, ObjectCollection, Reference, Stream, Value,
};

pub use objects::parse_value;

/// How far into the file the `%PDF-` header may sit.
const HEADER_SCAN_LIMIT: usize = 1024;

/// Outcome of parsing a document.
pub struct ParsedDocument {
    pub collection: ObjectCollection,
    pub trailer: Dictionary,
    pub version: (u8, u8),
    pub linearized: bool,
    /// Offset the last `startxref` points at; `/Prev` for incremental saves.
    pub xref_offset: u64,
    /// True when the xref chain used cross-reference streams.
    pub used_xref_streams: bool,
    /// The `/Encrypt` dictionary and, when indirect, its reference.
    pub encrypt: Option<(Dictionary, Option<Reference>)>,
    /// Object-stream members not yet materialised. Empty for plaintext
    /// documents; encrypted ones defer explosion until the containers are
    /// decrypted.
    pub pending_object_streams: Vec<(u32, Vec<(u32, u32)>)>,
}

/// An indirect object parsed straight off the byte stream.
pub(crate) struct ParsedIndirect {
    pub id: Reference,
    pub value: Value,
    /// Extent of the raw (still encoded) stream payload in the source.
    pub stream: Option<(usize, usize)>,
}

impl ParsedIndirect {
    /// Owned copy of the stream payload, for callers that decode in place.
    pub fn stream_data(&self, data: &[u8]) -> Option<Vec<u8>> {
        self.stream.map(|(start, len)| data[start..start + len].to_vec())
    }
}

/// Parse a complete document from memory.
pub fn parse_document(source: Arc<Vec<u8>>, config: &EngineConfig) -> Result<ParsedDocument> {
    let data: &[u8] = &source;
    let (version, header_end) = find_header(data)?;
    let xref_offset = find_startxref(data)?;
    let linearized = detect_linearization(data, header_end);

    let map = xref::walk_chain(data, xref_offset).frame("reading the xref chain")?;
    let trailer = map.trailer.clone();

    let size = trailer.get_integer(b"Size").unwrap_or(0);
    if let Some(&max) = map.entries.keys().next_back() {
        if i64::from(max) >= size {
            warn!("xref lists object {max} beyond /Size {size}");
        }
    }

    let mut collection = ObjectCollection::new();
    let resolver = make_length_resolver(data, &map.entries);

    // Uncompressed objects first; object streams need their containers.
    for (&number, entry) in &map.entries {
        if config.cancelled() {
            return Err(PdfError::new(ErrorKind::InvalidInput, "parse cancelled"));
        }
        match *entry {
            XrefEntry::Free { next_generation } => {
                collection.register_free(number, next_generation);
            }
            XrefEntry::InUse { offset, generation } => {
                match parse_indirect_at(data, offset as usize, &resolver) {
                    Ok(parsed) => {
                        let expected = Reference::new(number, generation);
                        if parsed.id != expected {
                            warn!(
                                "object at offset {offset} identifies as {} but xref says {expected}",
                                parsed.id
                            );
                        }
                        let stream = parsed
                            .stream
                            .map(|(start, len)| Stream::from_source(source.clone(), start, len));
                        collection.insert(Object::parsed(parsed.id, parsed.value, stream));
                    }
                    Err(e) => {
                        warn!("skipping unreadable object {number} {generation}: {e}");
                    }
                }
            }
            XrefEntry::InStream { .. } => {}
        }
    }

    let mut containers: BTreeMap<u32, Vec<(u32, u32)>> = BTreeMap::new();
    for (&number, entry) in &map.entries {
        if let XrefEntry::InStream { container, index } = *entry {
            containers.entry(container).or_default().push((number, index));
        }
    }
    let encrypted = matches!(trailer.get(b"Encrypt"), Some(v) if !v.is_null());

    // Explode object streams and drop the containers. Encrypted containers
    // wait until the document layer has decrypted them.
    let mut pending_object_streams = Vec::new();
    if encrypted {
        pending_object_streams = containers.into_iter().collect();
    } else {
        explode_object_streams(&mut collection, containers.into_iter());
    }

    // Cross-reference streams are consumed by the walk and must not be
    // rewritten as ordinary objects.
    let xref_stream_ids: Vec<Reference> = collection
        .iter()
        .filter(|obj| {
            obj.value()
                .as_dict()
                .and_then(|d| d.get_name(b"Type"))
                .is_some_and(|n| *n == "XRef")
        })
        .map(|obj| obj.reference())
        .collect();
    for id in xref_stream_ids {
        collection.remove(id);
    }

    let encrypt = match trailer.get(b"Encrypt") {
        None | Some(Value::Null) => None,
        Some(Value::Reference(id)) => {
            let dict = collection
                .get(*id)
                .and_then(|obj| obj.value().as_dict().cloned())
                .ok_or_else(|| {
                    PdfError::new(
                        ErrorKind::InvalidEncryptionDict,
                        format!("/Encrypt reference {id} does not resolve to a dictionary"),
                    )
                })?;
            Some((dict, Some(*id)))
        }
        Some(Value::Dictionary(dict)) => Some((dict.clone(), None)),
        Some(_) => {
            return Err(PdfError::new(
                ErrorKind::InvalidEncryptionDict,
                "/Encrypt is neither a dictionary nor a reference",
            ));
        }
    };

    collection.mark_all_clean();

    Ok(ParsedDocument {
        collection,
        trailer,
        version,
        linearized,
        xref_offset,
        used_xref_streams: map.saw_xref_stream,
        encrypt,
        pending_object_streams,
    })
}

/// Materialise object-stream members; broken containers are skipped with a
/// warning.
pub(crate) fn explode_object_streams(
    collection: &mut ObjectCollection,
    groups: impl Iterator<Item = (u32, Vec<(u32, u32)>)>,
) {
    for (container, members) in groups {
        if let Err(e) = explode_object_stream(collection, container, &members) {
            warn!("skipping broken object stream {container}: {e}");
        }
    }
}

/// Locate `%PDF-M.N` within the first kilobyte.
fn find_header(data: &[u8]) -> Result<((u8, u8), usize)> {
    let window = &data[..data.len().min(HEADER_SCAN_LIMIT)];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            PdfError::new(ErrorKind::InvalidPdf, "no %PDF- header in the first 1024 bytes")
        })?;
    let rest = &data[pos + 5..];
    let major = rest.first().copied().filter(u8::is_ascii_digit);
    let minor = rest.get(2).copied().filter(u8::is_ascii_digit);
    match (major, rest.get(1), minor) {
        (Some(major), Some(b'.'), Some(minor)) => {
            Ok(((major - b'0', minor - b'0'), pos + 8))
        }
        _ => Err(PdfError::new(
            ErrorKind::InvalidPdf,
            "malformed version in %PDF- header",
        )),
    }
}

/// The integer after the last `startxref`, validated by a trailing `%%EOF`.
fn find_startxref(data: &[u8]) -> Result<u64> {
    let lex = Lexer::new(data);
    let pos = lex.find_backward(b"startxref").ok_or_else(|| {
        PdfError::new(ErrorKind::InvalidPdf, "no startxref token")
    })?;
    let mut lex = Lexer::new(data);
    lex.seek(pos);
    lex.expect_keyword(b"startxref")?;
    let offset = lex.read_uint().frame("reading the startxref offset")?;
    if lex.find_forward(lex.pos(), b"%%EOF").is_none() {
        return Err(PdfError::new(
            ErrorKind::InvalidEofToken,
            "no %%EOF marker after startxref",
        ));
    }
    Ok(offset)
}

/// A document is linearised when the first object after the header is a
/// dictionary with `/Linearized`. The hint tables are not trusted; the
/// caller still walks the full xref chain.
fn detect_linearization(data: &[u8], header_end: usize) -> bool {
    let mut lex = Lexer::new(data);
    lex.seek(header_end);
    lex.skip_whitespace();
    let resolver = |_: Reference| None;
    match parse_indirect_at(data, lex.pos(), &resolver) {
        Ok(parsed) => parsed
            .value
            .as_dict()
            .is_some_and(|d| d.has(b"Linearized")),
        Err(_) => false,
    }
}

type LengthResolver<'a> = dyn Fn(Reference) -> Option<i64> + 'a;

/// Resolver for indirect `/Length` values: parses the referenced number
/// object on demand.
fn make_length_resolver<'a>(
    data: &'a [u8],
    entries: &'a BTreeMap<u32, XrefEntry>,
) -> impl Fn(Reference) -> Option<i64> + 'a {
    move |id: Reference| match entries.get(&id.number) {
        Some(XrefEntry::InUse { offset, generation }) if *generation == id.generation => {
            let none = |_: Reference| None;
            let parsed = parse_indirect_at(data, *offset as usize, &none).ok()?;
            parsed.value.as_integer()
        }
        _ => None,
    }
}

/// Parse `n g obj <value> [stream ... endstream] endobj` at a byte offset.
pub(crate) fn parse_indirect_at(
    data: &[u8],
    offset: usize,
    length_resolver: &LengthResolver<'_>,
) -> Result<ParsedIndirect> {
    if offset >= data.len() {
        return Err(PdfError::new(
            ErrorKind::ValueOutOfRange,
            format!("object offset {offset} beyond end of input"),
        ));
    }
    let mut lex = Lexer::new(data);
    lex.seek(offset);
    let number = lex.read_uint().frame("reading object number")?;
    let generation = lex.read_uint().frame("reading generation number")?;
    lex.expect_keyword(b"obj")?;
    let id = Reference::new(
        u32::try_from(number).map_err(|_| {
            PdfError::new(ErrorKind::ValueOutOfRange, "object number exceeds u32")
        })?,
        generation as u16,
    );

    let value = objects::parse_value(&mut lex)
        .frame_with(|| format!("parsing object {id}"))?;

    let mut stream = None;
    if lex.try_keyword(b"stream") {
        // The keyword is followed by CRLF or LF; CR alone is tolerated.
        match lex.peek() {
            Some(b'\r') => {
                lex.bump();
                if lex.peek() == Some(b'\n') {
                    lex.bump();
                }
            }
            Some(b'\n') => {
                lex.bump();
            }
            _ => {}
        }
        let start = lex.pos();

        let declared = match value.as_dict().and_then(|d| d.get(b"Length")) {
            Some(Value::Integer(n)) => Some(*n),
            Some(Value::Reference(r)) => length_resolver(*r),
            _ => None,
        };

        let len = match declared {
            Some(len) if len >= 0 && start + len as usize <= data.len() => {
                let end = start + len as usize;
                let mut check = Lexer::new(data);
                check.seek(end);
                if check.try_keyword(b"endstream") {
                    lex.seek(check.pos());
                    len as usize
                } else {
                    warn!("/Length of object {id} does not reach endstream; rescanning");
                    recover_stream_extent(&mut lex, data, start, id)?
                }
            }
            _ => {
                warn!("object {id} has no usable /Length; scanning for endstream");
                recover_stream_extent(&mut lex, data, start, id)?
            }
        };
        stream = Some((start, len));
    }

    if !lex.try_keyword(b"endobj") {
        warn!("object {id} is not closed by endobj");
    }

    Ok(ParsedIndirect { id, value, stream })
}

/// Find `endstream` by scanning; the extent excludes one trailing EOL.
fn recover_stream_extent(
    lex: &mut Lexer<'_>,
    data: &[u8],
    start: usize,
    id: Reference,
) -> Result<usize> {
    let marker = lex.find_forward(start, b"endstream").ok_or_else(|| {
        PdfError::new(
            ErrorKind::InvalidStream,
            format!("no endstream for object {id}"),
        )
    })?;
    let mut end = marker;
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    lex.seek(marker);
    lex.expect_keyword(b"endstream")?;
    Ok(end - start)
}

/// Pull the members of one object stream into the collection.
fn explode_object_stream(
    collection: &mut ObjectCollection,
    container: u32,
    members: &[(u32, u32)],
) -> Result<()> {
    let container_obj = collection
        .get(Reference::new(container, 0))
        .ok_or_else(|| {
            PdfError::new(
                ErrorKind::ObjectNotFound,
                format!("object stream {container} is missing"),
            )
        })?;
    let dict = container_obj.dict().frame("object stream dictionary")?;
    match dict.get_name(b"Type") {
        Some(name) if *name == "ObjStm" => {}
        _ => {
            return Err(PdfError::new(
                ErrorKind::InvalidStream,
                format!("object {container} is not /Type /ObjStm"),
            ));
        }
    }
    let count = dict.get_integer(b"N").unwrap_or(0);
    let first = dict.get_integer(b"First").ok_or_else(|| {
        PdfError::new(ErrorKind::InvalidStream, "object stream without /First")
    })?;
    if count < 0 || first < 0 {
        return Err(PdfError::new(
            ErrorKind::InvalidStream,
            "negative /N or /First in object stream",
        ));
    }
    let decoded = container_obj
        .decoded_stream()
        .frame_with(|| format!("decoding object stream {container}"))?;

    // Header: N pairs of (object number, relative offset).
    let mut header = Lexer::new(&decoded);
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let number = header.read_uint()? as u32;
        let rel = header.read_uint()? as usize;
        offsets.push((number, rel));
    }

    for &(number, index) in members {
        let Some(&(declared, rel)) = offsets.get(index as usize) else {
            warn!("object stream {container} has no slot {index} for object {number}");
            continue;
        };
        if declared != number {
            warn!(
                "object stream {container} slot {index} holds {declared}, xref expected {number}"
            );
        }
        let pos = first as usize + rel;
        if pos >= decoded.len() {
            warn!("object {declared} offset beyond object stream {container}");
            continue;
        }
        let mut lex = Lexer::new(&decoded);
        lex.seek(pos);
        match objects::parse_value(&mut lex) {
            Ok(value) => {
                collection.insert(Object::parsed(
                    Reference::new(declared, 0),
                    value,
                    None,
                ));
            }
            Err(e) => warn!("object {declared} in stream {container} is unreadable: {e}"),
        }
    }

    collection.remove(Reference::new(container, 0));
    Ok(())
}
