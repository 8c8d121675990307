//! Serialisation of whole documents: the full writer, the incremental
//! writer, classic xref emission, and the signature beacon used by signing
//! workflows.
//!
//! The writer moves through `Idle -> Header -> Body -> Xref -> Done`; the
//! orchestration functions [`write_full`] and [`write_incremental`] drive
//! those transitions. Incremental output replays the source bytes verbatim
//! and appends only dirty objects plus an xref section whose `/Prev` links
//! back to the previous `startxref`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{Seek, Write};

use crate::core::{
    CancelToken, ErrorContext, ErrorKind, OutputDevice, PdfError, Result, WriteMode,
};
use crate::encrypt::SecurityHandler;
use crate::object::{Dictionary, Object, ObjectCollection, Reference, Value};

/// Four binary bytes after the version line mark the file as binary.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Fixed width used for `/ByteRange` integers so the array can be patched
/// in place after the file length is known.
const BYTE_RANGE_DIGITS: usize = 10;

/// Everything the writer needs besides the device.
pub struct WriteContext<'a> {
    pub collection: &'a ObjectCollection,
    pub trailer: &'a Dictionary,
    pub version: (u8, u8),
    pub mode: WriteMode,
    pub encrypt: Option<EncryptContext<'a>>,
    pub cancel: Option<&'a CancelToken>,
}

/// Active security handler plus the reference of the `/Encrypt` dictionary
/// object, which itself stays unencrypted.
pub struct EncryptContext<'a> {
    pub handler: &'a mut dyn SecurityHandler,
    pub encrypt_ref: Option<Reference>,
}

/// Request to reserve a detached-signature region while writing.
pub struct SignatureRequest {
    /// The signature dictionary object; its `/Contents` and `/ByteRange`
    /// entries are replaced by placeholders.
    pub object: Reference,
    /// Capacity of the `/Contents` reservation in bytes.
    pub capacity: usize,
}

/// The reserved signature region of a finished file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBeacon {
    /// `[0 n1 n2 n3]`: the two signed ranges around `/Contents`.
    pub byte_range: [i64; 4],
    /// Offset of the `<` opening the `/Contents` reservation.
    pub contents_offset: u64,
    /// Offset of the `[` opening the `/ByteRange` array.
    pub byte_range_offset: u64,
    /// Reserved capacity in bytes (the hex region holds twice as many).
    pub capacity: usize,
    /// Total file length at `%%EOF`.
    pub file_len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Header,
    Body,
    Xref,
    Done,
}

struct DocumentWriter<'a, 'd, W: Write + Seek> {
    device: &'d mut OutputDevice<W>,
    ctx: WriteContext<'a>,
    state: WriterState,
    offsets: BTreeMap<u32, (u64, u16)>,
    beacon: Option<PendingBeacon>,
}

struct PendingBeacon {
    request: SignatureRequest,
    contents_offset: Option<u64>,
    byte_range_offset: Option<u64>,
}

/// Write a complete document.
pub fn write_full<W: Write + Seek>(
    ctx: WriteContext<'_>,
    device: &mut OutputDevice<W>,
) -> Result<()> {
    check_references(ctx.collection, false)?;
    let mut writer = DocumentWriter::new(ctx, device, None);
    writer.begin()?;
    writer.write_body(false)?;
    let xref_offset = writer.write_xref(false)?;
    writer.finish(xref_offset, None)?;
    Ok(())
}

/// Append an incremental update after a verbatim replay of `source`.
/// Returns the signature beacon when one was requested.
pub fn write_incremental<W: Write + Seek>(
    ctx: WriteContext<'_>,
    source: &[u8],
    prev_startxref: u64,
    signature: Option<SignatureRequest>,
    device: &mut OutputDevice<W>,
) -> Result<Option<SignatureBeacon>> {
    check_references(ctx.collection, true)?;
    if ctx.collection.dirty_objects().next().is_none() && signature.is_none() {
        return Err(PdfError::new(
            ErrorKind::InvalidInput,
            "incremental save with no dirty objects",
        ));
    }
    let mut writer = DocumentWriter::new(ctx, device, signature);
    writer.replay(source)?;
    writer.write_body(true)?;
    let xref_offset = writer.write_xref(true)?;
    writer.finish(xref_offset, Some(prev_startxref))?;
    writer.settle_beacon()
}

impl<'a, 'd, W: Write + Seek> DocumentWriter<'a, 'd, W> {
    fn new(
        ctx: WriteContext<'a>,
        device: &'d mut OutputDevice<W>,
        signature: Option<SignatureRequest>,
    ) -> Self {
        DocumentWriter {
            device,
            ctx,
            state: WriterState::Idle,
            offsets: BTreeMap::new(),
            beacon: signature.map(|request| PendingBeacon {
                request,
                contents_offset: None,
                byte_range_offset: None,
            }),
        }
    }

    fn transition(&mut self, from: WriterState, to: WriterState) -> Result<()> {
        if self.state != from {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                format!("writer is in state {:?}, expected {from:?}", self.state),
            ));
        }
        self.state = to;
        Ok(())
    }

    fn poll_cancel(&self) -> Result<()> {
        if self.ctx.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(PdfError::new(ErrorKind::InvalidInput, "write cancelled"));
        }
        Ok(())
    }

    /// Header state: `%PDF-M.N` plus the binary comment line.
    fn begin(&mut self) -> Result<()> {
        self.transition(WriterState::Idle, WriterState::Header)?;
        let (major, minor) = self.ctx.version;
        self.device
            .write_all(format!("%PDF-{major}.{minor}\n").as_bytes())?;
        self.device.write_all(BINARY_MARKER)?;
        self.state = WriterState::Body;
        Ok(())
    }

    /// Replay the existing file for an incremental update. The result must
    /// be a strict byte-prefix of the new file, so the bytes go through
    /// untouched; a lone missing trailing newline is added after.
    fn replay(&mut self, source: &[u8]) -> Result<()> {
        self.transition(WriterState::Idle, WriterState::Body)?;
        self.device.write_all(source)?;
        if source.last() != Some(&b'\n') {
            self.device.write_all(b"\n")?;
        }
        Ok(())
    }

    fn write_body(&mut self, dirty_only: bool) -> Result<()> {
        if self.state != WriterState::Body {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                format!("writer is in state {:?}, expected Body", self.state),
            ));
        }
        let collection = self.ctx.collection;
        let objects: Vec<&Object> = if dirty_only {
            collection.dirty_objects().collect()
        } else {
            collection.iter().collect()
        };
        for object in objects {
            self.poll_cancel()?;
            self.write_object(object)?;
        }
        Ok(())
    }

    fn write_object(&mut self, object: &Object) -> Result<()> {
        let id = object.reference();
        self.offsets.insert(id.number, (self.device.tell(), id.generation));

        if self
            .beacon
            .as_ref()
            .is_some_and(|b| b.request.object == id)
        {
            return self.write_signature_object(object);
        }

        let plaintext = match &self.ctx.encrypt {
            Some(enc) => Some(id) == enc.encrypt_ref || is_exempt(object, &*enc.handler),
            None => true,
        };
        let mut buf = Vec::new();
        if plaintext {
            object.write(&mut buf, self.ctx.mode, None, None)?;
        } else {
            let enc = self.ctx.encrypt.as_mut().expect("checked above");
            let handler = RefCell::new(&mut *enc.handler);
            let mut strings = |plain: &[u8]| handler.borrow_mut().encrypt(id, plain);
            let mut streams = |plain: &[u8]| handler.borrow_mut().encrypt(id, plain);
            object.write(&mut buf, self.ctx.mode, Some(&mut strings), Some(&mut streams))?;
        }
        self.device.write_all(&buf)
    }

    /// The signature dictionary is emitted key by key so the `/Contents`
    /// and `/ByteRange` placeholders land at recorded offsets. Signature
    /// objects are written unencrypted; the signed ranges must be readable
    /// before decryption.
    fn write_signature_object(&mut self, object: &Object) -> Result<()> {
        let id = object.reference();
        let dict = object.dict().frame("signature object payload")?;
        let capacity = self
            .beacon
            .as_ref()
            .map(|b| b.request.capacity)
            .expect("checked by caller");

        self.device
            .write_all(format!("{} {} obj\n<<", id.number, id.generation).as_bytes())?;
        for (key, value) in dict.iter() {
            let mut piece = Vec::new();
            key.write_escaped(&mut piece);
            piece.push(b' ');
            self.device.write_all(&piece)?;

            if key == &"Contents" {
                let offset = self.device.tell();
                self.beacon.as_mut().expect("present").contents_offset = Some(offset);
                let mut reservation = Vec::with_capacity(2 * capacity + 2);
                reservation.push(b'<');
                reservation.resize(2 * capacity + 1, b'0');
                reservation.push(b'>');
                self.device.write_all(&reservation)?;
            } else if key == &"ByteRange" {
                let offset = self.device.tell();
                self.beacon.as_mut().expect("present").byte_range_offset = Some(offset);
                self.device.write_all(&byte_range_placeholder([0, 0, 0, 0]))?;
            } else {
                let mut piece = Vec::new();
                value.write(&mut piece, self.ctx.mode)?;
                self.device.write_all(&piece)?;
            }
        }
        self.device.write_all(b">>\nendobj\n")
    }

    /// Emit the classic xref section; returns its byte offset.
    fn write_xref(&mut self, incremental: bool) -> Result<u64> {
        self.transition(WriterState::Body, WriterState::Xref)?;
        let xref_offset = self.device.tell();
        self.device.write_all(b"xref\n")?;

        // Row map: offsets of written objects, plus the free list (full
        // writes only; an update leaves previous free entries alone).
        let mut rows: BTreeMap<u32, (u64, u16, bool)> = self
            .offsets
            .iter()
            .map(|(&n, &(offset, generation))| (n, (offset, generation, true)))
            .collect();
        if !incremental {
            let free_numbers: Vec<u32> = self
                .ctx
                .collection
                .free_slots()
                .map(|(n, _)| n)
                .collect();
            for (i, (number, generation)) in self.ctx.collection.free_slots().enumerate() {
                let next = free_numbers.get(i + 1).copied().unwrap_or(0);
                rows.insert(number, (u64::from(next), generation, false));
            }
            let head_next = free_numbers.first().copied().unwrap_or(0);
            rows.insert(0, (u64::from(head_next), u16::MAX, false));
        }

        // Contiguous runs become subsections.
        let numbers: Vec<u32> = rows.keys().copied().collect();
        let mut start = 0usize;
        while start < numbers.len() {
            let mut end = start + 1;
            while end < numbers.len() && numbers[end] == numbers[end - 1] + 1 {
                end += 1;
            }
            self.device.write_all(
                format!("{} {}\n", numbers[start], end - start).as_bytes(),
            )?;
            for &number in &numbers[start..end] {
                let (offset, generation, in_use) = rows[&number];
                let kind = if in_use { 'n' } else { 'f' };
                self.device.write_all(
                    format!("{offset:010} {generation:05} {kind} \n").as_bytes(),
                )?;
            }
            start = end;
        }
        Ok(xref_offset)
    }

    fn finish(&mut self, xref_offset: u64, prev: Option<u64>) -> Result<()> {
        self.transition(WriterState::Xref, WriterState::Done)?;

        let mut trailer = self.ctx.trailer.clone();
        trailer.set("Size", i64::from(self.size_entry()));
        match prev {
            Some(prev) => trailer.set("Prev", prev as i64),
            None => {
                trailer.remove(b"Prev");
            }
        }
        trailer.remove(b"XRefStm");
        if let Some(enc) = &self.ctx.encrypt {
            if let Some(r) = enc.encrypt_ref {
                trailer.set("Encrypt", Value::Reference(r));
            }
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(b"trailer\n");
        Value::Dictionary(trailer).write(&mut buf, self.ctx.mode)?;
        buf.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
        self.device.write_all(&buf)
    }

    fn size_entry(&self) -> u32 {
        let written_max = self.offsets.keys().next_back().copied().unwrap_or(0);
        let known_max = self.ctx.collection.max_number();
        let size_hint = self.ctx.trailer.get_integer(b"Size").unwrap_or(0).max(0) as u32;
        (written_max.max(known_max) + 1).max(size_hint)
    }

    /// Patch `/ByteRange` now that the file length is known and hand the
    /// beacon to the caller.
    fn settle_beacon(mut self) -> Result<Option<SignatureBeacon>> {
        let Some(pending) = self.beacon.take() else {
            return Ok(None);
        };
        let contents_offset = pending.contents_offset.ok_or_else(|| {
            PdfError::new(
                ErrorKind::InternalLogic,
                "signature object has no /Contents entry",
            )
        })?;
        let byte_range_offset = pending.byte_range_offset.ok_or_else(|| {
            PdfError::new(
                ErrorKind::InternalLogic,
                "signature object has no /ByteRange entry",
            )
        })?;
        let file_len = self.device.tell();
        let contents_end = contents_offset + 2 * pending.request.capacity as u64 + 2;
        let byte_range = [
            0,
            contents_offset as i64,
            contents_end as i64,
            (file_len - contents_end) as i64,
        ];
        self.device
            .overwrite_at(byte_range_offset, &byte_range_placeholder(byte_range))?;
        Ok(Some(SignatureBeacon {
            byte_range,
            contents_offset,
            byte_range_offset,
            capacity: pending.request.capacity,
            file_len,
        }))
    }
}

fn byte_range_placeholder(values: [i64; 4]) -> Vec<u8> {
    format!(
        "[{:0w$} {:0w$} {:0w$} {:0w$}]",
        values[0],
        values[1],
        values[2],
        values[3],
        w = BYTE_RANGE_DIGITS,
    )
    .into_bytes()
}

/// Fill the `/Contents` reservation with the DER signature, hex-encoded and
/// zero-padded to the reserved capacity.
pub fn apply_signature<W: Write + Seek>(
    device: &mut OutputDevice<W>,
    beacon: &SignatureBeacon,
    der: &[u8],
) -> Result<()> {
    if der.len() > beacon.capacity {
        return Err(PdfError::new(
            ErrorKind::ValueOutOfRange,
            format!(
                "signature of {} bytes exceeds the reserved {}",
                der.len(),
                beacon.capacity
            ),
        ));
    }
    let mut hex = String::with_capacity(2 * beacon.capacity);
    for b in der {
        hex.push_str(&format!("{b:02X}"));
    }
    hex.extend(std::iter::repeat_n('0', 2 * beacon.capacity - hex.len()));
    device.overwrite_at(beacon.contents_offset + 1, hex.as_bytes())
}

/// Metadata streams stay plaintext when the handler says so.
fn is_exempt(object: &Object, handler: &dyn SecurityHandler) -> bool {
    if handler.encrypt_metadata() {
        return false;
    }
    object
        .value()
        .as_dict()
        .and_then(|d| d.get_name(b"Type"))
        .is_some_and(|n| *n == "Metadata")
}

/// Every reference emitted must resolve to a live object or to a free slot
/// whose next generation is one above the reference's.
fn check_references(collection: &ObjectCollection, dirty_only: bool) -> Result<()> {
    let free: BTreeMap<u32, u16> = collection.free_slots().collect();
    let check = |id: Reference| -> Result<()> {
        if collection.get(id).is_some() {
            return Ok(());
        }
        if id
            .generation
            .checked_add(1)
            .is_some_and(|g| free.get(&id.number) == Some(&g))
        {
            return Ok(());
        }
        Err(PdfError::new(
            ErrorKind::InternalLogic,
            format!("reference {id} has no target in the collection"),
        ))
    };
    let objects: Box<dyn Iterator<Item = &Object>> = if dirty_only {
        Box::new(collection.dirty_objects())
    } else {
        Box::new(collection.iter())
    };
    for object in objects {
        walk_references(object.value(), &check)
            .frame_with(|| format!("validating references of object {}", object.reference()))?;
    }
    Ok(())
}

fn walk_references(value: &Value, check: &dyn Fn(Reference) -> Result<()>) -> Result<()> {
    match value {
        Value::Reference(id) => check(*id),
        Value::Array(items) => items.iter().try_for_each(|v| walk_references(v, check)),
        Value::Dictionary(dict) => dict
            .iter()
            .try_for_each(|(_, v)| walk_references(v, check)),
        _ => Ok(()),
    }
}
