use crate::core::{ErrorKind, PdfError, Result, WriteMode};
use crate::filter::{self, FilterChain, FilterKind, Sink};
use crate::object::{Dictionary, Name, Reference, Stream, StringTransform, Value};

/// An indirect object: identity, payload, optional content stream, and a
/// dirty flag consumed by the incremental writer.
///
/// All mutating accessors set the dirty flag; freshly created objects start
/// dirty, parsed objects start clean.
pub struct Object {
    id: Reference,
    value: Value,
    stream: Option<Stream>,
    dirty: bool,
}

impl Object {
    pub fn new(id: Reference, value: Value) -> Self {
        Object {
            id,
            value,
            stream: None,
            dirty: true,
        }
    }

    pub(crate) fn parsed(id: Reference, value: Value, stream: Option<Stream>) -> Self {
        Object {
            id,
            value,
            stream,
            dirty: false,
        }
    }

    pub fn reference(&self) -> Reference {
        self.id
    }

    pub(crate) fn set_reference(&mut self, id: Reference) {
        self.id = id;
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        self.dirty = true;
        &mut self.value
    }

    /// Dictionary payload, or `InvalidDataType`.
    pub fn dict(&self) -> Result<&Dictionary> {
        self.value.as_dict().ok_or_else(|| {
            PdfError::new(
                ErrorKind::InvalidDataType,
                format!("object {} is not a dictionary", self.id),
            )
        })
    }

    pub fn dict_mut(&mut self) -> Result<&mut Dictionary> {
        self.dirty = true;
        let id = self.id;
        self.value.as_dict_mut().ok_or_else(|| {
            PdfError::new(
                ErrorKind::InvalidDataType,
                format!("object {id} is not a dictionary"),
            )
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&Stream> {
        self.stream.as_ref()
    }

    pub fn stream_mut(&mut self) -> Option<&mut Stream> {
        self.dirty = true;
        self.stream.as_mut()
    }

    pub(crate) fn attach_stream(&mut self, stream: Stream) {
        self.stream = Some(stream);
    }

    /// Declared filter chain of the content stream.
    pub fn stream_filters(&self) -> Result<(Vec<FilterKind>, Vec<Option<Dictionary>>)> {
        filter::stream_filters(self.dict()?)
    }

    /// Open a stream write session. The dictionary's `/Filter` entry is
    /// rewritten to match `filters`; `/DecodeParms` is dropped. With
    /// `clear_existing` unset the current content is decoded first and
    /// re-encoded through the new chain.
    pub fn begin_stream_append(
        &mut self,
        filters: &[FilterKind],
        clear_existing: bool,
    ) -> Result<()> {
        let initial = if clear_existing || self.stream.is_none() {
            None
        } else {
            Some(self.decoded_stream()?)
        };

        let dict = self.dict_mut()?;
        match filters {
            [] => {
                dict.remove(b"Filter");
            }
            [single] => dict.set("Filter", Name::from(single.name())),
            many => dict.set(
                "Filter",
                many.iter()
                    .map(|k| Value::Name(Name::from(k.name())))
                    .collect::<Vec<_>>(),
            ),
        }
        dict.remove(b"DecodeParms");

        self.stream
            .get_or_insert_with(Stream::new)
            .begin_append(filters, initial.as_deref())
    }

    pub fn append_stream(&mut self, data: &[u8]) -> Result<()> {
        self.dirty = true;
        self.stream
            .as_mut()
            .ok_or_else(|| {
                PdfError::new(ErrorKind::InternalLogic, "no stream append session")
            })?
            .append(data)
    }

    /// Close the session and restore the `/Length` invariant.
    pub fn end_stream_append(&mut self) -> Result<()> {
        let len = self
            .stream
            .as_mut()
            .ok_or_else(|| {
                PdfError::new(ErrorKind::InternalLogic, "no stream append session")
            })?
            .end_append()?;
        self.dict_mut()?.set("Length", len as i64);
        Ok(())
    }

    /// Replace the stream content in one call, encoded with the default
    /// Flate chain.
    pub fn set_stream_data(&mut self, data: &[u8]) -> Result<()> {
        self.begin_stream_append(&[FilterKind::Flate], true)?;
        self.append_stream(data)?;
        self.end_stream_append()
    }

    /// Install already-encoded bytes without running encoders. The caller
    /// is responsible for a matching `/Filter`; `/Length` is updated here.
    pub fn set_stream_raw(&mut self, data: Vec<u8>) -> Result<()> {
        let len = data.len();
        self.stream.get_or_insert_with(Stream::new).set_raw(data);
        self.dict_mut()?.set("Length", len as i64);
        Ok(())
    }

    /// Decode the content stream into `sink`; unencoded content is copied
    /// verbatim.
    pub fn filtered_copy(&self, sink: Box<dyn Sink>) -> Result<()> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            PdfError::new(ErrorKind::InvalidStream, format!("object {} has no stream", self.id))
        })?;
        let (kinds, parms) = self.stream_filters()?;
        let mut sink = sink;
        if kinds.is_empty() {
            sink.write(stream.raw_bytes())?;
            return sink.finish();
        }
        let mut chain = FilterChain::decoder(&kinds, &parms, sink)?;
        chain.write(stream.raw_bytes())?;
        chain.finish()
    }

    /// Decode the content stream into a buffer.
    pub fn decoded_stream(&self) -> Result<Vec<u8>> {
        let stream = self.stream.as_ref().ok_or_else(|| {
            PdfError::new(ErrorKind::InvalidStream, format!("object {} has no stream", self.id))
        })?;
        let (kinds, parms) = self.stream_filters()?;
        if kinds.is_empty() {
            return Ok(stream.raw_bytes().to_vec());
        }
        filter::decode_to_vec(&kinds, &parms, stream.raw_bytes())
    }

    /// Decode in place and drop the filter keys, leaving plain content.
    pub fn uncompress_stream(&mut self) -> Result<()> {
        let plain = self.decoded_stream()?;
        let len = plain.len();
        self.stream
            .as_mut()
            .expect("checked by decoded_stream")
            .set_raw(plain);
        let dict = self.dict_mut()?;
        dict.remove(b"Filter");
        dict.remove(b"DecodeParms");
        dict.set("Length", len as i64);
        Ok(())
    }

    /// Serialise `n g obj ... endobj`. String and stream payloads pass
    /// through the given transforms (encryption) when present; a transformed
    /// stream gets its `/Length` patched to the on-disk length.
    pub fn write(
        &self,
        out: &mut Vec<u8>,
        mode: WriteMode,
        string_transform: Option<StringTransform<'_>>,
        stream_transform: Option<StringTransform<'_>>,
    ) -> Result<()> {
        if self.stream.as_ref().is_some_and(Stream::is_appending) {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                format!("object {} written with an open append session", self.id),
            ));
        }

        out.extend_from_slice(
            format!("{} {} obj\n", self.id.number, self.id.generation).as_bytes(),
        );

        let stream_bytes = match (&self.stream, stream_transform) {
            (Some(stream), Some(f)) => Some(f(stream.raw_bytes())?),
            (Some(stream), None) => Some(stream.raw_bytes().to_vec()),
            (None, _) => None,
        };

        match &stream_bytes {
            Some(bytes) if self.stream.as_ref().map(Stream::encoded_len) != Some(bytes.len()) => {
                // Encryption changed the on-disk length.
                let mut patched = self.value.clone();
                match patched.as_dict_mut() {
                    Some(dict) => dict.set("Length", bytes.len() as i64),
                    None => {
                        return Err(PdfError::new(
                            ErrorKind::InvalidObject,
                            format!("object {} carries a stream without a dictionary", self.id),
                        ));
                    }
                }
                patched.write_transformed(out, mode, string_transform)?;
            }
            _ => self.value.write_transformed(out, mode, string_transform)?,
        }

        if let Some(bytes) = stream_bytes {
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&bytes);
            out.extend_from_slice(b"\nendstream");
        }
        out.extend_from_slice(b"\nendobj\n");
        Ok(())
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("value", &self.value)
            .field("stream", &self.stream)
            .field("dirty", &self.dirty)
            .finish()
    }
}
