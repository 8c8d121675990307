use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::core::{ErrorKind, PdfError, Result};
use crate::filter::{BufferSink, FilterChain, FilterKind, SharedBuffer};

/// Where a stream's encoded bytes live.
///
/// Parser-deferred streams keep a range into the source document and
/// materialise lazily; the source buffer stays alive for the whole document
/// lifetime anyway because the incremental writer replays it.
#[derive(Debug, Clone)]
pub enum StreamPayload {
    Memory(Vec<u8>),
    Source {
        bytes: Arc<Vec<u8>>,
        offset: usize,
        len: usize,
    },
}

struct AppendSession {
    chain: Option<FilterChain>,
    buffer: SharedBuffer,
}

/// Encoded byte payload of an indirect object's content stream.
///
/// The declared filter chain lives in the owning object's dictionary; the
/// object layer keeps `/Filter` and `/Length` in sync with the sessions
/// driven through here.
pub struct Stream {
    payload: StreamPayload,
    session: Option<AppendSession>,
}

impl Stream {
    pub fn new() -> Self {
        Stream {
            payload: StreamPayload::Memory(Vec::new()),
            session: None,
        }
    }

    pub fn from_raw(bytes: Vec<u8>) -> Self {
        Stream {
            payload: StreamPayload::Memory(bytes),
            session: None,
        }
    }

    pub fn from_source(bytes: Arc<Vec<u8>>, offset: usize, len: usize) -> Self {
        Stream {
            payload: StreamPayload::Source { bytes, offset, len },
            session: None,
        }
    }

    /// The encoded bytes as stored. Materialises nothing; deferred payloads
    /// slice into the retained source buffer.
    pub fn raw_bytes(&self) -> &[u8] {
        match &self.payload {
            StreamPayload::Memory(v) => v,
            StreamPayload::Source { bytes, offset, len } => &bytes[*offset..offset + len],
        }
    }

    /// Length of the encoded payload; this is what `/Length` must equal.
    pub fn encoded_len(&self) -> usize {
        match &self.payload {
            StreamPayload::Memory(v) => v.len(),
            StreamPayload::Source { len, .. } => *len,
        }
    }

    /// Replace the payload with already-encoded bytes, bypassing encoders.
    pub fn set_raw(&mut self, bytes: Vec<u8>) {
        self.payload = StreamPayload::Memory(bytes);
    }

    pub fn is_appending(&self) -> bool {
        self.session.is_some()
    }

    /// Open a write session. Appended bytes run through an encoding chain
    /// for `filters` (empty = store verbatim) into a fresh buffer;
    /// `initial_plain` is re-encoded first when the previous content is
    /// kept.
    pub fn begin_append(
        &mut self,
        filters: &[FilterKind],
        initial_plain: Option<&[u8]>,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                "append session already open",
            ));
        }
        let buffer: SharedBuffer = Rc::new(RefCell::new(Vec::new()));
        let chain = if filters.is_empty() {
            None
        } else {
            Some(FilterChain::encoder(
                filters,
                Box::new(BufferSink::new(buffer.clone())),
            )?)
        };
        let mut session = AppendSession { chain, buffer };
        if let Some(data) = initial_plain {
            Self::session_write(&mut session, data)?;
        }
        self.session = Some(session);
        Ok(())
    }

    fn session_write(session: &mut AppendSession, data: &[u8]) -> Result<()> {
        match &mut session.chain {
            Some(chain) => chain.write(data),
            None => {
                session.buffer.borrow_mut().extend_from_slice(data);
                Ok(())
            }
        }
    }

    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let session = self.session.as_mut().ok_or_else(|| {
            PdfError::new(ErrorKind::InternalLogic, "append without an open session")
        })?;
        Self::session_write(session, data)
    }

    /// Close the session, store the encoded bytes, and return their length.
    pub fn end_append(&mut self) -> Result<usize> {
        let mut session = self.session.take().ok_or_else(|| {
            PdfError::new(ErrorKind::InternalLogic, "no append session to close")
        })?;
        if let Some(chain) = &mut session.chain {
            chain.finish()?;
        }
        let encoded = session.buffer.take();
        let len = encoded.len();
        self.payload = StreamPayload::Memory(encoded);
        Ok(len)
    }
}

impl Default for Stream {
    fn default() -> Self {
        Stream::new()
    }
}

impl Clone for Stream {
    fn clone(&self) -> Self {
        // Open sessions are not cloneable; the payload is.
        Stream {
            payload: self.payload.clone(),
            session: None,
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("encoded_len", &self.encoded_len())
            .field("appending", &self.is_appending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deferred_payload_slices_source() {
        let source = Arc::new(b"....payload....".to_vec());
        let stream = Stream::from_source(source, 4, 7);
        assert_eq!(stream.raw_bytes(), b"payload");
        assert_eq!(stream.encoded_len(), 7);
    }

    #[test]
    fn unfiltered_append_stores_verbatim() {
        let mut stream = Stream::new();
        stream.begin_append(&[], None).unwrap();
        stream.append(b"hello ").unwrap();
        stream.append(b"world").unwrap();
        assert_eq!(stream.end_append().unwrap(), 11);
        assert_eq!(stream.raw_bytes(), b"hello world");
    }

    #[test]
    fn filtered_append_encodes() {
        let mut stream = Stream::new();
        stream.begin_append(&[FilterKind::AsciiHex], None).unwrap();
        stream.append(&[0xAB, 0xCD]).unwrap();
        stream.end_append().unwrap();
        assert_eq!(stream.raw_bytes(), b"ABCD");
    }

    #[test]
    fn kept_content_is_reencoded() {
        let mut stream = Stream::new();
        stream
            .begin_append(&[FilterKind::AsciiHex], Some(b"\x01"))
            .unwrap();
        stream.append(&[0x02]).unwrap();
        stream.end_append().unwrap();
        assert_eq!(stream.raw_bytes(), b"0102");
    }

    #[test]
    fn double_begin_is_a_logic_error() {
        let mut stream = Stream::new();
        stream.begin_append(&[], None).unwrap();
        let err = stream.begin_append(&[], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalLogic);
    }

    #[test]
    fn append_without_session_fails() {
        let mut stream = Stream::new();
        let err = stream.append(b"x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalLogic);
    }
}
