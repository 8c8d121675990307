//! Streaming encode/decode filter pipeline.
//!
//! Filters are composable sinks: each stage transforms the bytes written to
//! it and forwards them to the next stage. Encoding chains apply the last
//! declared filter first so that the first `/Filter` entry is the first one
//! applied when decoding, as the file format requires. Decoding chains
//! consume on-disk bytes at the first declared filter and emit plain bytes
//! from the last.

mod ascii85;
mod asciihex;
mod flate;
mod lzw;
mod predictor;
mod rle;

pub use predictor::PredictorParams;

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::{ErrorKind, PdfError, Result};
use crate::object::{Dictionary, Value};

/// Byte sink; the composition unit of the pipeline.
///
/// `finish` flushes buffered state into the next stage and closes it. After
/// `finish` or a failed `write` the sink must not be written again.
pub trait Sink {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Shared growable buffer used as the final stage of in-memory pipelines.
pub type SharedBuffer = Rc<RefCell<Vec<u8>>>;

pub(crate) struct BufferSink {
    buf: SharedBuffer,
}

impl BufferSink {
    pub fn new(buf: SharedBuffer) -> Self {
        BufferSink { buf }
    }
}

impl Sink for BufferSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Identity stage for filters the core treats as opaque containers.
struct PassthroughSink {
    next: Box<dyn Sink>,
}

impl Sink for PassthroughSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.next.write(data)
    }

    fn finish(&mut self) -> Result<()> {
        self.next.finish()
    }
}

/// The filters understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    AsciiHex,
    Ascii85,
    Lzw,
    Flate,
    RunLength,
    CcittFax,
    Jbig2,
    Dct,
    Jpx,
    Crypt,
}

impl FilterKind {
    /// Resolve a filter name. Short aliases are only accepted when
    /// `allow_short` is set (inline-image context).
    pub fn from_name(name: &[u8], allow_short: bool) -> Result<Self> {
        let kind = match name {
            b"ASCIIHexDecode" => Some(FilterKind::AsciiHex),
            b"ASCII85Decode" => Some(FilterKind::Ascii85),
            b"LZWDecode" => Some(FilterKind::Lzw),
            b"FlateDecode" => Some(FilterKind::Flate),
            b"RunLengthDecode" => Some(FilterKind::RunLength),
            b"CCITTFaxDecode" => Some(FilterKind::CcittFax),
            b"JBIG2Decode" => Some(FilterKind::Jbig2),
            b"DCTDecode" => Some(FilterKind::Dct),
            b"JPXDecode" => Some(FilterKind::Jpx),
            b"Crypt" => Some(FilterKind::Crypt),
            _ => None,
        };
        let kind = match (kind, allow_short) {
            (Some(kind), _) => Some(kind),
            (None, true) => match name {
                b"AHx" => Some(FilterKind::AsciiHex),
                b"A85" => Some(FilterKind::Ascii85),
                b"LZW" => Some(FilterKind::Lzw),
                b"Fl" => Some(FilterKind::Flate),
                b"RL" => Some(FilterKind::RunLength),
                b"CCF" => Some(FilterKind::CcittFax),
                b"DCT" => Some(FilterKind::Dct),
                _ => None,
            },
            (None, false) => None,
        };
        kind.ok_or_else(|| {
            PdfError::new(
                ErrorKind::UnsupportedFilter,
                format!("unknown filter /{}", String::from_utf8_lossy(name)),
            )
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::AsciiHex => "ASCIIHexDecode",
            FilterKind::Ascii85 => "ASCII85Decode",
            FilterKind::Lzw => "LZWDecode",
            FilterKind::Flate => "FlateDecode",
            FilterKind::RunLength => "RunLengthDecode",
            FilterKind::CcittFax => "CCITTFaxDecode",
            FilterKind::Jbig2 => "JBIG2Decode",
            FilterKind::Dct => "DCTDecode",
            FilterKind::Jpx => "JPXDecode",
            FilterKind::Crypt => "Crypt",
        }
    }

    pub fn can_encode(self) -> bool {
        matches!(
            self,
            FilterKind::AsciiHex | FilterKind::Ascii85 | FilterKind::Flate
        )
    }

    /// Filters whose payload passes through undecoded (delegated to image
    /// codecs or the security layer).
    pub fn is_opaque(self) -> bool {
        matches!(
            self,
            FilterKind::CcittFax
                | FilterKind::Jbig2
                | FilterKind::Dct
                | FilterKind::Jpx
                | FilterKind::Crypt
        )
    }

    fn encoder(self, next: Box<dyn Sink>) -> Result<Box<dyn Sink>> {
        if !self.can_encode() {
            return Err(PdfError::new(
                ErrorKind::UnsupportedFilter,
                format!("{} has no encoder", self.name()),
            ));
        }
        Ok(match self {
            FilterKind::AsciiHex => Box::new(asciihex::HexEncoder::new(next)),
            FilterKind::Ascii85 => Box::new(ascii85::Ascii85Encoder::new(next)),
            FilterKind::Flate => Box::new(flate::FlateEncoder::new(next)?),
            _ => unreachable!(),
        })
    }

    fn decoder(
        self,
        parms: Option<&Dictionary>,
        next: Box<dyn Sink>,
    ) -> Result<Box<dyn Sink>> {
        let predictor = PredictorParams::from_parms(parms)?;
        Ok(match self {
            FilterKind::AsciiHex => Box::new(asciihex::HexDecoder::new(next)),
            FilterKind::Ascii85 => Box::new(ascii85::Ascii85Decoder::new(next)),
            FilterKind::Flate => Box::new(flate::FlateDecoder::new(predictor, next)?),
            FilterKind::Lzw => {
                Box::new(lzw::LzwDecoder::new(predictor, parms, next))
            }
            FilterKind::RunLength => Box::new(rle::RleDecoder::new(next)),
            _ => Box::new(PassthroughSink { next }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Active,
    Finished,
    Failed,
}

/// An assembled pipeline with fail-and-reject semantics: after any stage
/// fails, the chain refuses further input until rebuilt.
pub struct FilterChain {
    stage: Box<dyn Sink>,
    state: ChainState,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FilterChain {
    /// Build an encoding chain; bytes written come out of `sink` encoded so
    /// that decoding applies `kinds` in declared order.
    pub fn encoder(kinds: &[FilterKind], sink: Box<dyn Sink>) -> Result<Self> {
        if kinds.is_empty() {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                "cannot build an encode chain from an empty filter list",
            ));
        }
        let mut stage = sink;
        for kind in kinds {
            stage = kind.encoder(stage)?;
        }
        Ok(FilterChain {
            stage,
            state: ChainState::Active,
        })
    }

    /// Build a decoding chain over on-disk bytes. `parms` is aligned with
    /// `kinds`; missing entries mean no parameters.
    pub fn decoder(
        kinds: &[FilterKind],
        parms: &[Option<Dictionary>],
        sink: Box<dyn Sink>,
    ) -> Result<Self> {
        if kinds.is_empty() {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                "cannot build a decode chain from an empty filter list",
            ));
        }
        let mut stage = sink;
        for (i, kind) in kinds.iter().enumerate().rev() {
            let parm = parms.get(i).and_then(Option::as_ref);
            stage = kind.decoder(parm, stage)?;
        }
        Ok(FilterChain {
            stage,
            state: ChainState::Active,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.state != ChainState::Active {
            return Err(PdfError::new(
                ErrorKind::InternalLogic,
                "write into a closed filter chain",
            ));
        }
        self.stage.write(data).inspect_err(|_| {
            self.state = ChainState::Failed;
        })
    }

    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            ChainState::Finished => Ok(()),
            ChainState::Failed => Err(PdfError::new(
                ErrorKind::InternalLogic,
                "finish on a failed filter chain",
            )),
            ChainState::Active => {
                self.state = ChainState::Finished;
                self.stage.finish().inspect_err(|_| {
                    self.state = ChainState::Failed;
                })
            }
        }
    }
}

/// Encode a whole buffer through `kinds`.
pub fn encode_to_vec(kinds: &[FilterKind], data: &[u8]) -> Result<Vec<u8>> {
    let buf: SharedBuffer = Rc::new(RefCell::new(Vec::new()));
    let mut chain = FilterChain::encoder(kinds, Box::new(BufferSink::new(buf.clone())))?;
    chain.write(data)?;
    chain.finish()?;
    drop(chain);
    Ok(Rc::try_unwrap(buf).map_or_else(|rc| rc.borrow().clone(), RefCell::into_inner))
}

/// Decode a whole buffer through `kinds` with aligned parameters.
pub fn decode_to_vec(
    kinds: &[FilterKind],
    parms: &[Option<Dictionary>],
    data: &[u8],
) -> Result<Vec<u8>> {
    let buf: SharedBuffer = Rc::new(RefCell::new(Vec::new()));
    let mut chain = FilterChain::decoder(kinds, parms, Box::new(BufferSink::new(buf.clone())))?;
    chain.write(data)?;
    chain.finish()?;
    drop(chain);
    Ok(Rc::try_unwrap(buf).map_or_else(|rc| rc.borrow().clone(), RefCell::into_inner))
}

/// Extract the declared filter chain and aligned decode parameters from a
/// stream dictionary.
///
/// `/Filter` may be a single name or an array of names; `/DecodeParms` may
/// be a single dictionary (applied to the sole filter) or an array of the
/// same length as the filter array. Anything else is `InvalidStream`.
pub fn stream_filters(dict: &Dictionary) -> Result<(Vec<FilterKind>, Vec<Option<Dictionary>>)> {
    let kinds = match dict.get(b"Filter") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Name(name)) => vec![FilterKind::from_name(name.as_bytes(), false)?],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Name(name) => FilterKind::from_name(name.as_bytes(), false),
                _ => Err(PdfError::new(
                    ErrorKind::InvalidStream,
                    "non-name entry in /Filter array",
                )),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(PdfError::new(
                ErrorKind::InvalidStream,
                "/Filter must be a name or an array of names",
            ));
        }
    };

    let parms = match dict.get(b"DecodeParms").or_else(|| dict.get(b"DP")) {
        None | Some(Value::Null) => vec![None; kinds.len()],
        Some(Value::Dictionary(d)) => {
            if kinds.len() != 1 {
                return Err(PdfError::new(
                    ErrorKind::InvalidStream,
                    "single /DecodeParms dictionary with multiple filters",
                ));
            }
            vec![Some(d.clone())]
        }
        Some(Value::Array(items)) => {
            if items.len() != kinds.len() {
                return Err(PdfError::new(
                    ErrorKind::InvalidStream,
                    "/DecodeParms array length differs from /Filter",
                ));
            }
            items
                .iter()
                .map(|item| match item {
                    Value::Dictionary(d) => Ok(Some(d.clone())),
                    Value::Null => Ok(None),
                    _ => Err(PdfError::new(
                        ErrorKind::InvalidStream,
                        "non-dictionary entry in /DecodeParms array",
                    )),
                })
                .collect::<Result<Vec<_>>>()?
        }
        Some(_) => {
            return Err(PdfError::new(
                ErrorKind::InvalidStream,
                "/DecodeParms must be a dictionary or array",
            ));
        }
    };

    Ok((kinds, parms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_names_resolve() {
        assert_eq!(
            FilterKind::from_name(b"FlateDecode", false).unwrap(),
            FilterKind::Flate
        );
        assert_eq!(
            FilterKind::from_name(b"AHx", true).unwrap(),
            FilterKind::AsciiHex
        );
        let err = FilterKind::from_name(b"AHx", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
        let err = FilterKind::from_name(b"NoSuchFilter", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn decode_only_filters_reject_encoding() {
        let err = encode_to_vec(&[FilterKind::RunLength], b"xx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
        let err = encode_to_vec(&[FilterKind::Lzw], b"xx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn chained_encode_decode_roundtrip() {
        let kinds = [FilterKind::Ascii85, FilterKind::AsciiHex];
        let data = b"chained filter pipeline".to_vec();
        let encoded = encode_to_vec(&kinds, &data).unwrap();
        let decoded = decode_to_vec(&kinds, &[None, None], &encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn opaque_filters_pass_through() {
        let data = b"\xff\xd8\xff\xe0jpeg-ish".to_vec();
        let decoded = decode_to_vec(&[FilterKind::Dct], &[None], &data).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_chain_is_a_logic_error() {
        let buf: SharedBuffer = Rc::new(RefCell::new(Vec::new()));
        let err = FilterChain::encoder(&[], Box::new(BufferSink::new(buf))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalLogic);
    }

    #[test]
    fn failed_chain_rejects_further_input() {
        let buf: SharedBuffer = Rc::new(RefCell::new(Vec::new()));
        let mut chain = FilterChain::decoder(
            &[FilterKind::Ascii85],
            &[None],
            Box::new(BufferSink::new(buf)),
        )
        .unwrap();
        assert!(chain.write(b"\x01\x02").is_err());
        let err = chain.write(b"more").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalLogic);
    }

    #[test]
    fn stream_filter_extraction() {
        let mut dict = Dictionary::new();
        dict.set("Filter", "FlateDecode");
        let (kinds, parms) = stream_filters(&dict).unwrap();
        assert_eq!(kinds, vec![FilterKind::Flate]);
        assert_eq!(parms.len(), 1);

        let mut dict = Dictionary::new();
        dict.set(
            "Filter",
            vec![Value::from("ASCII85Decode"), Value::from("FlateDecode")],
        );
        let mut parm = Dictionary::new();
        parm.set("Predictor", 12i64);
        dict.set("DecodeParms", vec![Value::Null, Value::Dictionary(parm)]);
        let (kinds, parms) = stream_filters(&dict).unwrap();
        assert_eq!(kinds, vec![FilterKind::Ascii85, FilterKind::Flate]);
        assert!(parms[0].is_none());
        assert!(parms[1].is_some());
    }

    #[test]
    fn mismatched_parms_length_fails() {
        let mut dict = Dictionary::new();
        dict.set("Filter", vec![Value::from("FlateDecode")]);
        dict.set("DecodeParms", vec![Value::Null, Value::Null]);
        let err = stream_filters(&dict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStream);
    }
}
