//! FlateDecode via zlib streams, with optional prediction on decode.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use log::error;

use crate::core::{ErrorKind, PdfError, Result};
use crate::filter::Sink;
use crate::filter::predictor::{PredictorParams, RowPredictor};

const CHUNK: usize = 16 * 1024;

pub(crate) struct FlateEncoder {
    next: Box<dyn Sink>,
    z: Compress,
    buf: Vec<u8>,
}

impl FlateEncoder {
    pub fn new(next: Box<dyn Sink>) -> Result<Self> {
        Ok(FlateEncoder {
            next,
            z: Compress::new(Compression::default(), true),
            buf: vec![0; CHUNK],
        })
    }

    fn pump(&mut self, mut input: &[u8], flush: FlushCompress) -> Result<()> {
        loop {
            let before_in = self.z.total_in();
            let before_out = self.z.total_out();
            let status = self
                .z
                .compress(input, &mut self.buf, flush)
                .map_err(|e| PdfError::new(ErrorKind::FlateError, e.to_string()))?;
            let consumed = (self.z.total_in() - before_in) as usize;
            let produced = (self.z.total_out() - before_out) as usize;
            input = &input[consumed..];
            if produced > 0 {
                self.next.write(&self.buf[..produced])?;
            }
            match status {
                Status::StreamEnd => return Ok(()),
                _ if input.is_empty() && produced < self.buf.len() => return Ok(()),
                _ => {}
            }
        }
    }
}

impl Sink for FlateEncoder {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pump(data, FlushCompress::None)
    }

    fn finish(&mut self) -> Result<()> {
        self.pump(&[], FlushCompress::Finish)?;
        self.next.finish()
    }
}

pub(crate) struct FlateDecoder {
    next: Box<dyn Sink>,
    z: Decompress,
    predictor: Option<RowPredictor>,
    buf: Vec<u8>,
    done: bool,
}

impl FlateDecoder {
    pub fn new(predictor: Option<PredictorParams>, next: Box<dyn Sink>) -> Result<Self> {
        Ok(FlateDecoder {
            next,
            z: Decompress::new(true),
            predictor: predictor.as_ref().map(RowPredictor::new),
            buf: vec![0; CHUNK],
            done: false,
        })
    }

    fn deliver(&mut self, produced: usize) -> Result<()> {
        if produced == 0 {
            return Ok(());
        }
        match &mut self.predictor {
            Some(p) => p.decode(&self.buf[..produced], &mut *self.next),
            None => self.next.write(&self.buf[..produced]),
        }
    }
}

impl Sink for FlateDecoder {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.done {
            // Trailing bytes after the zlib stream end; tolerated.
            return Ok(());
        }
        let mut input = data;
        loop {
            let before_in = self.z.total_in();
            let before_out = self.z.total_out();
            let status = self
                .z
                .decompress(input, &mut self.buf, FlushDecompress::None)
                .map_err(|e| {
                    error!("flate decoding error from zlib: {e}");
                    PdfError::new(ErrorKind::FlateError, e.to_string())
                })?;
            let consumed = (self.z.total_in() - before_in) as usize;
            let produced = (self.z.total_out() - before_out) as usize;
            input = &input[consumed..];
            self.deliver(produced)?;
            match status {
                Status::StreamEnd => {
                    self.done = true;
                    return Ok(());
                }
                _ if input.is_empty() && produced < self.buf.len() => return Ok(()),
                Status::BufError if produced == 0 && consumed == 0 => {
                    // Needs more input than this block provides.
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(p) = &mut self.predictor {
            p.finish(&mut *self.next)?;
        }
        self.next.finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::core::ErrorKind;
    use crate::filter::{FilterKind, decode_to_vec, encode_to_vec};
    use crate::object::Dictionary;

    #[test]
    fn zeros_compress_small_and_roundtrip() {
        let data = vec![0u8; 10_000];
        let encoded = encode_to_vec(&[FilterKind::Flate], &data).unwrap();
        assert!(encoded.len() < 100, "encoded {} bytes", encoded.len());
        let decoded = decode_to_vec(&[FilterKind::Flate], &[None], &encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn text_roundtrip_in_small_blocks() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let encoded = encode_to_vec(&[FilterKind::Flate], &data).unwrap();
        let decoded = decode_to_vec(&[FilterKind::Flate], &[None], &encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn garbage_fails_with_flate_error() {
        let err = decode_to_vec(&[FilterKind::Flate], &[None], b"not zlib at all").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FlateError);
    }

    #[test]
    fn flate_with_png_up_predictor() {
        // Pre-predictor rows: tag 2 (Up) rows over 4 columns.
        let raw = [
            2u8, 10, 20, 30, 40, // row 1: 10 20 30 40
            2, 1, 1, 1, 1, // row 2: 11 21 31 41
            2, 2, 2, 2, 2, // row 3: 13 23 33 43
        ];
        let encoded = encode_to_vec(&[FilterKind::Flate], &raw).unwrap();
        let mut parm = Dictionary::new();
        parm.set("Predictor", 12i64);
        parm.set("Columns", 4i64);
        let decoded = decode_to_vec(&[FilterKind::Flate], &[Some(parm)], &encoded).unwrap();
        assert_eq!(
            decoded,
            vec![10, 20, 30, 40, 11, 21, 31, 41, 13, 23, 33, 43]
        );
    }
}
