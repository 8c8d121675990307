//! ASCIIHexDecode.

use crate::core::{ErrorKind, PdfError, Result, lexer};
use crate::filter::Sink;

pub(crate) struct HexEncoder {
    next: Box<dyn Sink>,
}

impl HexEncoder {
    pub fn new(next: Box<dyn Sink>) -> Self {
        HexEncoder { next }
    }
}

impl Sink for HexEncoder {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(data.len() * 2);
        for &b in data {
            out.extend_from_slice(format!("{b:02X}").as_bytes());
        }
        self.next.write(&out)
    }

    fn finish(&mut self) -> Result<()> {
        self.next.finish()
    }
}

pub(crate) struct HexDecoder {
    next: Box<dyn Sink>,
    high: Option<u8>,
    done: bool,
}

impl HexDecoder {
    pub fn new(next: Box<dyn Sink>) -> Self {
        HexDecoder {
            next,
            high: None,
            done: false,
        }
    }
}

impl Sink for HexDecoder {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(data.len() / 2 + 1);
        for &b in data {
            if self.done {
                break;
            }
            if lexer::is_whitespace(b) {
                continue;
            }
            if b == b'>' {
                self.done = true;
                continue;
            }
            let Some(val) = lexer::hex_value(b) else {
                return Err(PdfError::new(
                    ErrorKind::InvalidEncoding,
                    format!("invalid hex digit 0x{b:02x}"),
                ));
            };
            match self.high.take() {
                None => self.high = Some(val),
                Some(high) => out.push(high << 4 | val),
            }
        }
        self.next.write(&out)
    }

    fn finish(&mut self) -> Result<()> {
        // An odd number of digits pads the final nibble with zero.
        if let Some(high) = self.high.take() {
            self.next.write(&[high << 4])?;
        }
        self.next.finish()
    }
}
