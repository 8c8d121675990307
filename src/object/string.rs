use std::fmt;

use crate::core::WriteMode;

/// Written form of a string object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringFormat {
    #[default]
    Literal,
    Hex,
}

/// A PDF string: raw bytes plus the preferred written form and a flag for
/// UTF-16BE ("Unicode") content.
#[derive(Clone, PartialEq, Default)]
pub struct PdfString {
    bytes: Vec<u8>,
    format: StringFormat,
    unicode: bool,
}

const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

impl PdfString {
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let unicode = bytes.starts_with(&UTF16_BOM);
        PdfString {
            bytes,
            format: StringFormat::Literal,
            unicode,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let unicode = bytes.starts_with(&UTF16_BOM);
        PdfString {
            bytes,
            format: StringFormat::Hex,
            unicode,
        }
    }

    /// Encode text as UTF-16BE with BOM; used for strings that must carry
    /// non-PDFDocEncoding characters.
    pub fn from_unicode(text: &str) -> Self {
        let mut bytes = UTF16_BOM.to_vec();
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        PdfString {
            bytes,
            format: StringFormat::Literal,
            unicode: true,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> StringFormat {
        self.format
    }

    pub fn is_unicode(&self) -> bool {
        self.unicode
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Replace the payload, keeping the written form. Used when strings are
    /// decrypted or encrypted in place.
    pub fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.unicode = bytes.starts_with(&UTF16_BOM);
        self.bytes = bytes;
    }

    /// Decode to text: UTF-16BE when flagged, Latin-1-ish fallback
    /// otherwise.
    pub fn to_text(&self) -> String {
        if self.unicode {
            let units: Vec<u16> = self.bytes[2..]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            self.bytes.iter().map(|&b| b as char).collect()
        }
    }

    pub fn write(&self, out: &mut Vec<u8>, _mode: WriteMode) {
        match self.format {
            StringFormat::Literal => {
                out.push(b'(');
                for &b in &self.bytes {
                    match b {
                        b'(' | b')' | b'\\' => {
                            out.push(b'\\');
                            out.push(b);
                        }
                        0x20..=0x7E => out.push(b),
                        b'\n' => out.extend_from_slice(b"\\n"),
                        b'\r' => out.extend_from_slice(b"\\r"),
                        b'\t' => out.extend_from_slice(b"\\t"),
                        b'\x08' => out.extend_from_slice(b"\\b"),
                        b'\x0c' => out.extend_from_slice(b"\\f"),
                        _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
                    }
                }
                out.push(b')');
            }
            StringFormat::Hex => {
                out.push(b'<');
                for &b in &self.bytes {
                    out.extend_from_slice(format!("{b:02X}").as_bytes());
                }
                out.push(b'>');
            }
        }
    }
}

impl fmt::Debug for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.to_text())
    }
}
