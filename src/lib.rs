//! # pdfkern
//!
//! PDF object graph and serialisation pipeline: the typed object model with
//! its cross-reference machinery, composable stream filters, the standard
//! security handlers, and a byte-stable writer with incremental updates and
//! signature-region reservation.
//!
//! Documents are held fully typed in memory; stream payloads stay encoded
//! until asked for. Incremental saves reproduce the original file as a
//! strict byte prefix and append only changed objects, which is what keeps
//! existing signatures valid.
//!
//! ## Quick Start
//!
//! ```rust
//! use pdfkern::core::EngineConfig;
//! use pdfkern::document::Document;
//! use pdfkern::filter::FilterKind;
//!
//! let mut doc = Document::new(EngineConfig::default());
//! doc.set_info_entry("Title", "Hello").unwrap();
//!
//! let content = doc.create_object(None);
//! let obj = doc.get_object_mut(content).unwrap();
//! obj.begin_stream_append(&[FilterKind::Flate], true).unwrap();
//! obj.append_stream(b"BT /F1 12 Tf (Hello) Tj ET").unwrap();
//! obj.end_stream_append().unwrap();
//!
//! let mut out = pdfkern::core::OutputDevice::new(std::io::Cursor::new(Vec::new()));
//! doc.save_to(&mut out).unwrap();
//! let bytes = out.into_inner().into_inner();
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `aes256` | AES-256 (V5/R5) security handler per Adobe Extension Level 3 |

pub mod core;
pub mod document;
pub mod encrypt;
pub mod filter;
pub mod object;
pub mod parser;
pub mod writer;

pub use crate::core::{EngineConfig, ErrorKind, PdfError, Result, WriteMode};
pub use crate::document::Document;
pub use crate::object::{Dictionary, Name, Object, PdfString, Reference, Value};
