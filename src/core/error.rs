use std::panic::Location;

use thiserror::Error;

/// Stable error codes surfaced by every fallible operation.
///
/// The string form returned by [`ErrorKind::name`] is the stable,
/// version-independent identifier; the enum variants follow Rust naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidHandle,
    FileNotFound,
    IoError,
    UnexpectedEof,
    OutOfMemory,
    ValueOutOfRange,
    InternalLogic,
    InvalidEnumValue,
    ObjectNotFound,
    MaxRecursionReached,
    BrokenFile,
    InvalidPdf,
    InvalidXRef,
    InvalidTrailer,
    InvalidNumber,
    InvalidEncoding,
    InvalidObject,
    InvalidEofToken,
    InvalidDataType,
    InvalidXRefStream,
    InvalidPredictor,
    InvalidStream,
    InvalidKey,
    InvalidName,
    InvalidEncryptionDict,
    InvalidPassword,
    InvalidFontData,
    InvalidContentStream,
    InvalidInput,
    UnsupportedFilter,
    FlateError,
}

impl ErrorKind {
    /// The stable identifier for this code.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::IoError => "IOError",
            ErrorKind::UnexpectedEof => "UnexpectedEOF",
            ErrorKind::OutOfMemory => "OutOfMemory",
            ErrorKind::ValueOutOfRange => "ValueOutOfRange",
            ErrorKind::InternalLogic => "InternalLogic",
            ErrorKind::InvalidEnumValue => "InvalidEnumValue",
            ErrorKind::ObjectNotFound => "ObjectNotFound",
            ErrorKind::MaxRecursionReached => "MaxRecursionReached",
            ErrorKind::BrokenFile => "BrokenFile",
            ErrorKind::InvalidPdf => "InvalidPDF",
            ErrorKind::InvalidXRef => "InvalidXRef",
            ErrorKind::InvalidTrailer => "InvalidTrailer",
            ErrorKind::InvalidNumber => "InvalidNumber",
            ErrorKind::InvalidEncoding => "InvalidEncoding",
            ErrorKind::InvalidObject => "InvalidObject",
            ErrorKind::InvalidEofToken => "InvalidEOFToken",
            ErrorKind::InvalidDataType => "InvalidDataType",
            ErrorKind::InvalidXRefStream => "InvalidXRefStream",
            ErrorKind::InvalidPredictor => "InvalidPredictor",
            ErrorKind::InvalidStream => "InvalidStream",
            ErrorKind::InvalidKey => "InvalidKey",
            ErrorKind::InvalidName => "InvalidName",
            ErrorKind::InvalidEncryptionDict => "InvalidEncryptionDict",
            ErrorKind::InvalidPassword => "InvalidPassword",
            ErrorKind::InvalidFontData => "InvalidFontData",
            ErrorKind::InvalidContentStream => "InvalidContentStream",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::UnsupportedFilter => "UnsupportedFilter",
            ErrorKind::FlateError => "FlateError",
        }
    }
}

/// One entry of the propagation callstack carried by [`PdfError`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub file: &'static str,
    pub line: u32,
    pub info: String,
}

/// Error type carrying the stable code, a short message, the location the
/// error was raised at, and the callstack appended while propagating.
#[derive(Debug, Error)]
#[error("{}: {message} ({file}:{line})", kind.name())]
pub struct PdfError {
    kind: ErrorKind,
    message: String,
    file: &'static str,
    line: u32,
    stack: Vec<Frame>,
}

impl PdfError {
    /// Raise a new error. The raising location is captured from the caller.
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let loc = Location::caller();
        PdfError {
            kind,
            message: message.into(),
            file: loc.file(),
            line: loc.line(),
            stack: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Location the error was originally raised at.
    pub fn origin(&self) -> (&'static str, u32) {
        (self.file, self.line)
    }

    /// Callstack frames, oldest first.
    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    /// Append a propagation frame; used by intermediate layers.
    #[track_caller]
    pub fn push_frame(mut self, info: impl Into<String>) -> Self {
        let loc = Location::caller();
        self.stack.push(Frame {
            file: loc.file(),
            line: loc.line(),
            info: info.into(),
        });
        self
    }
}

impl From<std::io::Error> for PdfError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::UnexpectedEof => ErrorKind::UnexpectedEof,
            _ => ErrorKind::IoError,
        };
        PdfError::new(kind, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;

/// Extension trait appending callstack frames while propagating errors.
pub trait ErrorContext<T> {
    fn frame(self, info: &str) -> Result<T>;
    fn frame_with(self, info: impl FnOnce() -> String) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    #[track_caller]
    fn frame(self, info: &str) -> Result<T> {
        self.map_err(|e| e.push_frame(info))
    }

    #[track_caller]
    fn frame_with(self, info: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| e.push_frame(info()))
    }
}
