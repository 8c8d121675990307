//! Byte devices for the writer side.
//!
//! Input is handled as owned byte buffers (documents are read fully into
//! memory before parsing; parser-deferred streams keep ranges into that
//! buffer). Output goes through [`OutputDevice`], which counts written bytes
//! and, for seekable sinks, supports patching at a remembered offset -
//! required by the signing workflow to fill in `/ByteRange` and `/Contents`
//! after the file is complete.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::core::{ErrorContext, ErrorKind, PdfError, Result};

/// Read an input device to its end. Short reads at EOF are fine; any
/// underlying failure surfaces as `IOError`.
pub fn read_device(device: &mut impl Read) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    device
        .read_to_end(&mut buf)
        .map_err(PdfError::from)
        .frame("reading input device")?;
    Ok(buf)
}

/// Buffered, position-tracking output sink.
pub struct OutputDevice<W: Write + Seek> {
    inner: W,
    written: u64,
}

impl<W: Write + Seek> OutputDevice<W> {
    pub fn new(inner: W) -> Self {
        OutputDevice { inner, written: 0 }
    }

    /// Number of bytes written so far; doubles as the current offset for
    /// sequential writes.
    pub fn tell(&self) -> u64 {
        self.written
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).map_err(PdfError::from)?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Overwrite previously written bytes at `offset`, then restore the
    /// append position. The region must lie entirely within what has been
    /// written.
    pub fn overwrite_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset + data.len() as u64 > self.written {
            return Err(PdfError::new(
                ErrorKind::ValueOutOfRange,
                format!(
                    "overwrite of {} bytes at {offset} exceeds {} written",
                    data.len(),
                    self.written
                ),
            ));
        }
        self.inner.seek(SeekFrom::Start(offset)).map_err(PdfError::from)?;
        self.inner.write_all(data).map_err(PdfError::from)?;
        self.inner
            .seek(SeekFrom::Start(self.written))
            .map_err(PdfError::from)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(PdfError::from)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
