//! LZWDecode. Decode only; variable 9..12-bit codes, 256 = clear table,
//! 257 = end of data. `EarlyChange` (the default) switches code width one
//! code early, as TIFF does.

use weezl::{BitOrder, decode::Decoder};

use crate::core::{ErrorKind, PdfError, Result};
use crate::filter::Sink;
use crate::filter::predictor::{PredictorParams, RowPredictor};
use crate::object::Dictionary;

pub(crate) struct LzwDecoder {
    next: Box<dyn Sink>,
    predictor: Option<RowPredictor>,
    early_change: bool,
    input: Vec<u8>,
}

impl LzwDecoder {
    pub fn new(
        predictor: Option<PredictorParams>,
        parms: Option<&Dictionary>,
        next: Box<dyn Sink>,
    ) -> Self {
        let early_change = parms
            .and_then(|d| d.get_integer(b"EarlyChange"))
            .unwrap_or(1)
            != 0;
        LzwDecoder {
            next,
            predictor: predictor.as_ref().map(RowPredictor::new),
            early_change,
            input: Vec::new(),
        }
    }
}

impl Sink for LzwDecoder {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        // Codes straddle block boundaries, so the input is gathered and
        // decoded in one pass at the end.
        self.input.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let mut decoder = if self.early_change {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Decoder::new(BitOrder::Msb, 8)
        };
        let decoded = decoder
            .decode(&self.input)
            .map_err(|e| PdfError::new(ErrorKind::ValueOutOfRange, e.to_string()))?;
        self.input.clear();
        match &mut self.predictor {
            Some(p) => {
                p.decode(&decoded, &mut *self.next)?;
                p.finish(&mut *self.next)?;
            }
            None => self.next.write(&decoded)?,
        }
        self.next.finish()
    }
}
