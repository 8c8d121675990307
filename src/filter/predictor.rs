//! TIFF and PNG predictors applied to the output of Flate and LZW decoding.

use crate::core::{ErrorKind, PdfError, Result};
use crate::filter::Sink;
use crate::object::Dictionary;

/// Decode parameters relevant to prediction, with the defaults the format
/// prescribes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: bool,
}

impl PredictorParams {
    /// Extract prediction parameters from a `/DecodeParms` dictionary.
    /// `None` when no prediction is requested. Only 8 bits per component is
    /// supported; other depths and unknown predictor values fail with
    /// `InvalidPredictor`.
    pub fn from_parms(parms: Option<&Dictionary>) -> Result<Option<Self>> {
        let Some(dict) = parms else { return Ok(None) };
        let predictor = dict.get_integer(b"Predictor").unwrap_or(1);
        if predictor <= 1 {
            return Ok(None);
        }
        if !matches!(predictor, 2 | 10..=14) {
            return Err(PdfError::new(
                ErrorKind::InvalidPredictor,
                format!("predictor {predictor} is not supported"),
            ));
        }
        let colors = dict.get_integer(b"Colors").unwrap_or(1);
        let bits_per_component = dict.get_integer(b"BitsPerComponent").unwrap_or(8);
        let columns = dict.get_integer(b"Columns").unwrap_or(1);
        if bits_per_component != 8 {
            return Err(PdfError::new(
                ErrorKind::InvalidPredictor,
                format!("{bits_per_component} bits per component is not supported"),
            ));
        }
        if colors < 1 || columns < 1 {
            return Err(PdfError::new(
                ErrorKind::InvalidPredictor,
                "Colors and Columns must be positive",
            ));
        }
        Ok(Some(PredictorParams {
            predictor,
            colors: colors as usize,
            bits_per_component: 8,
            columns: columns as usize,
            early_change: dict.get_integer(b"EarlyChange").unwrap_or(1) != 0,
        }))
    }

    fn bytes_per_pixel(&self) -> usize {
        self.colors * self.bits_per_component / 8
    }

    fn row_length(&self) -> usize {
        self.columns * self.colors * self.bits_per_component / 8
    }
}

fn paeth(left: u8, up: u8, upper_left: u8) -> u8 {
    let (a, b, c) = (i32::from(left), i32::from(up), i32::from(upper_left));
    let p = a + b - c;
    let (pa, pb, pc) = ((p - a).abs(), (p - b).abs(), (p - c).abs());
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        upper_left
    }
}

/// Incremental row reconstructor. For PNG predictors every row is preceded
/// by a tag byte selecting that row's filter; TIFF rows carry no tag.
pub(crate) struct RowPredictor {
    tiff: bool,
    bpp: usize,
    row_len: usize,
    tag: u8,
    awaiting_tag: bool,
    current: Vec<u8>,
    previous: Vec<u8>,
}

impl RowPredictor {
    pub fn new(params: &PredictorParams) -> Self {
        let tiff = params.predictor == 2;
        RowPredictor {
            tiff,
            bpp: params.bytes_per_pixel(),
            row_len: params.row_length(),
            tag: 0,
            awaiting_tag: !tiff,
            current: Vec::with_capacity(params.row_length()),
            previous: vec![0; params.row_length()],
        }
    }

    pub fn decode(&mut self, data: &[u8], next: &mut dyn Sink) -> Result<()> {
        for &b in data {
            if self.awaiting_tag {
                if b > 4 {
                    return Err(PdfError::new(
                        ErrorKind::InvalidPredictor,
                        format!("invalid row filter tag {b}"),
                    ));
                }
                self.tag = b;
                self.awaiting_tag = false;
                continue;
            }

            let i = self.current.len();
            let left = if i >= self.bpp {
                self.current[i - self.bpp]
            } else {
                0
            };
            let reconstructed = if self.tiff {
                b.wrapping_add(left)
            } else {
                let up = self.previous[i];
                let upper_left = if i >= self.bpp {
                    self.previous[i - self.bpp]
                } else {
                    0
                };
                match self.tag {
                    0 => b,
                    1 => b.wrapping_add(left),
                    2 => b.wrapping_add(up),
                    3 => b.wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                    4 => b.wrapping_add(paeth(left, up, upper_left)),
                    _ => unreachable!(),
                }
            };
            self.current.push(reconstructed);

            if self.current.len() == self.row_len {
                next.write(&self.current)?;
                std::mem::swap(&mut self.previous, &mut self.current);
                self.current.clear();
                self.awaiting_tag = !self.tiff;
            }
        }
        Ok(())
    }

    /// Flush a trailing partial row; its bytes are already reconstructed.
    pub fn finish(&mut self, next: &mut dyn Sink) -> Result<()> {
        if !self.current.is_empty() {
            next.write(&self.current)?;
            self.current.clear();
        }
        Ok(())
    }
}
