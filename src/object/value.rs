use std::fmt;

use crate::core::{ErrorKind, PdfError, Result, WriteMode};
use crate::object::{Dictionary, Name, PdfString};

/// Identity of an indirect object: object number and generation number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub number: u32,
    pub generation: u16,
}

impl Reference {
    pub fn new(number: u32, generation: u16) -> Self {
        Reference { number, generation }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Callback applied to string payloads while writing; installed by the
/// writer when a security handler is active.
pub type StringTransform<'a> = &'a mut dyn FnMut(&[u8]) -> Result<Vec<u8>>;

/// The PDF data types.
///
/// Values are plain data: copying is a deep copy, equality is structural.
/// References compare by `(number, generation)` alone and are never
/// dereferenced here.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Name),
    String(PdfString),
    Array(Vec<Value>),
    Dictionary(Dictionary),
    Reference(Reference),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<Reference> {
        match self {
            Value::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Serialise into `out`. Byte-identical across runs for identical input.
    pub fn write(&self, out: &mut Vec<u8>, mode: WriteMode) -> Result<()> {
        self.write_transformed(out, mode, None)
    }

    /// Serialise, routing string payloads through `transform` (encryption).
    pub fn write_transformed(
        &self,
        out: &mut Vec<u8>,
        mode: WriteMode,
        mut transform: Option<StringTransform<'_>>,
    ) -> Result<()> {
        self.write_inner(out, mode, &mut transform)
    }

    fn write_inner(
        &self,
        out: &mut Vec<u8>,
        mode: WriteMode,
        transform: &mut Option<StringTransform<'_>>,
    ) -> Result<()> {
        match self {
            Value::Null => out.extend_from_slice(b"null"),
            Value::Boolean(true) => out.extend_from_slice(b"true"),
            Value::Boolean(false) => out.extend_from_slice(b"false"),
            Value::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Value::Real(r) => write_real(*r, out)?,
            Value::Name(n) => n.write_escaped(out),
            Value::String(s) => match transform {
                Some(f) => {
                    let mut enc = s.clone();
                    enc.set_bytes(f(s.as_bytes())?);
                    enc.write(out, mode);
                }
                None => s.write(out, mode),
            },
            Value::Array(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    match mode {
                        WriteMode::Clean => {
                            if i > 0 {
                                out.push(b'\n');
                            }
                        }
                        WriteMode::Compact => {
                            if i > 0 {
                                out.push(b' ');
                            }
                        }
                    }
                    item.write_inner(out, mode, transform)?;
                }
                out.push(b']');
            }
            Value::Dictionary(dict) => {
                out.extend_from_slice(b"<<");
                for (key, value) in dict.iter() {
                    if mode == WriteMode::Clean {
                        out.push(b'\n');
                    }
                    key.write_escaped(out);
                    out.push(b' ');
                    value.write_inner(out, mode, transform)?;
                }
                if mode == WriteMode::Clean {
                    out.push(b'\n');
                }
                out.extend_from_slice(b">>");
            }
            Value::Reference(r) => out.extend_from_slice(r.to_string().as_bytes()),
        }
        Ok(())
    }
}

/// Decimal formatting for reals: locale-independent `.` separator, six
/// fractional digits preserved, trailing zeros trimmed, never scientific
/// notation.
fn write_real(value: f64, out: &mut Vec<u8>) -> Result<()> {
    if !value.is_finite() {
        return Err(PdfError::new(
            ErrorKind::InvalidNumber,
            "non-finite real cannot be serialised",
        ));
    }
    let mut s = format!("{value:.6}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s == "-0" {
        s.truncate(0);
        s.push('0');
    }
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Name(Name::from(v))
    }
}

impl From<Name> for Value {
    fn from(v: Name) -> Self {
        Value::Name(v)
    }
}

impl From<PdfString> for Value {
    fn from(v: PdfString) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Dictionary> for Value {
    fn from(v: Dictionary) -> Self {
        Value::Dictionary(v)
    }
}

impl From<Reference> for Value {
    fn from(v: Reference) -> Self {
        Value::Reference(v)
    }
}
