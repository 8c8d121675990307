//! The object grammar: values, strings, names, numbers, references.

use crate::core::lexer::{self, Lexer};
use crate::core::{ErrorKind, PdfError, Result};
use crate::object::{Dictionary, Name, PdfString, Reference, Value};

/// Recursion limit for nested arrays and dictionaries.
const MAX_DEPTH: usize = 256;

pub fn parse_value(lex: &mut Lexer<'_>) -> Result<Value> {
    parse_value_at_depth(lex, 0)
}

fn parse_value_at_depth(lex: &mut Lexer<'_>, depth: usize) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(PdfError::new(
            ErrorKind::MaxRecursionReached,
            "object nesting exceeds the recursion limit",
        ));
    }
    lex.skip_whitespace();
    let Some(b) = lex.peek() else {
        return Err(PdfError::new(
            ErrorKind::UnexpectedEof,
            "end of input where an object was expected",
        ));
    };
    match b {
        b'/' => {
            lex.bump();
            let raw = lex.read_token();
            Ok(Value::Name(Name::from_escaped(raw)?))
        }
        b'(' => Ok(Value::String(parse_literal_string(lex)?)),
        b'<' => {
            if lex.peek_at(1) == Some(b'<') {
                parse_dictionary(lex, depth)
            } else {
                Ok(Value::String(parse_hex_string(lex)?))
            }
        }
        b'[' => {
            lex.bump();
            let mut items = Vec::new();
            loop {
                lex.skip_whitespace();
                match lex.peek() {
                    Some(b']') => {
                        lex.bump();
                        return Ok(Value::Array(items));
                    }
                    Some(_) => items.push(parse_value_at_depth(lex, depth + 1)?),
                    None => {
                        return Err(PdfError::new(
                            ErrorKind::UnexpectedEof,
                            "unterminated array",
                        ));
                    }
                }
            }
        }
        b'0'..=b'9' | b'+' | b'-' | b'.' => parse_number_or_reference(lex),
        _ => {
            let token = lex.read_token();
            match token {
                b"true" => Ok(Value::Boolean(true)),
                b"false" => Ok(Value::Boolean(false)),
                b"null" => Ok(Value::Null),
                _ => Err(PdfError::new(
                    ErrorKind::InvalidObject,
                    format!(
                        "unexpected token `{}` at offset {}",
                        String::from_utf8_lossy(token),
                        lex.pos()
                    ),
                )),
            }
        }
    }
}

fn parse_dictionary(lex: &mut Lexer<'_>, depth: usize) -> Result<Value> {
    lex.bump();
    lex.bump();
    let mut dict = Dictionary::new();
    loop {
        lex.skip_whitespace();
        match lex.peek() {
            Some(b'>') => {
                if lex.peek_at(1) != Some(b'>') {
                    return Err(PdfError::new(
                        ErrorKind::InvalidObject,
                        "single `>` inside a dictionary",
                    ));
                }
                lex.bump();
                lex.bump();
                return Ok(Value::Dictionary(dict));
            }
            Some(b'/') => {
                lex.bump();
                let key = Name::from_escaped(lex.read_token())?;
                let value = parse_value_at_depth(lex, depth + 1)?;
                dict.set(key, value);
            }
            Some(b) => {
                return Err(PdfError::new(
                    ErrorKind::InvalidKey,
                    format!("dictionary key must be a name, found 0x{b:02x}"),
                ));
            }
            None => {
                return Err(PdfError::new(
                    ErrorKind::UnexpectedEof,
                    "unterminated dictionary",
                ));
            }
        }
    }
}

fn parse_number_or_reference(lex: &mut Lexer<'_>) -> Result<Value> {
    lex.skip_whitespace();
    let start = lex.pos();
    let token = lex.read_token();
    let number = parse_number(token, start)?;

    // `n g R` lookahead; both numbers must be non-negative integers.
    if let Value::Integer(n) = number {
        if n >= 0 && n <= i64::from(u32::MAX) {
            let save = lex.pos();
            lex.skip_whitespace();
            let gen_token = lex.read_token();
            if !gen_token.is_empty() && gen_token.iter().all(u8::is_ascii_digit) {
                if let Ok(g) = std::str::from_utf8(gen_token).unwrap_or("x").parse::<u16>() {
                    lex.skip_whitespace();
                    if lex.read_token() == b"R" {
                        return Ok(Value::Reference(Reference::new(n as u32, g)));
                    }
                }
            }
            lex.seek(save);
        }
    }
    Ok(number)
}

fn parse_number(token: &[u8], offset: usize) -> Result<Value> {
    if token.is_empty() {
        return Err(PdfError::new(
            ErrorKind::InvalidNumber,
            format!("empty number token at offset {offset}"),
        ));
    }
    let text = std::str::from_utf8(token).map_err(|_| {
        PdfError::new(
            ErrorKind::InvalidNumber,
            format!("non-ASCII number token at offset {offset}"),
        )
    })?;
    if text.contains('.') {
        // `4.`, `.5` and `-.5` are all valid reals.
        let normalised = if text.ends_with('.') {
            format!("{text}0")
        } else if text.starts_with('.') {
            format!("0{text}")
        } else if text.starts_with("-.") {
            format!("-0{}", &text[1..])
        } else if text.starts_with("+.") {
            format!("0{}", &text[1..])
        } else {
            text.to_owned()
        };
        normalised.trim_start_matches('+').parse::<f64>().map(Value::Real).map_err(|_| {
            PdfError::new(
                ErrorKind::InvalidNumber,
                format!("malformed real `{text}` at offset {offset}"),
            )
        })
    } else {
        text.trim_start_matches('+').parse::<i64>().map(Value::Integer).map_err(|_| {
            PdfError::new(
                ErrorKind::InvalidNumber,
                format!("malformed integer `{text}` at offset {offset}"),
            )
        })
    }
}

fn parse_literal_string(lex: &mut Lexer<'_>) -> Result<PdfString> {
    lex.bump();
    let mut bytes = Vec::new();
    let mut depth = 1usize;
    loop {
        let Some(b) = lex.bump() else {
            return Err(PdfError::new(
                ErrorKind::UnexpectedEof,
                "unterminated literal string",
            ));
        };
        match b {
            b'(' => {
                depth += 1;
                bytes.push(b);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(PdfString::literal(bytes));
                }
                bytes.push(b);
            }
            b'\\' => {
                let Some(e) = lex.bump() else {
                    return Err(PdfError::new(
                        ErrorKind::UnexpectedEof,
                        "escape at end of input",
                    ));
                };
                match e {
                    b'n' => bytes.push(b'\n'),
                    b'r' => bytes.push(b'\r'),
                    b't' => bytes.push(b'\t'),
                    b'b' => bytes.push(0x08),
                    b'f' => bytes.push(0x0C),
                    b'(' | b')' | b'\\' => bytes.push(e),
                    b'0'..=b'7' => {
                        let mut value = u16::from(e - b'0');
                        for _ in 0..2 {
                            match lex.peek() {
                                Some(d @ b'0'..=b'7') => {
                                    lex.bump();
                                    value = value * 8 + u16::from(d - b'0');
                                }
                                _ => break,
                            }
                        }
                        bytes.push((value & 0xFF) as u8);
                    }
                    // Line continuation: backslash before EOL drops the EOL.
                    b'\r' => {
                        if lex.peek() == Some(b'\n') {
                            lex.bump();
                        }
                    }
                    b'\n' => {}
                    other => bytes.push(other),
                }
            }
            // EOL inside a string reads as a single newline.
            b'\r' => {
                if lex.peek() == Some(b'\n') {
                    lex.bump();
                }
                bytes.push(b'\n');
            }
            other => bytes.push(other),
        }
    }
}

fn parse_hex_string(lex: &mut Lexer<'_>) -> Result<PdfString> {
    lex.bump();
    let mut bytes = Vec::new();
    let mut high: Option<u8> = None;
    loop {
        let Some(b) = lex.bump() else {
            return Err(PdfError::new(
                ErrorKind::UnexpectedEof,
                "unterminated hex string",
            ));
        };
        if b == b'>' {
            if let Some(h) = high {
                bytes.push(h << 4);
            }
            return Ok(PdfString::hex(bytes));
        }
        if lexer::is_whitespace(b) {
            continue;
        }
        let Some(val) = lexer::hex_value(b) else {
            return Err(PdfError::new(
                ErrorKind::InvalidEncoding,
                format!("invalid hex digit 0x{b:02x} in string"),
            ));
        };
        match high.take() {
            None => high = Some(val),
            Some(h) => bytes.push(h << 4 | val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::StringFormat;

    fn parse(data: &[u8]) -> Value {
        parse_value(&mut Lexer::new(data)).unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(parse(b"null"), Value::Null);
        assert_eq!(parse(b"true"), Value::Boolean(true));
        assert_eq!(parse(b" -42 "), Value::Integer(-42));
        assert_eq!(parse(b"+17"), Value::Integer(17));
        assert_eq!(parse(b"3.14"), Value::Real(3.14));
        assert_eq!(parse(b"4."), Value::Real(4.0));
        assert_eq!(parse(b"-.5"), Value::Real(-0.5));
        assert_eq!(parse(b"/Name"), Value::Name(Name::from("Name")));
        assert_eq!(parse(b"/A#20B"), Value::Name(Name::from("A B")));
    }

    #[test]
    fn references_need_the_full_triple() {
        assert_eq!(parse(b"12 0 R"), Value::Reference(Reference::new(12, 0)));
        assert_eq!(parse(b"12 0 RG"), Value::Integer(12));
        assert_eq!(parse(b"12 x R"), Value::Integer(12));
        // Array context: `[1 2 R 3]` binds the reference greedily.
        let arr = parse(b"[1 2 R 3]");
        assert_eq!(
            arr.as_array().unwrap(),
            &[
                Value::Reference(Reference::new(1, 2)),
                Value::Integer(3),
            ]
        );
    }

    #[test]
    fn literal_strings() {
        assert_eq!(
            parse(b"(simple)").as_string().unwrap().as_bytes(),
            b"simple"
        );
        assert_eq!(
            parse(b"(bal(anc)ed)").as_string().unwrap().as_bytes(),
            b"bal(anc)ed"
        );
        assert_eq!(
            parse(br"(esc\(aped\) \\ \n)").as_string().unwrap().as_bytes(),
            b"esc(aped) \\ \n"
        );
        assert_eq!(
            parse(b"(oct\\101l)").as_string().unwrap().as_bytes(),
            b"octAl"
        );
        assert_eq!(parse(b"(\\0053)").as_string().unwrap().as_bytes(), b"\x053");
        // Overflowing octal wraps to one byte.
        assert_eq!(parse(b"(\\777)").as_string().unwrap().as_bytes(), b"\xff");
    }

    #[test]
    fn line_handling_in_strings() {
        assert_eq!(
            parse(b"(a\r\nb)").as_string().unwrap().as_bytes(),
            b"a\nb"
        );
        assert_eq!(
            parse(b"(split\\\r\nline)").as_string().unwrap().as_bytes(),
            b"splitline"
        );
    }

    #[test]
    fn hex_strings() {
        let s = parse(b"<901FA>");
        let s = s.as_string().unwrap();
        assert_eq!(s.as_bytes(), &[0x90, 0x1F, 0xA0]);
        assert_eq!(s.format(), StringFormat::Hex);
        assert_eq!(
            parse(b"<48 65 6C 6C 6F>").as_string().unwrap().as_bytes(),
            b"Hello"
        );
    }

    #[test]
    fn containers() {
        let v = parse(b"[1 (two) /Three <<\n/Four 4\n>>]");
        let items = v.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[3].as_dict().unwrap().get_integer(b"Four"), Some(4));

        let v = parse(b"<</Kids [1 0 R 2 0 R] /Count 2>>");
        let dict = v.as_dict().unwrap();
        assert_eq!(dict.get_array(b"Kids").unwrap().len(), 2);
        assert_eq!(dict.get_integer(b"Count"), Some(2));
    }

    #[test]
    fn comments_are_whitespace() {
        assert_eq!(parse(b"% note\n 7"), Value::Integer(7));
        let v = parse(b"[1 % inline\n 2]");
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn recursion_is_bounded() {
        let mut data = vec![b'['; 4000];
        data.push(b'1');
        data.extend(std::iter::repeat_n(b']', 4000));
        let err = parse_value(&mut Lexer::new(&data)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaxRecursionReached);
    }

    #[test]
    fn errors() {
        let err = parse_value(&mut Lexer::new(b"(open")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
        let err = parse_value(&mut Lexer::new(b"<<1 2>>")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
        let err = parse_value(&mut Lexer::new(b"<4G>")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
        let err = parse_value(&mut Lexer::new(b"wat")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidObject);
    }
}
