//! PDF object parser.
//!
//! Recursive descent over lexer tokens. Composite objects (arrays,
//! dictionaries, streams) recurse into [`parse_object`]; indirect object
//! definitions (`12 0 obj ... endobj`) are read by [`parse_indirect_object`].

use crate::error::{Error, Result};
use crate::lexer::{Token, skip_ws, token};
use crate::object::{Object, ObjectRef};
use nom::IResult;
use std::collections::HashMap;

fn tag_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Decode the escape sequences of a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` and line continuations.
/// Unknown escapes keep the backslash.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(escaped),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut code = u32::from(escaped - b'0');
                let mut digits = 1;
                while digits < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                    code = code * 8 + u32::from(raw[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                result.push((code & 0xFF) as u8);
            },
            other => {
                result.push(b'\\');
                result.push(other);
            },
        }
    }

    result
}

/// Parse one PDF object.
///
/// `N G R` sequences become [`Object::Reference`]; a dictionary followed by
/// the `stream` keyword becomes [`Object::Stream`].
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(i), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((rest, Object::Integer(i)))
        },
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(decoded) => Ok((rest, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart => parse_array(rest),
        Token::DictStart => {
            let (after_dict, dict) = parse_dictionary(rest)?;
            match token(after_dict) {
                Ok((stream_input, Token::StreamStart)) => {
                    let (after_stream, data) = parse_stream_data(stream_input, &dict)?;
                    Ok((
                        after_stream,
                        Object::Stream {
                            dict,
                            data: bytes::Bytes::from(data),
                        },
                    ))
                },
                _ => Ok((after_dict, Object::Dictionary(dict))),
            }
        },
        _ => Err(tag_error(input)),
    }
}

/// Read stream bytes after the `stream` keyword.
///
/// A direct `/Length` is trusted when `endstream` follows it; otherwise the
/// data runs up to the next `endstream` keyword.
fn parse_stream_data<'a>(
    input: &'a [u8],
    dict: &HashMap<String, Object>,
) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        if let Ok(length) = usize::try_from(length) {
            if length <= input.len() {
                if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                    return Ok((rest, input[..length].to_vec()));
                }
            }
        }
    }

    let keyword = b"endstream";
    let pos = input
        .windows(keyword.len())
        .position(|window| window == keyword)
        .ok_or_else(|| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))?;

    let mut data = &input[..pos];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }

    Ok((&input[pos + keyword.len()..], data.to_vec()))
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        let (after, tok) = token(remaining)?;
        if tok == Token::ArrayEnd {
            return Ok((after, Object::Array(items)));
        }
        let (after, obj) = parse_object(remaining)?;
        items.push(obj);
        remaining = after;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], HashMap<String, Object>> {
    let mut dict = HashMap::new();
    let mut remaining = input;

    loop {
        let (after_key, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((after_key, dict)),
            Token::Name(key) => {
                let (after_value, value) = parse_object(after_key)?;
                // A null value is equivalent to the key being absent.
                if !value.is_null() {
                    dict.insert(key, value);
                }
                remaining = after_value;
            },
            _ => return Err(tag_error(remaining)),
        }
    }
}

/// Parse an indirect object definition `N G obj <object> endobj`.
///
/// A missing `endobj` is tolerated.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id_tok) = token(input)?;
    let (rest, gen_tok) = token(rest)?;
    let (rest, obj_tok) = token(rest)?;

    let obj_ref = match (id_tok, gen_tok, obj_tok) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart) => {
            match (u32::try_from(id), u16::try_from(gen)) {
                (Ok(id), Ok(gen)) => ObjectRef::new(id, gen),
                _ => return Err(tag_error(input)),
            }
        },
        _ => return Err(tag_error(input)),
    };

    let (rest, obj) = parse_object(rest)?;
    match token(rest) {
        Ok((after, Token::ObjEnd)) => Ok((after, (obj_ref, obj))),
        _ => Ok((skip_ws(rest), (obj_ref, obj))),
    }
}

/// Decode hex string content. Whitespace is ignored and an odd final digit is
/// padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    hex::decode(&digits).map_err(|e| Error::MalformedDocument(format!("Invalid hex string: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let (_, obj) = parse_object(b"12 0 R").unwrap();
        assert_eq!(obj, Object::Reference(ObjectRef::new(12, 0)));
    }

    #[test]
    fn test_parse_integer_not_reference() {
        let (rest, obj) = parse_object(b"12 0 obj").unwrap();
        assert_eq!(obj, Object::Integer(12));
        assert_eq!(rest, b" 0 obj");
    }

    #[test]
    fn test_parse_dictionary_with_nested_values() {
        let input = b"<< /Type /Page /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> >>";
        let (_, obj) = parse_object(input).unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").and_then(Object::as_name), Some("Page"));
        assert_eq!(dict.get("MediaBox").and_then(Object::as_array).map(Vec::len), Some(4));
        let font = dict["Resources"].as_dict().unwrap()["Font"].as_dict().unwrap();
        assert_eq!(font["F1"].as_reference(), Some(ObjectRef::new(5, 0)));
    }

    #[test]
    fn test_parse_placeholder_byte_range() {
        let (_, obj) = parse_object(b"[0 /********** /********** /**********]").unwrap();
        let arr = obj.as_array().unwrap();
        assert_eq!(arr[0], Object::Integer(0));
        assert_eq!(arr[1].as_name(), Some("**********"));
    }

    #[test]
    fn test_parse_hex_contents() {
        let (_, obj) = parse_object(b"<3082 01>").unwrap();
        assert_eq!(obj.as_string(), Some(&[0x30, 0x82, 0x01][..]));
    }

    #[test]
    fn test_parse_stream_with_length() {
        let input = b"<< /Length 5 >>\nstream\nHello\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"Hello"),
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_parse_stream_with_indirect_length() {
        let input = b"<< /Length 9 0 R >>\r\nstream\r\nabc\r\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"abc"),
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_parse_indirect_object() {
        let input = b"3 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
        let (_, (obj_ref, obj)) = parse_indirect_object(input).unwrap();
        assert_eq!(obj_ref, ObjectRef::new(3, 0));
        assert_eq!(obj.as_dict().unwrap()["Type"].as_name(), Some("Catalog"));
    }

    #[test]
    fn test_parse_unclosed_array_fails() {
        assert!(parse_object(b"[1 2 3").is_err());
    }

    #[test]
    fn test_null_dictionary_value_dropped() {
        let (_, obj) = parse_object(b"<< /A null /B 1 >>").unwrap();
        let dict = obj.as_dict().unwrap();
        assert!(!dict.contains_key("A"));
        assert!(dict.contains_key("B"));
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(decode_literal_string_escapes(b"a\\(b\\)"), b"a(b)");
        assert_eq!(decode_literal_string_escapes(b"\\247"), vec![0xA7]);
        assert_eq!(decode_literal_string_escapes(b"\\0053"), vec![0x05, b'3']);
        assert_eq!(decode_literal_string_escapes(b"line\\\ncontinued"), b"linecontinued");
        assert_eq!(decode_literal_string_escapes(b"\\q"), b"\\q");
    }

    #[test]
    fn test_decode_hex_odd_length() {
        assert_eq!(decode_hex(b"ABC").unwrap(), vec![0xAB, 0xC0]);
        assert!(decode_hex(b"").unwrap().is_empty());
    }
}
