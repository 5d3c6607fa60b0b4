//! PDF lexer (tokenizer).
//!
//! Splits PDF bytes into the tokens the object parser needs: numbers, literal
//! and hex strings, names, keywords and delimiters. Whitespace (space, \t, \r,
//! \n, \0, \f) and `%` comments between tokens are skipped.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::{delimited, preceded},
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -.5)
    Real(f64),
    /// Raw literal string content, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw hex string content, whitespace preserved
    HexString(&'a [u8]),
    /// Name without the leading slash, `#xx` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in `10 0 R`
    R,
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any run of whitespace and comments.
pub fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        let (rest, _) = match take_while::<_, _, nom::error::Error<&[u8]>>(is_whitespace)(remaining) {
            Ok(r) => r,
            Err(_) => return remaining,
        };
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) => return remaining,
        }
    }
}

fn number_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

/// Parse an integer or real number (`42`, `-3`, `.5`, `5.`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let start = input;
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(number_error(start));
    }

    let negative = sign == Some('-');
    match frac_part {
        Some(frac) => {
            let int_str = int_part
                .map(std::str::from_utf8)
                .transpose()
                .map_err(|_| number_error(start))?
                .unwrap_or("0");
            let frac_str = frac
                .map(std::str::from_utf8)
                .transpose()
                .map_err(|_| number_error(start))?
                .unwrap_or("0");
            let magnitude: f64 = format!("{}.{}", int_str, frac_str)
                .parse()
                .map_err(|_| number_error(start))?;
            Ok((input, Token::Real(if negative { -magnitude } else { magnitude })))
        },
        None => {
            let digits = int_part.ok_or_else(|| number_error(start))?;
            let magnitude: i64 = std::str::from_utf8(digits)
                .map_err(|_| number_error(start))?
                .parse()
                .map_err(|_| number_error(start))?;
            Ok((input, Token::Integer(if negative { -magnitude } else { magnitude })))
        },
    }
}

/// Parse a literal string with balanced parentheses and backslash escapes.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

/// Parse a hex string `<...>`. Must not be called on `<<`.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#xx` escape sequences in a name. Invalid sequences are kept as is.
pub fn decode_name_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| !is_whitespace(c) && !is_delimiter(c)),
            |raw: &[u8]| Token::Name(decode_name_escapes(&String::from_utf8_lossy(raw))),
        ),
    )(input)
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse a single token, skipping leading whitespace and comments.
///
/// Keywords are tried before names and numbers, and `<<` before `<`.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((parse_keyword, parse_name, parse_number, parse_literal_string, parse_hex_string))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"+7"), Ok((&b""[..], Token::Integer(7))));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
        assert_eq!(token(b"-.002"), Ok((&b""[..], Token::Real(-0.002))));
    }

    #[test]
    fn test_parse_literal_string_nested() {
        let result = token(b"(Hello (nested) World) rest");
        assert_eq!(result, Ok((&b" rest"[..], Token::LiteralString(b"Hello (nested) World"))));
    }

    #[test]
    fn test_parse_literal_string_escaped_paren() {
        let result = token(b"(Open \\( Close \\))");
        assert_eq!(result, Ok((&b""[..], Token::LiteralString(b"Open \\( Close \\)"))));
    }

    #[test]
    fn test_parse_unbalanced_literal_string() {
        assert!(token(b"(never closed").is_err());
    }

    #[test]
    fn test_parse_hex_string() {
        assert_eq!(token(b"<48 65>"), Ok((&b""[..], Token::HexString(b"48 65"))));
        assert_eq!(token(b"<>"), Ok((&b""[..], Token::HexString(b""))));
    }

    #[test]
    fn test_parse_dict_delimiters() {
        assert_eq!(token(b"<< /A 1 >>"), Ok((&b" /A 1 >>"[..], Token::DictStart)));
        assert_eq!(token(b">>"), Ok((&b""[..], Token::DictEnd)));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(token(b"/ByteRange"), Ok((&b""[..], Token::Name("ByteRange".to_string()))));
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
    }

    #[test]
    fn test_parse_star_name() {
        let result = token(b"/********** /");
        assert_eq!(result, Ok((&b" /"[..], Token::Name("**********".to_string()))));
    }

    #[test]
    fn test_decode_name_escapes_invalid_kept() {
        assert_eq!(decode_name_escapes("A#"), "A#");
        assert_eq!(decode_name_escapes("A#zz"), "A#zz");
        assert_eq!(decode_name_escapes("A#23C"), "A#C");
    }

    #[test]
    fn test_skip_comments_and_whitespace() {
        let result = token(b"  % a comment\r\n  obj");
        assert_eq!(result, Ok((&b""[..], Token::ObjStart)));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(token(b"endobj"), Ok((&b""[..], Token::ObjEnd)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::StreamEnd)));
        assert_eq!(token(b"R"), Ok((&b""[..], Token::R)));
        assert_eq!(token(b"null"), Ok((&b""[..], Token::Null)));
    }
}
