//! PDF object parser.
//!
//! Combines lexer tokens into objects by recursive descent. Indirect objects
//! (`N G obj ... endobj`) and streams are handled here too; the reader
//! decides what to do with failures depending on strict or tolerant mode.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

/// Default maximum nesting of arrays and dictionaries.
pub const MAX_NESTING: usize = 100;

type ParseError<'a> = nom::Err<nom::error::Error<&'a [u8]>>;

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> ParseError<'_> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Decode escape sequences in a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` and line continuations.
/// Unknown escapes drop the backslash.
///
/// ```
/// # use pdf_seal::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 71"), b"Section \xa7 71");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c != b'\\' || i + 1 == raw.len() {
            // A bare CR or CRLF inside a literal string reads as LF
            if c == b'\r' {
                out.push(b'\n');
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            } else {
                out.push(c);
            }
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'(' | b')' | b'\\' => out.push(next),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = (next - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                        },
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            },
            other => out.push(other),
        }
    }

    out
}

/// Decode a hex string body to bytes; whitespace is ignored and an odd
/// trailing digit is padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    digits
        .chunks(2)
        .map(|pair| {
            let hi = hex_value(pair[0])?;
            let lo = match pair.get(1) {
                Some(&c) => hex_value(c)?,
                None => 0,
            };
            Ok(hi << 4 | lo)
        })
        .collect()
}

fn hex_value(c: u8) -> Result<u8> {
    (c as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| Error::ParseError {
            offset: 0,
            reason: format!("Invalid hex digit '{}'", c as char),
        })
}

/// Resolver for indirect `/Length` values of streams.
pub type LengthResolver<'r> = &'r dyn Fn(ObjectRef) -> Option<usize>;

/// Recursive-descent parser with a nesting bound and an optional
/// indirect-length resolver.
#[derive(Clone, Copy)]
pub struct ObjectParser<'r> {
    max_nesting: usize,
    lengths: Option<LengthResolver<'r>>,
}

impl Default for ObjectParser<'_> {
    fn default() -> Self {
        Self {
            max_nesting: MAX_NESTING,
            lengths: None,
        }
    }
}

impl std::fmt::Debug for ObjectParser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectParser")
            .field("max_nesting", &self.max_nesting)
            .field("resolves_lengths", &self.lengths.is_some())
            .finish()
    }
}

/// An `N G obj ... endobj` construct.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObjectSyntax {
    /// Identity from the object header
    pub reference: ObjectRef,
    /// Parsed value
    pub object: Object,
    /// False when the closing `endobj` was missing
    pub terminated: bool,
}

impl<'r> ObjectParser<'r> {
    /// Parser with the given nesting bound.
    pub fn new(max_nesting: usize) -> Self {
        Self {
            max_nesting,
            lengths: None,
        }
    }

    /// Use `lengths` for streams whose `/Length` is an indirect reference.
    pub fn with_lengths(mut self, lengths: LengthResolver<'r>) -> Self {
        self.lengths = Some(lengths);
        self
    }

    /// Parse one direct object.
    pub fn parse<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], Object> {
        self.parse_at_depth(input, 0)
    }

    /// Parse `N G obj <object> endobj`.
    pub fn parse_indirect<'a>(&self, input: &'a [u8]) -> IResult<&'a [u8], IndirectObjectSyntax> {
        let (rest, id) = match token(input)? {
            (rest, Token::Integer(n)) if n >= 0 => (rest, n),
            _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
        };
        let (rest, gen) = match token(rest)? {
            (rest, Token::Integer(g)) if (0..=u16::MAX as i64).contains(&g) => (rest, g),
            _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
        };
        let (rest, _) = match token(rest)? {
            (rest, Token::ObjStart) => (rest, ()),
            _ => return Err(fail(input, nom::error::ErrorKind::Tag)),
        };

        let (rest, object) = self.parse(rest)?;
        let (rest, terminated) = match token(rest) {
            Ok((after, Token::ObjEnd)) => (after, true),
            _ => (rest, false),
        };

        Ok((
            rest,
            IndirectObjectSyntax {
                reference: ObjectRef::new(id as u32, gen as u16),
                object,
                terminated,
            },
        ))
    }

    fn parse_at_depth<'a>(&self, input: &'a [u8], depth: usize) -> IResult<&'a [u8], Object> {
        if depth > self.max_nesting {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::TooLarge,
            )));
        }

        let (rest, tok) = token(input)?;
        match tok {
            Token::Null => Ok((rest, Object::Null)),
            Token::True => Ok((rest, Object::Boolean(true))),
            Token::False => Ok((rest, Object::Boolean(false))),
            Token::Integer(i) => {
                // `id gen R` lookahead
                if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                    if let Ok((after_r, Token::R)) = token(after_gen) {
                        if i >= 0 && (0..=u16::MAX as i64).contains(&gen) {
                            return Ok((
                                after_r,
                                Object::Reference(ObjectRef::new(i as u32, gen as u16)),
                            ));
                        }
                    }
                }
                Ok((rest, Object::Integer(i)))
            },
            Token::Real(r) => Ok((rest, Object::Real(r))),
            Token::LiteralString(raw) => {
                Ok((rest, Object::String(decode_literal_string_escapes(raw))))
            },
            Token::HexString(raw) => match decode_hex(raw) {
                Ok(bytes) => Ok((rest, Object::String(bytes))),
                Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::HexDigit,
                ))),
            },
            Token::Name(name) => Ok((rest, Object::Name(name))),
            Token::ArrayStart => self.parse_array(rest, depth),
            Token::DictStart => {
                let (after_dict, dict) = self.parse_dictionary(rest, depth)?;
                match token(after_dict) {
                    Ok((after_kw, Token::StreamStart)) => {
                        let (after_stream, data) = self.parse_stream_data(after_kw, &dict)?;
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
            _ => Err(fail(input, nom::error::ErrorKind::Tag)),
        }
    }

    fn parse_array<'a>(&self, mut input: &'a [u8], depth: usize) -> IResult<&'a [u8], Object> {
        let mut items = Vec::new();
        loop {
            match token(input) {
                Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(items))),
                Ok(_) => {
                    let (rest, item) = self.parse_at_depth(input, depth + 1)?;
                    items.push(item);
                    input = rest;
                },
                // Unclosed array at end of input
                Err(_) if is_blank(input) => return Ok((input, Object::Array(items))),
                Err(e) => return Err(e),
            }
        }
    }

    fn parse_dictionary<'a>(
        &self,
        mut input: &'a [u8],
        depth: usize,
    ) -> IResult<&'a [u8], Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            match token(input) {
                Ok((rest, Token::DictEnd)) => return Ok((rest, dict)),
                Ok((rest, Token::Name(key))) => {
                    let (rest, value) = self.parse_at_depth(rest, depth + 1)?;
                    // A null value is equivalent to an absent key
                    if !value.is_null() {
                        dict.insert(key, value);
                    }
                    input = rest;
                },
                Ok(_) => return Err(fail(input, nom::error::ErrorKind::Tag)),
                Err(_) if is_blank(input) => return Ok((input, dict)),
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream payload after the `stream` keyword: exactly `/Length` bytes when
    /// the length is known and followed by `endstream`, otherwise everything
    /// up to the next `endstream`.
    fn parse_stream_data<'a>(
        &self,
        input: &'a [u8],
        dict: &Dictionary,
    ) -> IResult<&'a [u8], Vec<u8>> {
        let body = if let Some(rest) = input.strip_prefix(b"\r\n") {
            rest
        } else if let Some(rest) = input.strip_prefix(b"\n") {
            rest
        } else if let Some(rest) = input.strip_prefix(b"\r") {
            log::debug!("stream keyword followed by CR alone");
            rest
        } else {
            input
        };

        let declared = match dict.get("Length") {
            Some(Object::Integer(n)) if *n >= 0 => Some(*n as usize),
            Some(Object::Reference(r)) => self.lengths.and_then(|resolve| resolve(*r)),
            _ => None,
        };

        if let Some(length) = declared {
            if length <= body.len() {
                if let Ok((rest, Token::StreamEnd)) = token(&body[length..]) {
                    return Ok((rest, body[..length].to_vec()));
                }
            }
            log::debug!("stream /Length {} does not land on endstream, scanning", length);
        }

        let keyword = b"endstream";
        let pos = body
            .windows(keyword.len())
            .position(|w| w == keyword)
            .ok_or_else(|| fail(input, nom::error::ErrorKind::Eof))?;

        let mut data = &body[..pos];
        if let Some(trimmed) = data.strip_suffix(b"\r\n") {
            data = trimmed;
        } else if let Some(trimmed) = data.strip_suffix(b"\n").or_else(|| data.strip_suffix(b"\r")) {
            data = trimmed;
        }
        Ok((&body[pos + keyword.len()..], data.to_vec()))
    }
}

fn is_blank(input: &[u8]) -> bool {
    crate::lexer::skip_ws(input)
        .map(|(rest, _)| rest.is_empty())
        .unwrap_or(true)
}

/// Parse one direct object with default settings.
///
/// ```
/// use pdf_seal::parser::parse_object;
/// use pdf_seal::object::Object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Count 3 >>").unwrap();
/// assert_eq!(obj.get("Count"), Some(&Object::Integer(3)));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    ObjectParser::default().parse(input)
}

/// Parse one `N G obj ... endobj` construct with default settings.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], IndirectObjectSyntax> {
    ObjectParser::default().parse_indirect(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Primitives
    // ========================================================================

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_object(b"null").unwrap().1, Object::Null);
        assert_eq!(parse_object(b"true").unwrap().1, Object::Boolean(true));
        assert_eq!(parse_object(b"-7").unwrap().1, Object::Integer(-7));
        assert_eq!(parse_object(b"1.5").unwrap().1, Object::Real(1.5));
        assert_eq!(parse_object(b"/Type").unwrap().1, Object::name("Type"));
    }

    #[test]
    fn test_parse_reference() {
        let (rest, obj) = parse_object(b"12 0 R /Next").unwrap();
        assert_eq!(obj, Object::Reference(ObjectRef::new(12, 0)));
        assert_eq!(rest, b" /Next");
    }

    #[test]
    fn test_integers_not_followed_by_r() {
        let (rest, obj) = parse_object(b"12 0 obj").unwrap();
        assert_eq!(obj, Object::Integer(12));
        assert_eq!(rest, b" 0 obj");
    }

    // ========================================================================
    // Strings
    // ========================================================================

    #[test]
    fn test_escape_sequences() {
        let (_, obj) = parse_object(b"(a\\nb\\tc\\(d\\)\\\\e)").unwrap();
        assert_eq!(obj, Object::String(b"a\nb\tc(d)\\e".to_vec()));
    }

    #[test]
    fn test_octal_escape() {
        assert_eq!(decode_literal_string_escapes(b"\\101\\0"), b"A\0");
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(decode_literal_string_escapes(b"ab\\\r\ncd"), b"abcd");
    }

    #[test]
    fn test_bare_crlf_reads_as_lf() {
        assert_eq!(decode_literal_string_escapes(b"a\r\nb"), b"a\nb");
    }

    #[test]
    fn test_hex_string() {
        let (_, obj) = parse_object(b"<48656C6C6F>").unwrap();
        assert_eq!(obj, Object::String(b"Hello".to_vec()));
        assert_eq!(decode_hex(b"7").unwrap(), vec![0x70]);
    }

    // ========================================================================
    // Composites
    // ========================================================================

    #[test]
    fn test_parse_nested_array() {
        let (_, obj) = parse_object(b"[1 [2 3] /N (s)]").unwrap();
        let arr = obj.as_array().unwrap();
        assert_eq!(arr.len(), 4);
        assert_eq!(arr[1].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_dictionary_preserves_order() {
        let (_, obj) = parse_object(b"<< /Z 1 /A 2 /M 3 >>").unwrap();
        let keys: Vec<&str> = obj.as_dict().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_null_valued_key_dropped() {
        let (_, obj) = parse_object(b"<< /A null /B 1 >>").unwrap();
        assert!(obj.get("A").is_none());
        assert_eq!(obj.get("B"), Some(&Object::Integer(1)));
    }

    #[test]
    fn test_unclosed_dictionary_at_eof() {
        let (_, obj) = parse_object(b"<< /A 1 ").unwrap();
        assert_eq!(obj.get("A"), Some(&Object::Integer(1)));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}{}", "[".repeat(20), "]".repeat(20));
        assert!(ObjectParser::new(5).parse(deep.as_bytes()).is_err());
        assert!(ObjectParser::new(50).parse(deep.as_bytes()).is_ok());
    }

    // ========================================================================
    // Streams and indirect objects
    // ========================================================================

    #[test]
    fn test_stream_with_length() {
        let input = b"<< /Length 5 >>\nstream\nhello\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_stream_with_wrong_length_scans() {
        let input = b"<< /Length 99 >>\nstream\r\nhello\r\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let resolve = |r: ObjectRef| if r.id == 9 { Some(3) } else { None };
        let parser = ObjectParser::default().with_lengths(&resolve);
        let input = b"<< /Length 9 0 R >>\nstream\nab\n\nendstream";
        let (_, obj) = parser.parse(input).unwrap();
        assert_eq!(obj.stream_data().unwrap().as_ref(), b"ab\n");
    }

    #[test]
    fn test_parse_indirect_object() {
        let (_, parsed) = parse_indirect_object(b"4 0 obj\n<< /Type /Catalog >>\nendobj\n").unwrap();
        assert_eq!(parsed.reference, ObjectRef::new(4, 0));
        assert!(parsed.terminated);
        assert_eq!(parsed.object.get("Type"), Some(&Object::name("Catalog")));
    }

    #[test]
    fn test_parse_indirect_object_missing_endobj() {
        let (_, parsed) = parse_indirect_object(b"4 0 obj 42 5 0 obj").unwrap();
        assert_eq!(parsed.object, Object::Integer(42));
        assert!(!parsed.terminated);
    }
}
