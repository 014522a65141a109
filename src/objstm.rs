//! Object streams (`/Type /ObjStm`).
//!
//! An object stream packs several non-stream objects into one filtered
//! stream. Its decoded payload starts with `/N` pairs of integers
//! `(object number, offset)`, offsets being relative to `/First`:
//!
//! ```text
//! 10 0 11 3
//! 42 /Test
//! ```
//!
//! Objects inside an object stream are never individually encrypted; the
//! container must be deciphered before it is handed to this module.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::ObjectParser;
use std::collections::BTreeMap;

/// Upper bound on `/N` accepted from a file.
const MAX_OBJECTS: i64 = 1_000_000;

/// Parse all objects of a deciphered object stream, keyed by object number.
///
/// Members that fail to parse are logged and skipped.
pub fn parse_object_stream(stream: &Object, max_nesting: usize) -> Result<BTreeMap<u32, Object>> {
    let dict = match stream {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::TypeMismatch {
                expected: "Stream",
                found: other.type_name(),
            });
        },
    };

    let malformed = |reason: &str| Error::ParseError {
        offset: 0,
        reason: format!("object stream: {}", reason),
    };

    if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
        if kind != "ObjStm" {
            return Err(malformed(&format!("unexpected /Type /{}", kind)));
        }
    }

    let n = dict
        .get("N")
        .and_then(Object::as_integer)
        .filter(|n| (0..=MAX_OBJECTS).contains(n))
        .ok_or_else(|| malformed("missing or invalid /N"))? as usize;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .filter(|f| *f >= 0)
        .ok_or_else(|| malformed("missing or invalid /First"))? as usize;

    let decoded = stream.decode_stream_data()?;
    if decoded.len() < first {
        return Err(malformed(&format!(
            "payload of {} bytes is shorter than /First {}",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_pairs(&decoded[..first], n)?;
    let body = &decoded[first..];
    let parser = ObjectParser::new(max_nesting);

    let mut objects = BTreeMap::new();
    for (id, offset) in pairs {
        let Some(member) = body.get(offset..) else {
            log::warn!("object {} offset {} is past the stream payload", id, offset);
            continue;
        };
        match parser.parse(member) {
            Ok((_, obj)) => {
                objects.insert(id, obj);
            },
            Err(e) => log::warn!("object {} in object stream is unparsable: {:?}", id, e),
        }
    }
    Ok(objects)
}

/// The `(object number, offset)` header.
fn parse_pairs(header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut numbers = header
        .split(|c| c.is_ascii_whitespace() || *c == 0)
        .filter(|part| !part.is_empty())
        .map(|part| std::str::from_utf8(part).ok().and_then(|s| s.parse::<usize>().ok()));

    for i in 0..count {
        let (Some(Some(id)), Some(Some(offset))) = (numbers.next(), numbers.next()) else {
            return Err(Error::ParseError {
                offset: 0,
                reason: format!("object stream header ends at pair {} of {}", i, count),
            });
        };
        pairs.push((id as u32, offset));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{FlateDecoder, StreamDecoder};
    use crate::object::dict;

    fn objstm(payload: &[u8], n: i64, first: i64) -> Object {
        Object::stream(
            dict([
                ("Type", Object::name("ObjStm")),
                ("N", Object::Integer(n)),
                ("First", Object::Integer(first)),
            ]),
            payload.to_vec(),
        )
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs(b"  10   0   11  15  12   28  ", 3).unwrap();
        assert_eq!(pairs, vec![(10, 0), (11, 15), (12, 28)]);
    }

    #[test]
    fn test_parse_pairs_short_header() {
        assert!(parse_pairs(b"10 0 11", 2).is_err());
    }

    #[test]
    fn test_parse_object_stream_basic() {
        let objects = parse_object_stream(&objstm(b"10 0 11 3 42 /Test", 2, 10), 100).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[&10].as_integer(), Some(42));
        assert_eq!(objects[&11].as_name(), Some("Test"));
    }

    #[test]
    fn test_parse_compressed_object_stream() {
        let payload = b"4 0 5 21 << /Type /Catalog >> [1 2 3]";
        let mut stream = objstm(&FlateDecoder.encode(payload).unwrap(), 2, 9);
        stream
            .as_dict_mut()
            .unwrap()
            .insert("Filter".into(), Object::name("FlateDecode"));

        let objects = parse_object_stream(&stream, 100).unwrap();
        assert_eq!(objects[&4].get("Type"), Some(&Object::name("Catalog")));
        assert_eq!(objects[&5].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_not_a_stream() {
        assert!(matches!(
            parse_object_stream(&Object::Integer(42), 100),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_n() {
        let stream = Object::stream(dict([("First", Object::Integer(4))]), b"1 0 42".to_vec());
        assert!(parse_object_stream(&stream, 100).is_err());
    }

    #[test]
    fn test_first_past_payload() {
        assert!(parse_object_stream(&objstm(b"1 0 42", 1, 100), 100).is_err());
    }

    #[test]
    fn test_member_offset_past_payload_skipped() {
        let objects = parse_object_stream(&objstm(b"1 0 2 99 7", 2, 9), 100).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[&1].as_integer(), Some(7));
    }
}
