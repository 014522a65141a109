//! ASCIIHexDecode implementation.
//!
//! Whitespace is ignored, `>` ends the data and an odd trailing digit is
//! padded with an implicit '0'.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let digits: Vec<u8> = input
            .iter()
            .copied()
            .take_while(|&c| c != b'>')
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        digits
            .chunks(2)
            .map(|pair| {
                let high = nibble(pair[0])?;
                let low = match pair.get(1) {
                    Some(&c) => nibble(c)?,
                    None => 0,
                };
                Ok((high << 4) | low)
            })
            .collect()
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() * 2 + 1);
        for byte in input {
            out.extend_from_slice(format!("{:02X}", byte).as_bytes());
        }
        out.push(b'>');
        Ok(out)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

fn nibble(digit: u8) -> Result<u8> {
    (digit as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| Error::Decode(format!("ASCIIHexDecode: invalid hex digit '{}'", digit as char)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_with_whitespace_and_eod() {
        let out = AsciiHexDecoder.decode(b"48 65 6C\n6C 6F>trailing").unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_decode_odd_length() {
        assert_eq!(AsciiHexDecoder.decode(b"7").unwrap(), vec![0x70]);
    }

    #[test]
    fn test_decode_invalid_digit() {
        assert!(AsciiHexDecoder.decode(b"4G").is_err());
    }

    #[test]
    fn test_encode() {
        assert_eq!(AsciiHexDecoder.encode(b"Hi").unwrap(), b"4869>");
    }
}
