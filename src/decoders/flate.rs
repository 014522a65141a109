//! FlateDecode (zlib/deflate) implementation using flate2.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!(
                    "FlateDecode partial recovery: extracted {} bytes before corruption: {}",
                    output.len(),
                    e
                );
                Ok(output)
            },
            Err(e) => {
                // Some producers omit the zlib wrapper
                log::debug!("Zlib decode failed ({}), trying raw deflate", e);
                output.clear();
                DeflateDecoder::new(input)
                    .read_to_end(&mut output)
                    .map_err(|e| Error::Decode(format!("FlateDecode failed: {}", e)))?;
                Ok(output)
            },
        }
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input)?;
        Ok(encoder.finish()?)
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_encode_decode() {
        let data = b"BT /F1 12 Tf (Hello) Tj ET".repeat(20);
        let compressed = FlateDecoder.encode(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(FlateDecoder.decode(&compressed).unwrap(), data);
    }

    #[test]
    fn test_flate_raw_deflate_fallback() {
        use flate2::write::DeflateEncoder;
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"raw deflate payload").unwrap();
        let raw = enc.finish().unwrap();
        assert_eq!(FlateDecoder.decode(&raw).unwrap(), b"raw deflate payload");
    }

    #[test]
    fn test_flate_garbage_fails() {
        assert!(FlateDecoder.decode(b"\xff\xfe not compressed").is_err());
    }
}
