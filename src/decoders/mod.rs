//! Stream codec provider.
//!
//! Content codecs are collaborators of the engine: they are only needed to
//! unpack cross-reference streams and object streams and to optionally
//! compress streams on save. Decoders are looked up by filter name and
//! chained in order.

use crate::error::{Error, Result};

mod ascii_hex;
mod flate;
mod predictor;

pub use ascii_hex::AsciiHexDecoder;
pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Trait for stream filters.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Encode data so that [`StreamDecoder::decode`] restores it.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Look up the decoder for a filter name, accepting the abbreviated
/// inline-image forms.
pub fn decoder_for(filter: &str) -> Result<Box<dyn StreamDecoder>> {
    match filter {
        "FlateDecode" | "Fl" => Ok(Box::new(FlateDecoder)),
        "ASCIIHexDecode" | "AHx" => Ok(Box::new(AsciiHexDecoder)),
        other => Err(Error::Unsupported(format!("stream filter /{}", other))),
    }
}

/// Decode stream data through a filter chain, then reverse any predictor.
pub fn decode_stream_with_params(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
) -> Result<Vec<u8>> {
    let mut current = data.to_vec();
    for filter in filters {
        current = decoder_for(filter)?.decode(&current)?;
    }

    match params {
        Some(params) if params.predictor != 1 => decode_predictor(&current, params),
        _ => Ok(current),
    }
}

/// Decode stream data through a filter chain without parameters.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_params(data, filters, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stream_no_filters() {
        let data = b"Hello, World!";
        assert_eq!(decode_stream(data, &[]).unwrap(), data);
    }

    #[test]
    fn test_decode_stream_unsupported_filter() {
        let result = decode_stream(b"test", &["DCTDecode".to_string()]);
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_decode_stream_pipeline() {
        let compressed = FlateDecoder.encode(b"48656C6C6F").unwrap();
        let filters = vec!["FlateDecode".to_string(), "ASCIIHexDecode".to_string()];
        assert_eq!(decode_stream(&compressed, &filters).unwrap(), b"Hello");
    }

    #[test]
    fn test_decoder_for_abbreviation() {
        assert_eq!(decoder_for("Fl").unwrap().name(), "FlateDecode");
        assert_eq!(decoder_for("AHx").unwrap().name(), "ASCIIHexDecode");
    }
}
