//! PNG predictors (10-15) as used by cross-reference and object streams.
//!
//! Each row carries a leading tag byte selecting the PNG filter for that row;
//! the filter is reversed against the previously decoded row.

use crate::error::{Error, Result};
use crate::object::Object;

/// Decode parameters of a stream (`/DecodeParms`).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 10-15 = PNG)
    pub predictor: i64,
    /// Number of samples per row
    pub columns: usize,
    /// Color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Read parameters from a `/DecodeParms` value (dictionary, or the first
    /// dictionary of an array).
    pub fn from_object(params: Option<&Object>) -> Option<Self> {
        let dict = match params? {
            Object::Dictionary(d) => d,
            Object::Array(arr) => arr.iter().find_map(|obj| obj.as_dict())?,
            _ => return None,
        };

        let read = |key: &str, default: i64| -> i64 {
            dict.get(key).and_then(|o| o.as_integer()).unwrap_or(default)
        };

        Some(Self {
            predictor: read("Predictor", 1),
            columns: read("Columns", 1).max(1) as usize,
            colors: read("Colors", 1).max(1) as usize,
            bits_per_component: read("BitsPerComponent", 8).max(1) as usize,
        })
    }

    /// Bytes of sample data per row, without the PNG tag byte.
    pub fn row_len(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse the predictor described by `params`.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        10..=15 => decode_png_rows(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_png_rows(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.row_len();
    let stride = row_len + 1;
    if !data.len().is_multiple_of(stride) {
        return Err(Error::Decode(format!(
            "Predicted data length {} is not a multiple of row size {}",
            data.len(),
            stride
        )));
    }

    let bpp = params.bytes_per_pixel();
    let mut output = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];

    for row in data.chunks(stride) {
        let tag = row[0];
        let mut cur = row[1..].to_vec();

        for i in 0..row_len {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                _ => return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", tag))),
            };
            cur[i] = cur[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&cur);
        prev = cur;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
