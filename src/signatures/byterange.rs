//! Byte range reservation for signatures.
//!
//! A signature dictionary is written with two placeholders:
//!
//! - `/ByteRange [0 1000000000 1000000000 1000000000]`, wide enough to hold
//!   the real offsets once they are known;
//! - `/Contents <000...000>`, a hex string of fixed capacity.
//!
//! After serialization the real ByteRange `[0, a, b, len - b]` is written
//! over the first placeholder (padded with spaces), the two spans are
//! hashed, and the signature value is hex-encoded over the second.

use crate::error::{Error, Result};

/// Numeric placeholder used for the three unknown ByteRange entries.
pub const BYTE_RANGE_PLACEHOLDER: i64 = 1_000_000_000;

/// Default capacity of `/Contents`, in signature bytes.
pub const DEFAULT_CONTENTS_CAPACITY: usize = 8192;

/// Calculator for signature byte ranges.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Length of the `/Contents` value in the file (hex digits + 2 for angle brackets)
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Calculator for a `/Contents` holding up to `capacity` signature bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            placeholder_size: capacity * 2 + 2,
        }
    }

    /// Length of the `/Contents` value as written, brackets included.
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// Largest signature, in bytes, that fits the placeholder.
    pub fn capacity(&self) -> usize {
        (self.placeholder_size - 2) / 2
    }

    /// ByteRange for a file of `file_size` bytes whose `/Contents` value
    /// starts (at its `<`) at `contents_offset`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before_sig = contents_offset as i64;
        let after_sig_start = (contents_offset + self.placeholder_size) as i64;
        let after_sig_len = file_size as i64 - after_sig_start;

        [0, before_sig, after_sig_start, after_sig_len]
    }

    /// Concatenation of the two spans named by `byte_range`.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        if byte_range.iter().any(|v| *v < 0) {
            return Err(Error::Signature(format!("negative ByteRange entry in {:?}", byte_range)));
        }
        let [offset1, length1, offset2, length2] = byte_range.map(|v| v as usize);

        for (offset, length) in [(offset1, length1), (offset2, length2)] {
            if offset.checked_add(length).map_or(true, |end| end > pdf_data.len()) {
                return Err(Error::Signature(format!(
                    "ByteRange span {}+{} exceeds file size {}",
                    offset,
                    length,
                    pdf_data.len()
                )));
            }
        }

        let mut signed_bytes = Vec::with_capacity(length1 + length2);
        signed_bytes.extend_from_slice(&pdf_data[offset1..offset1 + length1]);
        signed_bytes.extend_from_slice(&pdf_data[offset2..offset2 + length2]);
        Ok(signed_bytes)
    }

    /// Check that `byte_range` starts at 0, ends at the end of the file and
    /// leaves exactly one gap.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
        let [offset1, length1, offset2, length2] = *byte_range;

        if offset1 != 0 {
            return Err(Error::Signature(format!("ByteRange must start at 0, got {}", offset1)));
        }
        if offset2 + length2 != file_size as i64 {
            return Err(Error::Signature(format!(
                "ByteRange must end at file size {}, got {}",
                file_size,
                offset2 + length2
            )));
        }
        if length1 >= offset2 {
            return Err(Error::Signature(format!(
                "ByteRange first span ({}) reaches the second span ({})",
                length1, offset2
            )));
        }
        Ok(())
    }

    /// Offset of the `<` opening the `/Contents` value, searching from the
    /// start of the signature dictionary.
    pub fn find_contents_offset(pdf_data: &[u8], sig_dict_offset: usize) -> Option<usize> {
        find_value_after(pdf_data, sig_dict_offset, b"/Contents", b'<')
    }

    /// Offset of the `[` opening the `/ByteRange` array.
    pub fn find_byte_range_offset(pdf_data: &[u8], sig_dict_offset: usize) -> Option<usize> {
        find_value_after(pdf_data, sig_dict_offset, b"/ByteRange", b'[')
    }

    /// Overwrite the ByteRange placeholder at `offset` with `byte_range`,
    /// keeping the array's length by padding with spaces.
    pub fn patch_byte_range(pdf_data: &mut [u8], offset: usize, byte_range: &[i64; 4]) -> Result<()> {
        let close = pdf_data[offset..]
            .iter()
            .position(|b| *b == b']')
            .map(|p| offset + p)
            .ok_or_else(|| Error::Signature("unterminated ByteRange placeholder".to_string()))?;
        let slot = close - offset;

        let values = format!(
            "[{} {} {} {}",
            byte_range[0], byte_range[1], byte_range[2], byte_range[3]
        );
        if values.len() > slot {
            return Err(Error::Signature(format!(
                "ByteRange {:?} does not fit its placeholder",
                byte_range
            )));
        }

        let patch = format!("{:<width$}", values, width = slot);
        pdf_data[offset..close].copy_from_slice(patch.as_bytes());
        Ok(())
    }

    /// Replace the placeholder at `contents_offset` with `signature`,
    /// hex-encoded and zero-padded to the placeholder length.
    pub fn insert_signature(&self, pdf_data: &mut [u8], contents_offset: usize, signature: &[u8]) -> Result<()> {
        if signature.len() > self.capacity() {
            return Err(Error::Signature(format!(
                "signature of {} bytes exceeds the reserved {} bytes",
                signature.len(),
                self.capacity()
            )));
        }
        if contents_offset + self.placeholder_size > pdf_data.len() {
            return Err(Error::Signature(
                "signature placeholder extends past the end of the file".to_string(),
            ));
        }

        let mut value = Vec::with_capacity(self.placeholder_size);
        value.push(b'<');
        value.extend_from_slice(bytes_to_hex(signature).as_bytes());
        value.resize(self.placeholder_size - 1, b'0');
        value.push(b'>');

        pdf_data[contents_offset..contents_offset + self.placeholder_size].copy_from_slice(&value);
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_CONTENTS_CAPACITY)
    }
}

/// Position of `open` following `key` and optional whitespace.
fn find_value_after(pdf_data: &[u8], from: usize, key: &[u8], open: u8) -> Option<usize> {
    let window = pdf_data.get(from..)?;
    let mut pos = 0;
    while pos + key.len() < window.len() {
        if window[pos..].starts_with(key) {
            let value = window[pos + key.len()..]
                .iter()
                .position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
                .map(|p| pos + key.len() + p)?;
            if window[value] == open {
                return Some(from + value);
            }
        }
        pos += 1;
    }
    None
}

/// Uppercase hex.
pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8] = b"0123456789ABCDEF";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_size() {
        let calc = ByteRangeCalculator::new(1024);
        assert_eq!(calc.placeholder_size(), 2050);
        assert_eq!(calc.capacity(), 1024);
    }

    #[test]
    fn test_calculate_byte_range() {
        let calc = ByteRangeCalculator::new(49);
        let byte_range = calc.calculate_byte_range(1000, 400);
        assert_eq!(byte_range, [0, 400, 500, 500]);
    }

    #[test]
    fn test_extract_signed_bytes() {
        let pdf_data = b"AAABBBCCC";
        let signed = ByteRangeCalculator::extract_signed_bytes(pdf_data, &[0, 3, 6, 3]).unwrap();
        assert_eq!(signed, b"AAACCC");
    }

    #[test]
    fn test_extract_rejects_out_of_bounds() {
        let result = ByteRangeCalculator::extract_signed_bytes(b"AAABBB", &[0, 3, 4, 9]);
        assert!(matches!(result, Err(Error::Signature(_))));
        let result = ByteRangeCalculator::extract_signed_bytes(b"AAABBB", &[0, -1, 4, 2]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_byte_range() {
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 50], 200).is_ok());
        assert!(ByteRangeCalculator::validate_byte_range(&[10, 100, 150, 50], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 100], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 150, 150, 50], 200).is_err());
    }

    #[test]
    fn test_find_offsets() {
        let data = b"1 0 obj\n<<\n/ByteRange [0 1 2 3]\n/Contents <0000>\n>>";
        let br = ByteRangeCalculator::find_byte_range_offset(data, 0).unwrap();
        assert_eq!(data[br], b'[');
        let contents = ByteRangeCalculator::find_contents_offset(data, 0).unwrap();
        assert_eq!(&data[contents..contents + 6], b"<0000>");
        assert!(ByteRangeCalculator::find_contents_offset(b"/Contents (x)", 0).is_none());
    }

    #[test]
    fn test_patch_byte_range_keeps_length() {
        let mut data = b"/ByteRange [0 1000000000 1000000000 1000000000]".to_vec();
        let before = data.len();
        ByteRangeCalculator::patch_byte_range(&mut data, 11, &[0, 10, 20, 30]).unwrap();
        assert_eq!(data.len(), before);
        assert!(data.starts_with(b"/ByteRange [0 10 20 30 "));
        assert!(data.ends_with(b" ]"));

        let mut small = b"[0 1 2 3]".to_vec();
        assert!(ByteRangeCalculator::patch_byte_range(&mut small, 0, &[0, 100, 200, 300]).is_err());
    }

    #[test]
    fn test_insert_signature() {
        let calc = ByteRangeCalculator::new(4);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        calc.insert_signature(&mut pdf_data, 2, &[0xAB, 0xCD]).unwrap();
        assert_eq!(&pdf_data, b"XX<ABCD0000>YY");
    }

    #[test]
    fn test_insert_signature_too_large() {
        let calc = ByteRangeCalculator::new(4);
        let mut pdf_data = b"XX<00000000>YY".to_vec();
        let result = calc.insert_signature(&mut pdf_data, 2, &[1, 2, 3, 4, 5]);
        assert!(matches!(result, Err(Error::Signature(_))));
    }
}
