//! AES-CBC for strings, streams and the revision 6 key wrapping.
//!
//! Ciphered strings and streams carry their 16-byte IV in front of the
//! ciphertext and use PKCS#7 padding. The key-wrapping helpers used by
//! revision 6 work on whole blocks with a zero IV and no padding.

use crate::error::{Error, Result};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK: usize = 16;

fn key_error(len: usize) -> Error {
    Error::Encryption(format!("AES key must be 16 or 32 bytes, got {}", len))
}

/// Encrypt with a fresh random IV; the result is `IV || ciphertext`.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let iv = super::random_bytes(BLOCK);
    encrypt_with_iv(key, &iv, plaintext)
}

/// Encrypt with the given IV; the result is `IV || ciphertext`.
pub fn encrypt_with_iv(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let msg_len = plaintext.len();
    let mut buffer = vec![0u8; msg_len + BLOCK];
    buffer[..msg_len].copy_from_slice(plaintext);

    let written = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, msg_len)
            .map(<[u8]>::len),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .encrypt_padded_mut::<Pkcs7>(&mut buffer, msg_len)
            .map(<[u8]>::len),
        other => return Err(key_error(other)),
    }
    .map_err(|_| Error::Encryption("AES padding failed".to_string()))?;

    let mut out = Vec::with_capacity(BLOCK + written);
    out.extend_from_slice(iv);
    out.extend_from_slice(&buffer[..written]);
    Ok(out)
}

/// Decrypt `IV || ciphertext`. Empty input decrypts to empty output.
pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < BLOCK || data.len() % BLOCK != 0 {
        return Err(Error::Encryption(format!(
            "AES ciphertext of {} bytes is not a whole number of blocks",
            data.len()
        )));
    }

    let (iv, ciphertext) = data.split_at(BLOCK);
    if ciphertext.is_empty() {
        return Ok(Vec::new());
    }
    let mut buffer = ciphertext.to_vec();
    let unpad_error = |_| Error::Encryption("invalid AES padding".to_string());

    let plain = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(unpad_error)?
            .to_vec(),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| key_error(key.len()))?
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(unpad_error)?
            .to_vec(),
        other => return Err(key_error(other)),
    };
    Ok(plain)
}

/// Whole-block CBC encryption without padding (revision 6 hashing and key wrapping).
pub fn encrypt_blocks(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % BLOCK != 0 {
        return Err(Error::Encryption("unpadded AES input must be whole blocks".to_string()));
    }
    let mut buffer = data.to_vec();
    let len = buffer.len();
    let pad_error = |_| Error::Encryption("AES block encryption failed".to_string());
    match key.len() {
        16 => {
            Aes128CbcEnc::new_from_slices(key, iv)
                .map_err(|_| key_error(key.len()))?
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(pad_error)?;
        },
        32 => {
            Aes256CbcEnc::new_from_slices(key, iv)
                .map_err(|_| key_error(key.len()))?
                .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
                .map_err(pad_error)?;
        },
        other => return Err(key_error(other)),
    }
    Ok(buffer)
}

/// Whole-block AES-256-CBC decryption without padding.
pub fn decrypt_blocks(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % BLOCK != 0 {
        return Err(Error::Encryption("unpadded AES input must be whole blocks".to_string()));
    }
    let mut buffer = data.to_vec();
    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|_| key_error(key.len()))?
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Encryption("AES block decryption failed".to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes128_round_trip() {
        let key = [7u8; 16];
        let ciphertext = encrypt(&key, b"Hello, AES!").unwrap();
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(decrypt(&key, &ciphertext).unwrap(), b"Hello, AES!");
    }

    #[test]
    fn test_aes256_round_trip() {
        let key = [9u8; 32];
        let plaintext = vec![0xAB; 100];
        let ciphertext = encrypt(&key, &plaintext).unwrap();
        assert_eq!(decrypt(&key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_block_aligned_input_gets_full_pad_block() {
        let key = [1u8; 16];
        let ciphertext = encrypt(&key, &[0u8; 16]).unwrap();
        assert_eq!(ciphertext.len(), 48);
    }

    #[test]
    fn test_iv_is_random() {
        let key = [1u8; 16];
        assert_ne!(encrypt(&key, b"same").unwrap(), encrypt(&key, b"same").unwrap());
    }

    #[test]
    fn test_fips197_vector() {
        // AES-128 single block with zero IV equals ECB
        let key: Vec<u8> = (0u8..16).collect();
        let block = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let out = encrypt_blocks(&key, &[0u8; 16], &block).unwrap();
        assert_eq!(
            out,
            [
                0x69, 0xc4, 0xe0, 0xd8, 0x6a, 0x7b, 0x04, 0x30, 0xd8, 0xcd, 0xb7, 0x80, 0x70, 0xb4,
                0xc5, 0x5a
            ]
        );
    }

    #[test]
    fn test_block_helpers_round_trip() {
        let key = [3u8; 32];
        let data = [5u8; 32];
        let wrapped = encrypt_blocks(&key, &[0u8; 16], &data).unwrap();
        assert_eq!(decrypt_blocks(&key, &[0u8; 16], &wrapped).unwrap(), data);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(encrypt(&[0u8; 10], b"x").is_err());
        assert!(decrypt(&[0u8; 16], &[0u8; 20]).is_err());
        assert!(decrypt(&[0u8; 16], &[]).unwrap().is_empty());
    }
}
