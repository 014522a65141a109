//! Standard security handler.
//!
//! Implements password-based encryption of strings and streams (ISO 32000-1
//! section 7.6, ISO 32000-2 for revision 6):
//!
//! - RC4 with 40-bit keys (V=1, R=2) and 128-bit keys (V=2, R=3)
//! - AES-128 in CBC mode (V=4, R=4, crypt filter `/AESV2`)
//! - AES-256 in CBC mode (V=5, R=6, crypt filter `/AESV3`)
//!
//! Streams can opt out of document encryption through the identity crypt
//! filter: a `/Crypt` entry in their `/Filter` chain whose `/Name` is
//! `/Identity` or absent.
//!
//! # Example
//!
//! ```
//! use pdf_seal::encryption::{Cipher, EncryptionOptions};
//!
//! let opts = EncryptionOptions::new(Cipher::Aes, 256).with_user_password("secret");
//! assert!(opts.validate().is_ok());
//! assert!(EncryptionOptions::new(Cipher::Rc4, 256).validate().is_err());
//! ```

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

mod aes;
mod algorithms;
mod handler;
mod rc4;
mod write_handler;

pub use handler::{CryptMethod, SecurityHandler};

/// Cipher family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    /// RC4 stream cipher (40 or 128-bit keys)
    Rc4,
    /// AES in CBC mode (128 or 256-bit keys)
    Aes,
}

impl std::fmt::Display for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cipher::Rc4 => f.write_str("rc4"),
            Cipher::Aes => f.write_str("aes"),
        }
    }
}

/// Concrete algorithm, i.e. a cipher with a key size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4, 40-bit key
    Rc4_40,
    /// RC4, 128-bit key
    Rc4_128,
    /// AES-128, CBC mode
    Aes128,
    /// AES-256, CBC mode
    Aes256,
}

impl Algorithm {
    /// Pick the algorithm for a cipher and key size in bits.
    pub fn from_parts(cipher: Cipher, key_size: u32) -> Result<Self> {
        match (cipher, key_size) {
            (Cipher::Rc4, 40) => Ok(Algorithm::Rc4_40),
            (Cipher::Rc4, 128) => Ok(Algorithm::Rc4_128),
            (Cipher::Aes, 128) => Ok(Algorithm::Aes128),
            (Cipher::Aes, 256) => Ok(Algorithm::Aes256),
            _ => Err(Error::Encryption(format!(
                "key size {} is not available for {}",
                key_size, cipher
            ))),
        }
    }

    /// File key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// `(V, R)` pair written to the encryption dictionary.
    pub fn version_revision(&self) -> (i64, i64) {
        match self {
            Algorithm::Rc4_40 => (1, 2),
            Algorithm::Rc4_128 => (2, 3),
            Algorithm::Aes128 => (4, 4),
            Algorithm::Aes256 => (5, 6),
        }
    }

    /// Cipher family.
    pub fn cipher(&self) -> Cipher {
        match self {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => Cipher::Rc4,
            Algorithm::Aes128 | Algorithm::Aes256 => Cipher::Aes,
        }
    }

    /// Key size in bits.
    pub fn key_size(&self) -> u32 {
        self.key_length() as u32 * 8
    }
}

bitflags::bitflags! {
    /// User access permissions (`/P`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u32 {
        /// Print the document
        const PRINT = 1 << 2;
        /// Modify contents
        const MODIFY = 1 << 3;
        /// Copy or extract text and graphics
        const COPY = 1 << 4;
        /// Add or modify annotations, fill forms
        const ANNOTATE = 1 << 5;
        /// Fill existing form fields (R >= 3)
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility (R >= 3)
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Assemble: insert, rotate, delete pages (R >= 3)
        const ASSEMBLE = 1 << 10;
        /// Faithful high-quality printing (R >= 3)
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

/// Bits that must be set in `/P` regardless of the granted permissions.
const RESERVED_PERMISSION_BITS: u32 = 0xFFFF_F0C0;

impl Permissions {
    /// Value stored in `/P`.
    pub fn to_p_value(self) -> i32 {
        (self.bits() | RESERVED_PERMISSION_BITS) as i32
    }

    /// Permissions granted by a `/P` value.
    pub fn from_p_value(p: i32) -> Self {
        Permissions::from_bits_truncate(p as u32)
    }
}

/// Settings for encrypting a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOptions {
    /// Cipher family
    pub cipher: Cipher,
    /// Key size in bits: 40 or 128 for RC4, 128 or 256 for AES
    pub key_size: u32,
    /// Password needed to open the document (may be empty)
    pub user_password: Vec<u8>,
    /// Password granting full access; empty means "same as the user password"
    pub owner_password: Vec<u8>,
    /// Granted permissions
    pub permissions: Permissions,
    /// Whether `/Type /Metadata` streams are encrypted (R >= 4)
    pub encrypt_metadata: bool,
}

impl EncryptionOptions {
    /// Empty passwords, all permissions, metadata encrypted.
    pub fn new(cipher: Cipher, key_size: u32) -> Self {
        Self {
            cipher,
            key_size,
            user_password: Vec::new(),
            owner_password: Vec::new(),
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }

    /// Set the user password.
    pub fn with_user_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.user_password = password.as_ref().to_vec();
        self
    }

    /// Set the owner password.
    pub fn with_owner_password(mut self, password: impl AsRef<[u8]>) -> Self {
        self.owner_password = password.as_ref().to_vec();
        self
    }

    /// Restrict permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Leave metadata streams in the clear.
    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }

    /// Check that the cipher and key size go together.
    pub fn validate(&self) -> Result<Algorithm> {
        Algorithm::from_parts(self.cipher, self.key_size)
    }
}

/// Parsed `/Encrypt` dictionary of the standard security handler.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptDict {
    /// `/V`
    pub version: i64,
    /// `/R`
    pub revision: i64,
    /// `/Length` in bits
    pub length: Option<i64>,
    /// `/O`
    pub owner_hash: Vec<u8>,
    /// `/U`
    pub user_hash: Vec<u8>,
    /// `/OE` (R6)
    pub owner_encrypted_key: Option<Vec<u8>>,
    /// `/UE` (R6)
    pub user_encrypted_key: Option<Vec<u8>>,
    /// `/Perms` (R6)
    pub perms: Option<Vec<u8>>,
    /// `/P`
    pub p: i32,
    /// `/EncryptMetadata`, true when absent
    pub encrypt_metadata: bool,
    /// `/CF` crypt filter dictionary (V >= 4)
    pub crypt_filters: Dictionary,
    /// `/StmF`
    pub stream_filter: Option<String>,
    /// `/StrF`
    pub string_filter: Option<String>,
}

impl EncryptDict {
    /// Read the entries of an `/Encrypt` dictionary.
    pub fn from_dictionary(dict: &Dictionary) -> Result<Self> {
        let missing = |key: &str| Error::Encryption(format!("/Encrypt is missing /{}", key));

        match dict.get("Filter").and_then(Object::as_name) {
            Some("Standard") => {},
            Some(other) => {
                return Err(Error::Unsupported(format!("security handler /{}", other)));
            },
            None => return Err(missing("Filter")),
        }

        let integer = |key: &str| dict.get(key).and_then(Object::as_integer);
        let bytes = |key: &str| dict.get(key).and_then(Object::as_string).map(<[u8]>::to_vec);
        let name = |key: &str| dict.get(key).and_then(Object::as_name).map(str::to_string);

        Ok(Self {
            version: integer("V").unwrap_or(0),
            revision: integer("R").ok_or_else(|| missing("R"))?,
            length: integer("Length"),
            owner_hash: bytes("O").ok_or_else(|| missing("O"))?,
            user_hash: bytes("U").ok_or_else(|| missing("U"))?,
            owner_encrypted_key: bytes("OE"),
            user_encrypted_key: bytes("UE"),
            perms: bytes("Perms"),
            p: integer("P").ok_or_else(|| missing("P"))? as i32,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
            crypt_filters: dict
                .get("CF")
                .and_then(Object::as_dict)
                .cloned()
                .unwrap_or_default(),
            stream_filter: name("StmF"),
            string_filter: name("StrF"),
        })
    }

    /// File key length in bytes.
    pub fn key_length(&self) -> usize {
        match (self.version, self.length) {
            (1, _) => 5,
            (5, _) => 32,
            (_, Some(bits)) if (40..=128).contains(&bits) => bits as usize / 8,
            _ => 16,
        }
    }

    /// Serialize back to a dictionary, in the conventional key order.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        dict.insert("Filter".into(), Object::name("Standard"));
        dict.insert("V".into(), Object::Integer(self.version));
        dict.insert("R".into(), Object::Integer(self.revision));
        if let Some(length) = self.length {
            dict.insert("Length".into(), Object::Integer(length));
        }
        if !self.crypt_filters.is_empty() {
            dict.insert("CF".into(), Object::Dictionary(self.crypt_filters.clone()));
        }
        if let Some(stm) = &self.stream_filter {
            dict.insert("StmF".into(), Object::name(stm.as_str()));
        }
        if let Some(str_f) = &self.string_filter {
            dict.insert("StrF".into(), Object::name(str_f.as_str()));
        }
        dict.insert("O".into(), Object::String(self.owner_hash.clone()));
        dict.insert("U".into(), Object::String(self.user_hash.clone()));
        if let Some(oe) = &self.owner_encrypted_key {
            dict.insert("OE".into(), Object::String(oe.clone()));
        }
        if let Some(ue) = &self.user_encrypted_key {
            dict.insert("UE".into(), Object::String(ue.clone()));
        }
        if let Some(perms) = &self.perms {
            dict.insert("Perms".into(), Object::String(perms.clone()));
        }
        dict.insert("P".into(), Object::Integer(self.p as i64));
        if !self.encrypt_metadata {
            dict.insert("EncryptMetadata".into(), Object::Boolean(false));
        }
        dict
    }
}

/// Random bytes for keys, IVs and file identifiers.
///
/// Each 32-byte block is SHA-256 over two v4 UUIDs and a block counter, so
/// the fixed version and variant bits of a UUID never reach the output.
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    use sha2::{Digest, Sha256};

    let mut out = Vec::with_capacity(len + 32);
    let mut counter: u64 = 0;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        hasher.update(counter.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::dict;

    #[test]
    fn test_algorithm_from_parts() {
        assert_eq!(Algorithm::from_parts(Cipher::Rc4, 40).unwrap(), Algorithm::Rc4_40);
        assert_eq!(Algorithm::from_parts(Cipher::Aes, 256).unwrap(), Algorithm::Aes256);
        assert!(matches!(
            Algorithm::from_parts(Cipher::Aes, 40),
            Err(Error::Encryption(_))
        ));
    }

    #[test]
    fn test_algorithm_parameters() {
        assert_eq!(Algorithm::Rc4_40.key_length(), 5);
        assert_eq!(Algorithm::Aes128.version_revision(), (4, 4));
        assert_eq!(Algorithm::Aes256.version_revision(), (5, 6));
        assert_eq!(Algorithm::Rc4_128.key_size(), 128);
    }

    #[test]
    fn test_permissions_p_value() {
        let p = Permissions::all().to_p_value();
        assert_eq!(p, -4);
        assert_eq!(Permissions::from_p_value(p), Permissions::all());

        let print_only = Permissions::PRINT.to_p_value();
        assert!(Permissions::from_p_value(print_only).contains(Permissions::PRINT));
        assert!(!Permissions::from_p_value(print_only).contains(Permissions::MODIFY));
    }

    #[test]
    fn test_encrypt_dict_round_trip() {
        let source = dict([
            ("Filter", Object::name("Standard")),
            ("V", Object::Integer(2)),
            ("R", Object::Integer(3)),
            ("Length", Object::Integer(128)),
            ("O", Object::String(vec![1; 32])),
            ("U", Object::String(vec![2; 32])),
            ("P", Object::Integer(-4)),
        ]);
        let parsed = EncryptDict::from_dictionary(&source).unwrap();
        assert_eq!(parsed.key_length(), 16);
        assert!(parsed.encrypt_metadata);
        assert_eq!(parsed.to_dictionary(), source);
    }

    #[test]
    fn test_encrypt_dict_rejects_other_handlers() {
        let source = dict([("Filter", Object::name("Adobe.PubSec"))]);
        assert!(matches!(
            EncryptDict::from_dictionary(&source),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(5).len(), 5);
        assert_eq!(random_bytes(40).len(), 40);
        assert_ne!(random_bytes(16), random_bytes(16));
    }

    #[test]
    fn test_random_bytes_carry_no_uuid_markers() {
        let samples: Vec<Vec<u8>> = (0..64).map(|_| random_bytes(32)).collect();
        for block in [0, 16] {
            assert!(samples.iter().any(|s| s[block + 6] >> 4 != 4));
            assert!(samples.iter().any(|s| s[block + 8] >> 6 != 0b10));
        }
    }
}
