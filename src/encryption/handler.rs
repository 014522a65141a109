//! Security handler bound to one document.
//!
//! A handler owns the file key and knows which crypt method applies to
//! strings and to each stream. Objects are deciphered on demand by the
//! [`ObjectGraph`](crate::graph::ObjectGraph) and enciphered by the writer,
//! always with the identity of the object they belong to.

use super::algorithms::{self, KeyParams};
use super::{aes, rc4};
use super::{Algorithm, EncryptDict, Permissions};
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};

/// How one class of data is enciphered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// Left in the clear
    Identity,
    /// RC4 with a per-object key
    Rc4,
    /// AES-128-CBC with a per-object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Standard security handler for an authenticated document.
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    pub(super) dict: EncryptDict,
    pub(super) algorithm: Algorithm,
    pub(super) file_key: Vec<u8>,
    pub(super) string_method: CryptMethod,
    pub(super) stream_method: CryptMethod,
}

impl SecurityHandler {
    /// Authenticate against an `/Encrypt` dictionary.
    ///
    /// The empty password is tried first, then `password` as user and as
    /// owner password.
    pub fn open(encrypt: &Dictionary, id0: &[u8], password: Option<&[u8]>) -> Result<Self> {
        let dict = EncryptDict::from_dictionary(encrypt)?;
        let algorithm = algorithm_of(&dict)?;
        let string_method = resolve_method(&dict, dict.string_filter.as_deref())?;
        let stream_method = resolve_method(&dict, dict.stream_filter.as_deref())?;

        log::info!(
            "document is encrypted with {:?} (V={}, R={})",
            algorithm,
            dict.version,
            dict.revision
        );

        let mut candidates: Vec<&[u8]> = vec![b""];
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            candidates.push(password);
        }

        for candidate in candidates {
            if let Some(file_key) = authenticate(&dict, id0, candidate)? {
                if dict.revision >= 5 {
                    if let Some(perms) = &dict.perms {
                        if !algorithms::check_r6_perms(perms, dict.p, &file_key) {
                            log::warn!("/Perms does not match /P; using /P");
                        }
                    }
                }
                return Ok(Self {
                    dict,
                    algorithm,
                    file_key,
                    string_method,
                    stream_method,
                });
            }
        }

        Err(Error::Authentication(
            "password opens neither the user nor the owner entry".to_string(),
        ))
    }

    /// Encryption algorithm in use.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Permissions granted by `/P`.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_p_value(self.dict.p)
    }

    /// Parsed encryption dictionary.
    pub fn encrypt_dict(&self) -> &EncryptDict {
        &self.dict
    }

    /// Encryption dictionary to write to the file.
    pub fn to_dictionary(&self) -> Dictionary {
        self.dict.to_dictionary()
    }

    /// Whether metadata streams are enciphered.
    pub fn encrypt_metadata(&self) -> bool {
        self.dict.encrypt_metadata
    }

    /// Method applied to strings.
    pub fn string_method(&self) -> CryptMethod {
        self.string_method
    }

    /// Method applied to streams without their own crypt filter.
    pub fn stream_method(&self) -> CryptMethod {
        self.stream_method
    }

    pub(crate) fn file_key(&self) -> &[u8] {
        &self.file_key
    }

    /// Decipher every string and stream inside the indirect object `reference`.
    pub fn decrypt_object(&self, reference: ObjectRef, value: &Object) -> Result<Object> {
        self.transform(reference, value, Direction::Decrypt)
    }

    /// Encipher every string and stream inside the indirect object `reference`.
    pub fn encrypt_object(&self, reference: ObjectRef, value: &Object) -> Result<Object> {
        self.transform(reference, value, Direction::Encrypt)
    }

    fn transform(&self, reference: ObjectRef, value: &Object, direction: Direction) -> Result<Object> {
        Ok(match value {
            Object::String(bytes) => {
                Object::String(self.apply(self.string_method, reference, bytes, direction)?)
            },
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.transform(reference, item, direction))
                    .collect::<Result<_>>()?,
            ),
            Object::Dictionary(dict) => {
                Object::Dictionary(self.transform_dict(reference, dict, direction)?)
            },
            Object::Stream { dict, data } => {
                let method = self.method_for_stream(dict);
                let data = if method == CryptMethod::Identity {
                    data.clone()
                } else {
                    self.apply(method, reference, data, direction)?.into()
                };
                Object::Stream {
                    dict: self.transform_dict(reference, dict, direction)?,
                    data,
                }
            },
            other => other.clone(),
        })
    }

    fn transform_dict(
        &self,
        reference: ObjectRef,
        dict: &Dictionary,
        direction: Direction,
    ) -> Result<Dictionary> {
        let signature = crate::signatures::is_signature_dictionary(dict);
        dict.iter()
            .map(|(key, value)| {
                let value = if signature && key == "Contents" {
                    value.clone()
                } else {
                    self.transform(reference, value, direction)?
                };
                Ok((key.clone(), value))
            })
            .collect()
    }

    /// Crypt method applied to the payload of a stream with dictionary `dict`.
    pub fn method_for_stream(&self, dict: &Dictionary) -> CryptMethod {
        match dict.get("Type").and_then(Object::as_name) {
            Some("XRef") => return CryptMethod::Identity,
            Some("Metadata") if !self.dict.encrypt_metadata => return CryptMethod::Identity,
            _ => {},
        }
        match crypt_filter_name(dict) {
            None => self.stream_method,
            Some(None) => CryptMethod::Identity,
            Some(Some(name)) => resolve_method(&self.dict, Some(&name)).unwrap_or_else(|e| {
                log::warn!("{}; leaving stream in the clear", e);
                CryptMethod::Identity
            }),
        }
    }

    fn apply(
        &self,
        method: CryptMethod,
        reference: ObjectRef,
        data: &[u8],
        direction: Direction,
    ) -> Result<Vec<u8>> {
        match (method, direction) {
            (CryptMethod::Identity, _) => Ok(data.to_vec()),
            (CryptMethod::Rc4, _) => {
                let key = algorithms::object_key(&self.file_key, reference, false);
                Ok(rc4::rc4_crypt(&key, data))
            },
            (CryptMethod::AesV2, Direction::Encrypt) => {
                aes::encrypt(&algorithms::object_key(&self.file_key, reference, true), data)
            },
            (CryptMethod::AesV2, Direction::Decrypt) => {
                aes::decrypt(&algorithms::object_key(&self.file_key, reference, true), data)
            },
            (CryptMethod::AesV3, Direction::Encrypt) => aes::encrypt(&self.file_key, data),
            (CryptMethod::AesV3, Direction::Decrypt) => aes::decrypt(&self.file_key, data),
        }
    }
}

/// Signature dictionaries keep `/Contents` in the clear.
/// `None` when the stream has no `/Crypt` filter, `Some(name)` otherwise,
/// where a missing `/Name` means the identity filter.
fn crypt_filter_name(dict: &Dictionary) -> Option<Option<String>> {
    let position = match dict.get("Filter")? {
        Object::Name(name) if name == "Crypt" => 0,
        Object::Array(filters) => filters.iter().position(|f| f.as_name() == Some("Crypt"))?,
        _ => return None,
    };
    let params = match dict.get("DecodeParms") {
        Some(Object::Array(items)) => items.get(position),
        other => other,
    };
    Some(
        params
            .and_then(Object::as_dict)
            .and_then(|p| p.get("Name"))
            .and_then(Object::as_name)
            .filter(|name| *name != "Identity")
            .map(str::to_string),
    )
}

fn algorithm_of(dict: &EncryptDict) -> Result<Algorithm> {
    match dict.version {
        1 => Ok(Algorithm::Rc4_40),
        2 | 3 => Ok(if dict.key_length() <= 5 {
            Algorithm::Rc4_40
        } else {
            Algorithm::Rc4_128
        }),
        4 => match resolve_method(dict, dict.stream_filter.as_deref())? {
            CryptMethod::AesV2 | CryptMethod::AesV3 => Ok(Algorithm::Aes128),
            _ => Ok(Algorithm::Rc4_128),
        },
        5 => Ok(Algorithm::Aes256),
        other => Err(Error::Unsupported(format!("encryption version V={}", other))),
    }
}

/// Map a crypt filter name to its method. Before V=4 everything is RC4.
fn resolve_method(dict: &EncryptDict, name: Option<&str>) -> Result<CryptMethod> {
    if dict.version < 4 {
        return Ok(CryptMethod::Rc4);
    }
    let name = match name {
        None | Some("Identity") => return Ok(CryptMethod::Identity),
        Some(name) => name,
    };
    let filter = dict
        .crypt_filters
        .get(name)
        .and_then(Object::as_dict)
        .ok_or_else(|| Error::Encryption(format!("crypt filter /{} is not defined", name)))?;
    match filter.get("CFM").and_then(Object::as_name) {
        None | Some("None") => Ok(CryptMethod::Identity),
        Some("V2") => Ok(CryptMethod::Rc4),
        Some("AESV2") => Ok(CryptMethod::AesV2),
        Some("AESV3") => Ok(CryptMethod::AesV3),
        Some(other) => Err(Error::Unsupported(format!("crypt filter method /{}", other))),
    }
}

fn authenticate(dict: &EncryptDict, id0: &[u8], password: &[u8]) -> Result<Option<Vec<u8>>> {
    if dict.revision >= 5 {
        let (Some(oe), Some(ue)) = (&dict.owner_encrypted_key, &dict.user_encrypted_key) else {
            return Err(Error::Encryption("/Encrypt is missing /OE or /UE".to_string()));
        };
        if let Some(key) = algorithms::authenticate_r6_owner(
            password,
            &dict.owner_hash,
            oe,
            &dict.user_hash,
            dict.revision,
        )? {
            return Ok(Some(key));
        }
        return algorithms::authenticate_r6_user(password, &dict.user_hash, ue, dict.revision);
    }

    let params = KeyParams {
        revision: dict.revision,
        key_length: dict.key_length(),
        owner_hash: &dict.owner_hash,
        p: dict.p,
        id0,
        encrypt_metadata: dict.encrypt_metadata,
    };
    Ok(algorithms::authenticate_user(password, &dict.user_hash, &params)
        .or_else(|| algorithms::authenticate_owner(password, &dict.user_hash, &params)))
}

#[cfg(test)]
mod tests {
    use super::super::{Cipher, EncryptionOptions};
    use super::*;
    use crate::object::dict;

    const ID: &[u8] = b"0123456789abcdef";

    fn handler(cipher: Cipher, key_size: u32) -> SecurityHandler {
        let options = EncryptionOptions::new(cipher, key_size)
            .with_user_password("user")
            .with_owner_password("owner");
        SecurityHandler::new(&options, ID).unwrap()
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    #[test]
    fn test_open_with_user_and_owner_passwords() {
        for (cipher, size) in [(Cipher::Rc4, 40), (Cipher::Rc4, 128), (Cipher::Aes, 128), (Cipher::Aes, 256)] {
            let written = handler(cipher, size);
            let encrypt = written.to_dictionary();

            let as_user = SecurityHandler::open(&encrypt, ID, Some(b"user")).unwrap();
            assert_eq!(as_user.file_key(), written.file_key());
            let as_owner = SecurityHandler::open(&encrypt, ID, Some(b"owner")).unwrap();
            assert_eq!(as_owner.file_key(), written.file_key());
            assert_eq!(as_owner.algorithm(), written.algorithm());
        }
    }

    #[test]
    fn test_wrong_password_fails() {
        let encrypt = handler(Cipher::Rc4, 128).to_dictionary();
        assert!(matches!(
            SecurityHandler::open(&encrypt, ID, Some(b"guess")),
            Err(Error::Authentication(_))
        ));
        assert!(matches!(
            SecurityHandler::open(&encrypt, ID, None),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_empty_user_password_opens_without_password() {
        let options = EncryptionOptions::new(Cipher::Aes, 128);
        let written = SecurityHandler::new(&options, ID).unwrap();
        let opened = SecurityHandler::open(&written.to_dictionary(), ID, None).unwrap();
        assert_eq!(opened.file_key(), written.file_key());
    }

    // ========================================================================
    // Object transformation
    // ========================================================================

    #[test]
    fn test_object_round_trip() {
        let r = ObjectRef::new(7, 0);
        let value = Object::Dictionary(dict([
            ("Title", Object::string("hello")),
            ("Kids", Object::Array(vec![Object::string("a"), Object::Integer(3)])),
        ]));
        for (cipher, size) in [(Cipher::Rc4, 40), (Cipher::Aes, 128), (Cipher::Aes, 256)] {
            let h = handler(cipher, size);
            let ciphered = h.encrypt_object(r, &value).unwrap();
            assert_ne!(ciphered, value);
            assert_eq!(h.decrypt_object(r, &ciphered).unwrap(), value);
        }
    }

    #[test]
    fn test_signature_contents_left_in_clear() {
        let h = handler(Cipher::Aes, 128);
        let sig = Object::Dictionary(dict([
            ("Type", Object::name("Sig")),
            ("Contents", Object::String(vec![0; 8])),
            ("Reason", Object::string("ok")),
        ]));
        let ciphered = h.encrypt_object(ObjectRef::new(3, 0), &sig).unwrap();
        assert_eq!(ciphered.get("Contents"), Some(&Object::String(vec![0; 8])));
        assert_ne!(ciphered.get("Reason"), Some(&Object::string("ok")));
    }

    #[test]
    fn test_stream_method_selection() {
        let h = handler(Cipher::Aes, 256);
        assert_eq!(h.method_for_stream(&Dictionary::new()), CryptMethod::AesV3);
        assert_eq!(
            h.method_for_stream(&dict([("Filter", Object::name("Crypt"))])),
            CryptMethod::Identity
        );
        assert_eq!(
            h.method_for_stream(&dict([("Type", Object::name("XRef"))])),
            CryptMethod::Identity
        );
        let named = dict([
            ("Filter", Object::Array(vec![Object::name("Crypt")])),
            (
                "DecodeParms",
                Object::Array(vec![Object::Dictionary(dict([("Name", Object::name("StdCF"))]))]),
            ),
        ]);
        assert_eq!(h.method_for_stream(&named), CryptMethod::AesV3);
    }

    #[test]
    fn test_identity_stream_untouched() {
        let h = handler(Cipher::Aes, 256);
        let stream = Object::stream(dict([("Filter", Object::name("Crypt"))]), b"test".to_vec());
        let out = h.encrypt_object(ObjectRef::new(4, 0), &stream).unwrap();
        assert_eq!(out.stream_data().map(|d| &d[..]), Some(&b"test"[..]));
    }

    #[test]
    fn test_unencrypted_metadata() {
        let options = EncryptionOptions::new(Cipher::Aes, 128).with_encrypt_metadata(false);
        let h = SecurityHandler::new(&options, ID).unwrap();
        let metadata = dict([("Type", Object::name("Metadata"))]);
        assert_eq!(h.method_for_stream(&metadata), CryptMethod::Identity);
    }
}
