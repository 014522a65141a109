//! Security handler for encrypting a document on save.

use super::algorithms::{self, KeyParams};
use super::handler::{CryptMethod, SecurityHandler};
use super::{Algorithm, EncryptDict, EncryptionOptions};
use crate::error::Result;
use crate::object::{dict, Dictionary, Object};

impl SecurityHandler {
    /// Build a fresh handler and its `/Encrypt` values from `options`.
    ///
    /// `id0` is the first element of the trailer `/ID` the document will be
    /// written with; the RC4 and AES-128 keys depend on it.
    pub fn new(options: &EncryptionOptions, id0: &[u8]) -> Result<Self> {
        let algorithm = options.validate()?;
        let (version, revision) = algorithm.version_revision();
        let p = options.permissions.to_p_value();
        let owner_password = if options.owner_password.is_empty() {
            &options.user_password
        } else {
            &options.owner_password
        };

        let mut dict = EncryptDict {
            version,
            revision,
            length: Some(algorithm.key_size() as i64),
            owner_hash: Vec::new(),
            user_hash: Vec::new(),
            owner_encrypted_key: None,
            user_encrypted_key: None,
            perms: None,
            p,
            encrypt_metadata: options.encrypt_metadata,
            crypt_filters: Dictionary::new(),
            stream_filter: None,
            string_filter: None,
        };

        let (file_key, method) = match algorithm {
            Algorithm::Aes256 => {
                let file_key = super::random_bytes(32);
                let user = algorithms::compute_r6_user(&options.user_password, &file_key)?;
                let owner = algorithms::compute_r6_owner(owner_password, &file_key, &user.hash)?;
                dict.user_hash = user.hash;
                dict.user_encrypted_key = Some(user.encrypted_key);
                dict.owner_hash = owner.hash;
                dict.owner_encrypted_key = Some(owner.encrypted_key);
                dict.perms = Some(algorithms::compute_r6_perms(
                    p,
                    options.encrypt_metadata,
                    &file_key,
                )?);
                install_standard_filter(&mut dict, "AESV3", 32);
                (file_key, CryptMethod::AesV3)
            },
            _ => {
                let key_length = algorithm.key_length();
                dict.owner_hash = algorithms::compute_owner_hash(
                    owner_password,
                    &options.user_password,
                    revision,
                    key_length,
                );
                let params = KeyParams {
                    revision,
                    key_length,
                    owner_hash: &dict.owner_hash,
                    p,
                    id0,
                    encrypt_metadata: options.encrypt_metadata,
                };
                let file_key = algorithms::compute_file_key(&options.user_password, &params);
                dict.user_hash = algorithms::compute_user_hash(&file_key, id0, revision);
                if algorithm == Algorithm::Aes128 {
                    install_standard_filter(&mut dict, "AESV2", 16);
                    (file_key, CryptMethod::AesV2)
                } else {
                    (file_key, CryptMethod::Rc4)
                }
            },
        };

        log::debug!("encrypting with {:?} (V={}, R={})", algorithm, version, revision);

        Ok(Self {
            dict,
            algorithm,
            file_key,
            string_method: method,
            stream_method: method,
        })
    }
}

/// Declare `/StdCF` and route strings and streams through it.
fn install_standard_filter(encrypt: &mut EncryptDict, cfm: &str, length: i64) {
    let filter = dict([
        ("Type", Object::name("CryptFilter")),
        ("CFM", Object::name(cfm)),
        ("AuthEvent", Object::name("DocOpen")),
        ("Length", Object::Integer(length)),
    ]);
    encrypt
        .crypt_filters
        .insert("StdCF".to_string(), Object::Dictionary(filter));
    encrypt.stream_filter = Some("StdCF".to_string());
    encrypt.string_filter = Some("StdCF".to_string());
}
