//! Key derivation and password checks of the standard security handler.
//!
//! Revisions 2 to 4 derive the file key from the password with MD5
//! (ISO 32000-1, algorithms 2 to 7). Revision 6 draws a random file key and
//! wraps it under a SHA-2 based password hash (ISO 32000-2, algorithms 2.A,
//! 2.B, 8 to 10). Revision 5 (an Adobe extension) is accepted on read and
//! uses a single SHA-256 in place of the iterated hash.

use super::{aes, rc4};
use crate::error::{Error, Result};
use crate::object::ObjectRef;
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

/// Standard password padding (algorithm 2, step a).
pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// Longest password honoured by revision 6.
const MAX_R6_PASSWORD: usize = 127;

/// Inputs of the MD5 key derivation, taken from the `/Encrypt` dictionary.
#[derive(Debug, Clone, Copy)]
pub struct KeyParams<'a> {
    pub revision: i64,
    pub key_length: usize,
    pub owner_hash: &'a [u8],
    pub p: i32,
    pub id0: &'a [u8],
    pub encrypt_metadata: bool,
}

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// Algorithm 2: file key from a user password.
pub fn compute_file_key(password: &[u8], params: &KeyParams<'_>) -> Vec<u8> {
    let n = params.key_length.min(16);
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(params.owner_hash);
    hasher.update(params.p.to_le_bytes());
    hasher.update(params.id0);
    if params.revision >= 4 && !params.encrypt_metadata {
        hasher.update([0xFF; 4]);
    }
    let mut hash = hasher.finalize().to_vec();

    if params.revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..n]).to_vec();
        }
    }
    hash.truncate(n);
    hash
}

/// Algorithm 3, steps a to d: RC4 key protecting `/O`.
fn owner_rc4_key(owner_password: &[u8], revision: i64, key_length: usize) -> Vec<u8> {
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    let n = if revision == 2 { 5 } else { key_length.min(16) };
    hash.truncate(n);
    hash
}

fn xor_key(key: &[u8], round: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ round).collect()
}

/// Algorithm 3: the `/O` value. An empty owner password falls back to the user password.
pub fn compute_owner_hash(
    owner_password: &[u8],
    user_password: &[u8],
    revision: i64,
    key_length: usize,
) -> Vec<u8> {
    let owner = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(owner, revision, key_length);
    let mut value = rc4::rc4_crypt(&key, &pad_password(user_password));
    if revision >= 3 {
        for round in 1..=19u8 {
            value = rc4::rc4_crypt(&xor_key(&key, round), &value);
        }
    }
    value
}

/// Algorithms 4 and 5: the `/U` value for a file key.
pub fn compute_user_hash(file_key: &[u8], id0: &[u8], revision: i64) -> Vec<u8> {
    if revision == 2 {
        return rc4::rc4_crypt(file_key, &PADDING);
    }

    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(id0);
    let mut value = rc4::rc4_crypt(file_key, &hasher.finalize());
    for round in 1..=19u8 {
        value = rc4::rc4_crypt(&xor_key(file_key, round), &value);
    }
    value.resize(32, 0);
    value
}

/// Algorithm 6: check a user password; returns the file key on success.
pub fn authenticate_user(password: &[u8], user_hash: &[u8], params: &KeyParams<'_>) -> Option<Vec<u8>> {
    let key = compute_file_key(password, params);
    let expected = compute_user_hash(&key, params.id0, params.revision);
    let compared = if params.revision == 2 { 32 } else { 16 };
    if user_hash.len() < compared {
        return None;
    }
    constant_time_eq(&expected[..compared], &user_hash[..compared]).then_some(key)
}

/// Algorithm 7: check an owner password; returns the file key on success.
pub fn authenticate_owner(password: &[u8], user_hash: &[u8], params: &KeyParams<'_>) -> Option<Vec<u8>> {
    let key = owner_rc4_key(password, params.revision, params.key_length);
    let mut user_password = params.owner_hash.to_vec();
    if params.revision == 2 {
        user_password = rc4::rc4_crypt(&key, &user_password);
    } else {
        for round in (0..=19u8).rev() {
            user_password = rc4::rc4_crypt(&xor_key(&key, round), &user_password);
        }
    }
    authenticate_user(&user_password, user_hash, params)
}

/// Per-object key for RC4 and AES-128 (algorithm 1).
pub fn object_key(file_key: &[u8], reference: ObjectRef, aes: bool) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(file_key);
    hasher.update(&reference.id.to_le_bytes()[..3]);
    hasher.update(reference.gen.to_le_bytes());
    if aes {
        hasher.update(b"sAlT");
    }
    let mut key = hasher.finalize().to_vec();
    key.truncate((file_key.len() + 5).min(16));
    key
}

fn truncate_r6_password(password: &[u8]) -> &[u8] {
    &password[..password.len().min(MAX_R6_PASSWORD)]
}

/// Algorithm 2.B: iterated password hash of revision 6. Revision 5 stops after the first SHA-256.
pub fn hash_password(password: &[u8], salt: &[u8], udata: &[u8], revision: i64) -> Result<Vec<u8>> {
    let password = truncate_r6_password(password);
    let mut k = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(udata)
        .finalize()
        .to_vec();
    if revision < 6 {
        return Ok(k);
    }

    let mut round = 0usize;
    loop {
        let mut sequence = Vec::with_capacity(password.len() + k.len() + udata.len());
        sequence.extend_from_slice(password);
        sequence.extend_from_slice(&k);
        sequence.extend_from_slice(udata);
        let k1 = sequence.repeat(64);

        let e = aes::encrypt_blocks(&k[..16], &k[16..32], &k1)?;
        let selector = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match selector {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        let last = e.last().copied().unwrap_or(0) as usize;
        if round >= 64 && last <= round - 32 {
            break;
        }
    }
    k.truncate(32);
    Ok(k)
}

/// Check and check-value pair of revision 6 (`/U`+`/UE` or `/O`+`/OE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub hash: Vec<u8>,
    pub encrypted_key: Vec<u8>,
}

fn wrap_key(password: &[u8], file_key: &[u8], udata: &[u8]) -> Result<WrappedKey> {
    let salts = super::random_bytes(16);
    let (validation_salt, key_salt) = salts.split_at(8);

    let mut hash = hash_password(password, validation_salt, udata, 6)?;
    hash.extend_from_slice(validation_salt);
    hash.extend_from_slice(key_salt);

    let intermediate = hash_password(password, key_salt, udata, 6)?;
    let encrypted_key = aes::encrypt_blocks(&intermediate, &[0u8; 16], file_key)?;
    Ok(WrappedKey {
        hash,
        encrypted_key,
    })
}

/// Algorithm 8: `/U` and `/UE`.
pub fn compute_r6_user(password: &[u8], file_key: &[u8]) -> Result<WrappedKey> {
    wrap_key(password, file_key, &[])
}

/// Algorithm 9: `/O` and `/OE`; `user_hash` is the 48-byte `/U`.
pub fn compute_r6_owner(password: &[u8], file_key: &[u8], user_hash: &[u8]) -> Result<WrappedKey> {
    wrap_key(password, file_key, &user_hash[..user_hash.len().min(48)])
}

/// Algorithm 10: `/Perms`.
pub fn compute_r6_perms(p: i32, encrypt_metadata: bool, file_key: &[u8]) -> Result<Vec<u8>> {
    let mut block = Vec::with_capacity(16);
    block.extend_from_slice(&(p as u32).to_le_bytes());
    block.extend_from_slice(&[0xFF; 4]);
    block.push(if encrypt_metadata { b'T' } else { b'F' });
    block.extend_from_slice(b"adb");
    block.extend_from_slice(&super::random_bytes(4));
    aes::encrypt_blocks(file_key, &[0u8; 16], &block)
}

/// True when `/Perms` decrypts under `file_key` and agrees with `/P`.
pub fn check_r6_perms(perms: &[u8], p: i32, file_key: &[u8]) -> bool {
    if perms.len() < 16 {
        return false;
    }
    match aes::decrypt_blocks(file_key, &[0u8; 16], &perms[..16]) {
        Ok(block) => &block[9..12] == b"adb" && block[..4] == (p as u32).to_le_bytes(),
        Err(_) => false,
    }
}

fn unwrap_key(
    password: &[u8],
    check: &[u8],
    encrypted_key: &[u8],
    udata: &[u8],
    revision: i64,
) -> Result<Option<Vec<u8>>> {
    if check.len() < 48 || encrypted_key.len() < 32 {
        return Err(Error::Encryption("truncated revision 6 check value".to_string()));
    }
    let hash = hash_password(password, &check[32..40], udata, revision)?;
    if !constant_time_eq(&hash, &check[..32]) {
        return Ok(None);
    }
    let intermediate = hash_password(password, &check[40..48], udata, revision)?;
    aes::decrypt_blocks(&intermediate, &[0u8; 16], &encrypted_key[..32]).map(Some)
}

/// Algorithm 2.A, user branch: file key when `password` opens `/U`.
pub fn authenticate_r6_user(
    password: &[u8],
    user_hash: &[u8],
    user_encrypted_key: &[u8],
    revision: i64,
) -> Result<Option<Vec<u8>>> {
    unwrap_key(password, user_hash, user_encrypted_key, &[], revision)
}

/// Algorithm 2.A, owner branch: file key when `password` opens `/O`.
pub fn authenticate_r6_owner(
    password: &[u8],
    owner_hash: &[u8],
    owner_encrypted_key: &[u8],
    user_hash: &[u8],
    revision: i64,
) -> Result<Option<Vec<u8>>> {
    let udata = &user_hash[..user_hash.len().min(48)];
    unwrap_key(password, owner_hash, owner_encrypted_key, udata, revision)
}

/// Compare without early exit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
