//! Digital signatures.
//!
//! Signing reserves a byte range in a signature dictionary, serializes the
//! document, digests every byte outside the `/Contents` placeholder and
//! patches the signature value back in. Verification recomputes that
//! digest, checks the value against the embedded certificate and hands the
//! certificate chain to a trust policy or callback.
//!
//! ## Methods
//!
//! - `adbe.pkcs7.sha1`: CMS, SHA-1 digest of the range as attached content
//! - `adbe.pkcs7.detached`: CMS, no content, SHA-256
//! - `adbe.x509.rsa_sha1`: raw PKCS#1 (or ECDSA) signature, certificate in `/Cert`
//!
//! Keys may be RSA or ECDSA P-256.

mod byterange;
mod credentials;
mod signer;
mod types;
mod verifier;

pub use byterange::{ByteRangeCalculator, BYTE_RANGE_PLACEHOLDER, DEFAULT_CONTENTS_CAPACITY};
pub use credentials::{Certificate, PrivateKey};
pub use signer::{format_pdf_date, PdfSigner};
pub use types::{
    is_signature_dictionary, CertificateError, DigestAlgorithm, SignOptions, SignatureInfo,
    SignatureMethod, VerifyContext, VerifyOptions,
};
pub use verifier::{build_chain, decide, ChainLink, CheckedSignature, SignatureVerifier, VerifyCallback};
