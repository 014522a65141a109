//! Signature types: methods, options, verification context.

use super::byterange::DEFAULT_CONTENTS_CAPACITY;
use super::credentials::Certificate;
use crate::object::{Dictionary, Object, ObjectRef};
use der::asn1::ObjectIdentifier;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

const SHA1_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const SHA256_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const SHA384_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const SHA512_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// SHA-1 (the legacy adbe methods)
    Sha1,
    /// SHA-256
    Sha256,
    /// SHA-384 (certificates only)
    Sha384,
    /// SHA-512 (certificates only)
    Sha512,
}

impl DigestAlgorithm {
    /// OID of this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => SHA1_OID,
            DigestAlgorithm::Sha256 => SHA256_OID,
            DigestAlgorithm::Sha384 => SHA384_OID,
            DigestAlgorithm::Sha512 => SHA512_OID,
        }
    }

    /// Algorithm named by `oid`, if supported.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == *oid)
    }

    /// Name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest of `data`.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Signature method, written as the `/SubFilter` of the signature dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMethod {
    /// CMS signed-data carrying the SHA-1 digest of the byte range as content
    Pkcs7Sha1,
    /// CMS signed-data without content
    #[default]
    Pkcs7Detached,
    /// Bare PKCS#1 signature, certificate stored in `/Cert`
    Pkcs1RsaSha1,
}

impl SignatureMethod {
    /// `/SubFilter` name.
    pub fn sub_filter(&self) -> &'static str {
        match self {
            SignatureMethod::Pkcs7Sha1 => "adbe.pkcs7.sha1",
            SignatureMethod::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureMethod::Pkcs1RsaSha1 => "adbe.x509.rsa_sha1",
        }
    }

    /// Method for a `/SubFilter` name.
    pub fn from_sub_filter(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.sha1" => Some(SignatureMethod::Pkcs7Sha1),
            "adbe.pkcs7.detached" => Some(SignatureMethod::Pkcs7Detached),
            "adbe.x509.rsa_sha1" => Some(SignatureMethod::Pkcs1RsaSha1),
            _ => None,
        }
    }

    /// Digest taken over the byte range.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            SignatureMethod::Pkcs7Detached => DigestAlgorithm::Sha256,
            SignatureMethod::Pkcs7Sha1 | SignatureMethod::Pkcs1RsaSha1 => DigestAlgorithm::Sha1,
        }
    }
}

/// Options for signing a document.
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Signature method
    pub method: SignatureMethod,
    /// Signature field widget receiving the signature; an invisible field
    /// is created on the first page when absent
    pub annotation: Option<ObjectRef>,
    /// Name of the signer (`/Name`)
    pub issuer: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Contact information
    pub contact: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Bytes reserved for the signature value in `/Contents`
    pub contents_capacity: usize,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            method: SignatureMethod::default(),
            annotation: None,
            issuer: None,
            location: None,
            contact: None,
            reason: None,
            contents_capacity: DEFAULT_CONTENTS_CAPACITY,
        }
    }
}

impl SignOptions {
    /// Options for `method` with everything else defaulted.
    pub fn new(method: SignatureMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Sign into an existing signature field widget.
    pub fn with_annotation(mut self, annotation: ObjectRef) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Set the signer name.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the contact information.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Reserve `capacity` bytes for the signature value.
    pub fn with_contents_capacity(mut self, capacity: usize) -> Self {
        self.contents_capacity = capacity;
        self
    }
}

/// Trust policy for verification.
///
/// The default rejects self-signed and otherwise untrusted chains.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Accept a chain whose only defect is a self-signed certificate
    pub allow_self_signed: bool,
    /// Certificates accepted as trust anchors
    pub trusted_certs: Vec<Certificate>,
}

impl VerifyOptions {
    /// Default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept self-signed chains.
    pub fn allow_self_signed(mut self, allow: bool) -> Self {
        self.allow_self_signed = allow;
        self
    }

    /// Add a trust anchor.
    pub fn with_trusted_cert(mut self, cert: Certificate) -> Self {
        self.trusted_certs.push(cert);
        self
    }
}

/// Outcome of checking one certificate of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateError {
    /// No defect found
    Ok,
    /// The signing certificate is self-signed and not trusted
    DepthZeroSelfSignedCert,
    /// The chain ends in a self-signed certificate that is not trusted
    SelfSignedCertInChain,
    /// The issuer of this certificate is neither embedded nor trusted
    UnableToGetIssuerCertLocally,
    /// The certificate is not valid yet
    CertNotYetValid,
    /// The certificate has expired
    CertHasExpired,
    /// The issuer's key does not verify this certificate's signature
    CertSignatureFailure,
}

impl CertificateError {
    /// Whether the only problem is a self-signed certificate.
    pub fn is_self_signed(&self) -> bool {
        matches!(
            self,
            CertificateError::DepthZeroSelfSignedCert | CertificateError::SelfSignedCertInChain
        )
    }
}

impl std::fmt::Display for CertificateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CertificateError::Ok => "ok",
            CertificateError::DepthZeroSelfSignedCert => "self-signed certificate",
            CertificateError::SelfSignedCertInChain => "self-signed certificate in chain",
            CertificateError::UnableToGetIssuerCertLocally => "unable to get local issuer certificate",
            CertificateError::CertNotYetValid => "certificate is not yet valid",
            CertificateError::CertHasExpired => "certificate has expired",
            CertificateError::CertSignatureFailure => "certificate signature failure",
        };
        f.write_str(text)
    }
}

/// What a trust callback sees for one certificate of the chain.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// Candidate certificate
    pub certificate: Certificate,
    /// Position in the chain, 0 for the signing certificate
    pub depth: usize,
    /// Defect found for this certificate
    pub error: CertificateError,
}

/// An existing signature, as read from its dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureInfo {
    /// Identity of the signature dictionary
    pub reference: Option<ObjectRef>,
    /// `/SubFilter`
    pub sub_filter: Option<String>,
    /// Method, when the sub filter is one this crate produces
    pub method: Option<SignatureMethod>,
    /// `/ByteRange`
    pub byte_range: Vec<i64>,
    /// `/Name`
    pub signer_name: Option<String>,
    /// `/M`
    pub signing_time: Option<String>,
    /// `/Reason`
    pub reason: Option<String>,
    /// `/Location`
    pub location: Option<String>,
    /// `/ContactInfo`
    pub contact_info: Option<String>,
    /// Whether `/Contents` holds a value rather than the zero placeholder
    pub has_value: bool,
}

impl SignatureInfo {
    /// Read the entries of a signature dictionary.
    pub fn from_dictionary(reference: Option<ObjectRef>, dict: &Dictionary) -> Self {
        let text = |key: &str| {
            dict.get(key)
                .and_then(Object::as_string)
                .map(|s| String::from_utf8_lossy(s).into_owned())
        };
        let sub_filter = dict.get("SubFilter").and_then(Object::as_name).map(str::to_string);

        Self {
            reference,
            method: sub_filter.as_deref().and_then(SignatureMethod::from_sub_filter),
            sub_filter,
            byte_range: dict
                .get("ByteRange")
                .and_then(Object::as_array)
                .map(|a| a.iter().filter_map(Object::as_integer).collect())
                .unwrap_or_default(),
            signer_name: text("Name"),
            signing_time: text("M"),
            reason: text("Reason"),
            location: text("Location"),
            contact_info: text("ContactInfo"),
            has_value: dict
                .get("Contents")
                .and_then(Object::as_string)
                .is_some_and(|c| c.iter().any(|b| *b != 0)),
        }
    }

    /// ByteRange as a fixed array, when it has exactly four entries.
    pub fn byte_range_array(&self) -> Option<[i64; 4]> {
        self.byte_range.as_slice().try_into().ok()
    }
}

/// Whether `dict` is a signature dictionary.
pub fn is_signature_dictionary(dict: &Dictionary) -> bool {
    dict.get("Type").and_then(Object::as_name) == Some("Sig")
        || (dict.contains_key("ByteRange") && dict.contains_key("Contents"))
}
