//! Signature value production.
//!
//! The byte range is digested and turned into the value stored in
//! `/Contents`:
//!
//! - `adbe.pkcs7.sha1`: CMS signed-data whose encapsulated content is the
//!   SHA-1 digest of the byte range;
//! - `adbe.pkcs7.detached`: CMS signed-data without content, the SHA-256
//!   digest of the byte range in the `messageDigest` attribute;
//! - `adbe.x509.rsa_sha1`: the raw signature of the SHA-1 digest, wrapped
//!   in a DER OCTET STRING.
//!
//! CMS values carry the signing certificate and the `contentType`,
//! `signingTime` and `messageDigest` signed attributes.

use super::credentials::{Certificate, PrivateKey};
use super::types::{DigestAlgorithm, SignatureMethod};
use crate::error::Result;
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier,
    SignerInfo, SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::Encode;
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;

pub(crate) const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub(crate) const ID_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
pub(crate) const ID_CONTENT_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
pub(crate) const ID_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
pub(crate) const ID_SIGNING_TIME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

/// Produces signature values for one certificate and key.
#[derive(Debug)]
pub struct PdfSigner<'a> {
    certificate: &'a Certificate,
    key: &'a PrivateKey,
    method: SignatureMethod,
}

impl<'a> PdfSigner<'a> {
    /// Signer for `method`; fails when `key` does not belong to `certificate`.
    pub fn new(certificate: &'a Certificate, key: &'a PrivateKey, method: SignatureMethod) -> Result<Self> {
        key.check_matches(certificate)?;
        Ok(Self {
            certificate,
            key,
            method,
        })
    }

    /// Signature value for the concatenated byte-range contents.
    pub fn sign(&self, signed_bytes: &[u8]) -> Result<Vec<u8>> {
        let digest_alg = self.method.digest_algorithm();
        let range_digest = digest_alg.digest(signed_bytes);
        log::debug!(
            "signing {} bytes with {} ({})",
            signed_bytes.len(),
            self.method.sub_filter(),
            digest_alg.name()
        );

        match self.method {
            SignatureMethod::Pkcs1RsaSha1 => {
                let signature = self.key.sign_digest(digest_alg, &range_digest)?;
                Ok(OctetString::new(signature)?.to_der()?)
            },
            SignatureMethod::Pkcs7Sha1 => {
                let message_digest = digest_alg.digest(&range_digest);
                self.signed_data(digest_alg, Some(range_digest), message_digest)
            },
            SignatureMethod::Pkcs7Detached => self.signed_data(digest_alg, None, range_digest),
        }
    }

    /// DER ContentInfo wrapping a signed-data with a single signer.
    fn signed_data(
        &self,
        digest_alg: DigestAlgorithm,
        content: Option<Vec<u8>>,
        message_digest: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let digest_algorithm = AlgorithmIdentifierOwned {
            oid: digest_alg.oid(),
            parameters: None,
        };

        let signed_attrs: SignedAttributes = SetOfVec::try_from(vec![
            attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA)?)?,
            attribute(ID_SIGNING_TIME, Any::encode_from(&signing_time()?)?)?,
            attribute(ID_MESSAGE_DIGEST, Any::encode_from(&OctetString::new(message_digest)?)?)?,
        ])?;
        let attrs_digest = digest_alg.digest(&signed_attrs.to_der()?);
        let signature = self.key.sign_digest(digest_alg, &attrs_digest)?;

        let tbs = &self.certificate.x509().tbs_certificate;
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: tbs.issuer.clone(),
                serial_number: tbs.serial_number.clone(),
            }),
            digest_alg: digest_algorithm.clone(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: self.key.signature_algorithm(digest_alg)?,
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        let econtent = match content {
            Some(bytes) => Some(Any::encode_from(&OctetString::new(bytes)?)?),
            None => None,
        };
        let certificates = CertificateSet(SetOfVec::try_from(vec![CertificateChoices::Certificate(
            self.certificate.x509().clone(),
        )])?);

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![digest_algorithm])?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent,
            },
            certificates: Some(certificates),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        };

        let content_info = ContentInfo {
            content_type: ID_SIGNED_DATA,
            content: Any::encode_from(&signed_data)?,
        };
        Ok(content_info.to_der()?)
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

fn signing_time() -> Result<UtcTime> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    Ok(UtcTime::from_unix_duration(std::time::Duration::from_secs(now))?)
}

/// `/M` value for the current time, `D:YYYYMMDDHHmmSS+00'00'`.
pub fn format_pdf_date(time: chrono::DateTime<chrono::Utc>) -> String {
    format!("D:{}+00'00'", time.format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use der::{Decode, SliceReader};

    fn rsa() -> (Certificate, PrivateKey) {
        (
            Certificate::from_pem(include_str!("../../tests/fixtures/rsa_cert.pem")).unwrap(),
            PrivateKey::from_pem(include_str!("../../tests/fixtures/rsa_key.pem")).unwrap(),
        )
    }

    #[test]
    fn test_format_pdf_date() {
        let time = chrono::Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        assert_eq!(format_pdf_date(time), "D:20240305140709+00'00'");
    }

    #[test]
    fn test_signer_rejects_foreign_key() {
        let (_, key) = rsa();
        let other = Certificate::from_pem(include_str!("../../tests/fixtures/other_cert.pem")).unwrap();
        assert!(PdfSigner::new(&other, &key, SignatureMethod::Pkcs7Detached).is_err());
    }

    #[test]
    fn test_pkcs1_value_is_octet_string() {
        let (cert, key) = rsa();
        let signer = PdfSigner::new(&cert, &key, SignatureMethod::Pkcs1RsaSha1).unwrap();
        let value = signer.sign(b"range").unwrap();
        assert_eq!(value[0], 0x04);

        let raw = OctetString::from_der(&value).unwrap();
        let digest = DigestAlgorithm::Sha1.digest(b"range");
        assert!(cert.verify_digest(DigestAlgorithm::Sha1, &digest, raw.as_bytes()));
    }

    #[test]
    fn test_detached_cms_structure() {
        let (cert, key) = rsa();
        let signer = PdfSigner::new(&cert, &key, SignatureMethod::Pkcs7Detached).unwrap();
        let mut value = signer.sign(b"range").unwrap();
        // trailing placeholder zeros are tolerated on decode
        value.extend_from_slice(&[0; 16]);

        let mut reader = SliceReader::new(&value).unwrap();
        let info = ContentInfo::decode(&mut reader).unwrap();
        assert_eq!(info.content_type, ID_SIGNED_DATA);
        let signed = SignedData::from_der(&info.content.to_der().unwrap()).unwrap();
        assert!(signed.encap_content_info.econtent.is_none());
        assert_eq!(signed.signer_infos.0.len(), 1);
        assert!(signed.certificates.is_some());
    }

    #[test]
    fn test_attached_cms_carries_range_digest() {
        let (cert, key) = rsa();
        let signer = PdfSigner::new(&cert, &key, SignatureMethod::Pkcs7Sha1).unwrap();
        let value = signer.sign(b"range").unwrap();

        let info = ContentInfo::from_der(&value).unwrap();
        let signed = SignedData::from_der(&info.content.to_der().unwrap()).unwrap();
        let econtent = signed.encap_content_info.econtent.unwrap();
        let content = OctetString::from_der(&econtent.to_der().unwrap()).unwrap();
        assert_eq!(content.as_bytes(), DigestAlgorithm::Sha1.digest(b"range").as_slice());
    }
}
