//! Signature verification.
//!
//! Verification runs in two stages. The cryptographic stage recomputes the
//! byte-range digest and checks the stored value against it with the
//! embedded signing certificate. The trust stage builds a chain from that
//! certificate through the embedded certificates and the caller's trust
//! anchors, assigns a [`CertificateError`] to each link, and lets the trust
//! policy (or a callback) accept or reject every link.

use super::byterange::ByteRangeCalculator;
use super::credentials::Certificate;
use super::signer::{ID_MESSAGE_DIGEST, ID_SIGNED_DATA};
use super::types::{
    CertificateError, DigestAlgorithm, SignatureInfo, SignatureMethod, VerifyContext, VerifyOptions,
};
use crate::error::{Error, Result};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::OctetString;
use der::{Decode, Encode, SliceReader};

/// Trust callback: receives each chain link, leaf first, and returns
/// whether to accept it.
pub type VerifyCallback<'c> = dyn FnMut(&VerifyContext) -> bool + 'c;

/// Cryptographically checked signature awaiting the trust decision.
#[derive(Debug)]
pub struct CheckedSignature {
    /// Signing certificate
    pub signer: Certificate,
    /// Other certificates found next to it
    pub embedded: Vec<Certificate>,
}

/// Verifier for one signature of a file.
#[derive(Debug)]
pub struct SignatureVerifier<'a> {
    pdf_data: &'a [u8],
    info: &'a SignatureInfo,
    contents: &'a [u8],
    certs: &'a [Certificate],
}

impl<'a> SignatureVerifier<'a> {
    /// Verifier over the file bytes and the entries of its signature
    /// dictionary. `certs` holds the `/Cert` certificates, which only
    /// `adbe.x509.rsa_sha1` signatures use.
    pub fn new(
        pdf_data: &'a [u8],
        info: &'a SignatureInfo,
        contents: &'a [u8],
        certs: &'a [Certificate],
    ) -> Self {
        Self {
            pdf_data,
            info,
            contents,
            certs,
        }
    }

    /// Full verification: cryptographic check, then the trust decision.
    pub fn verify(&self, options: &VerifyOptions, callback: Option<&mut VerifyCallback<'_>>) -> bool {
        let checked = match self.check() {
            Ok(checked) => checked,
            Err(e) => {
                log::warn!("signature check failed: {}", e);
                return false;
            },
        };
        let chain = build_chain(&checked.signer, &checked.embedded, &options.trusted_certs);
        decide(&chain, options, callback)
    }

    /// Cryptographic stage.
    pub fn check(&self) -> Result<CheckedSignature> {
        let byte_range = self
            .info
            .byte_range_array()
            .ok_or_else(|| Error::Signature("ByteRange must have four entries".to_string()))?;
        ByteRangeCalculator::validate_byte_range(&byte_range, self.pdf_data.len())?;
        let signed_bytes = ByteRangeCalculator::extract_signed_bytes(self.pdf_data, &byte_range)?;

        match self.info.method {
            Some(SignatureMethod::Pkcs1RsaSha1) => self.check_pkcs1(&signed_bytes),
            Some(SignatureMethod::Pkcs7Sha1) | Some(SignatureMethod::Pkcs7Detached) => {
                self.check_cms(&signed_bytes)
            },
            None => Err(Error::Signature(format!(
                "unsupported sub filter {:?}",
                self.info.sub_filter
            ))),
        }
    }

    fn check_pkcs1(&self, signed_bytes: &[u8]) -> Result<CheckedSignature> {
        let signature = OctetString::decode(&mut SliceReader::new(self.contents)?)?;
        let digest_alg = DigestAlgorithm::Sha1;
        let digest = digest_alg.digest(signed_bytes);

        let (signer, rest) = self
            .certs
            .split_first()
            .ok_or_else(|| Error::Signature("no /Cert for a PKCS#1 signature".to_string()))?;
        if !signer.verify_digest(digest_alg, &digest, signature.as_bytes()) {
            return Err(Error::Signature("PKCS#1 signature does not match the byte range".to_string()));
        }
        Ok(CheckedSignature {
            signer: signer.clone(),
            embedded: rest.to_vec(),
        })
    }

    fn check_cms(&self, signed_bytes: &[u8]) -> Result<CheckedSignature> {
        // /Contents is zero-padded past the DER value
        let content_info = ContentInfo::decode(&mut SliceReader::new(self.contents)?)?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::Signature(format!(
                "expected signed-data, found {}",
                content_info.content_type
            )));
        }
        let signed_data = SignedData::from_der(&content_info.content.to_der()?)?;

        let certificates = embedded_certificates(&signed_data)?;
        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Signature("signed-data has no signer".to_string()))?;
        let digest_alg = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid).ok_or_else(|| {
            Error::Signature(format!("unsupported digest algorithm {}", signer_info.digest_alg.oid))
        })?;

        let signed_content = match &signed_data.encap_content_info.econtent {
            Some(econtent) => {
                let content = OctetString::from_der(&econtent.to_der()?)?;
                if content.as_bytes() != DigestAlgorithm::Sha1.digest(signed_bytes).as_slice() {
                    return Err(Error::Signature(
                        "encapsulated digest does not match the byte range".to_string(),
                    ));
                }
                content.as_bytes().to_vec()
            },
            None => signed_bytes.to_vec(),
        };
        let content_digest = digest_alg.digest(&signed_content);

        let signer = find_signer(signer_info, &certificates)
            .ok_or_else(|| Error::Signature("signing certificate not embedded".to_string()))?;

        let verified_digest = match &signer_info.signed_attrs {
            Some(attrs) => {
                let message_digest = attrs
                    .iter()
                    .find(|attr| attr.oid == ID_MESSAGE_DIGEST)
                    .and_then(|attr| attr.values.iter().next())
                    .ok_or_else(|| Error::Signature("missing messageDigest attribute".to_string()))?;
                let message_digest = OctetString::from_der(&message_digest.to_der()?)?;
                if message_digest.as_bytes() != content_digest.as_slice() {
                    return Err(Error::Signature("message digest does not match the byte range".to_string()));
                }
                digest_alg.digest(&attrs.to_der()?)
            },
            None => content_digest,
        };

        if !signer.verify_digest(digest_alg, &verified_digest, signer_info.signature.as_bytes()) {
            return Err(Error::Signature("CMS signature value does not verify".to_string()));
        }

        let embedded = certificates.into_iter().filter(|c| *c != signer).collect();
        Ok(CheckedSignature { signer, embedded })
    }
}

fn embedded_certificates(signed_data: &SignedData) -> Result<Vec<Certificate>> {
    let Some(set) = &signed_data.certificates else {
        return Ok(Vec::new());
    };
    set.0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(Certificate::from_x509(cert.clone())),
            _ => None,
        })
        .collect()
}

fn find_signer(signer_info: &SignerInfo, certificates: &[Certificate]) -> Option<Certificate> {
    let matched = match &signer_info.sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => certificates.iter().find(|cert| {
            let tbs = &cert.x509().tbs_certificate;
            tbs.issuer == id.issuer && tbs.serial_number == id.serial_number
        }),
        _ => None,
    };
    matched.or_else(|| certificates.first()).cloned()
}

/// One certificate of a built chain with the defect found for it.
#[derive(Debug, Clone)]
pub struct ChainLink {
    /// Certificate
    pub certificate: Certificate,
    /// Defect
    pub error: CertificateError,
}

/// Build the chain from `leaf`, looking issuers up in `embedded` then
/// `trusted`. The chain stops at a trusted certificate, a self-issued one,
/// or a certificate whose issuer cannot be found.
pub fn build_chain(leaf: &Certificate, embedded: &[Certificate], trusted: &[Certificate]) -> Vec<ChainLink> {
    let now = chrono::Utc::now().timestamp();
    let mut chain: Vec<ChainLink> = Vec::new();
    let mut current = leaf.clone();

    loop {
        let depth = chain.len();
        let time_error = validity_error(&current, now);

        if trusted.contains(&current) {
            chain.push(link(current, None, time_error));
            break;
        }

        if current.is_self_issued() {
            let issuer_error = if !current.verifies(&current) {
                CertificateError::CertSignatureFailure
            } else if depth == 0 {
                CertificateError::DepthZeroSelfSignedCert
            } else {
                CertificateError::SelfSignedCertInChain
            };
            chain.push(link(current, Some(issuer_error), time_error));
            break;
        }

        let issuer = embedded
            .iter()
            .chain(trusted)
            .find(|candidate| {
                candidate.is_issuer_of(&current) && !chain.iter().any(|l| l.certificate == **candidate)
            })
            .cloned();
        match issuer {
            Some(issuer) => {
                let issuer_error =
                    (!issuer.verifies(&current)).then_some(CertificateError::CertSignatureFailure);
                chain.push(link(current, issuer_error, time_error));
                current = issuer;
            },
            None => {
                chain.push(link(
                    current,
                    Some(CertificateError::UnableToGetIssuerCertLocally),
                    time_error,
                ));
                break;
            },
        }
    }
    chain
}

fn link(certificate: Certificate, issuer_error: Option<CertificateError>, time_error: Option<CertificateError>) -> ChainLink {
    ChainLink {
        certificate,
        error: issuer_error.or(time_error).unwrap_or(CertificateError::Ok),
    }
}

fn validity_error(cert: &Certificate, now: i64) -> Option<CertificateError> {
    match cert.validity() {
        Ok((not_before, _)) if now < not_before => Some(CertificateError::CertNotYetValid),
        Ok((_, not_after)) if now > not_after => Some(CertificateError::CertHasExpired),
        Ok(_) => None,
        Err(_) => Some(CertificateError::CertSignatureFailure),
    }
}

/// Apply the trust policy to every link; a callback replaces the default
/// decision for each link it sees.
pub fn decide(chain: &[ChainLink], options: &VerifyOptions, mut callback: Option<&mut VerifyCallback<'_>>) -> bool {
    let mut accepted = true;
    for (depth, link) in chain.iter().enumerate() {
        let default = match link.error {
            CertificateError::Ok => true,
            error if error.is_self_signed() => options.allow_self_signed,
            _ => false,
        };
        let decision = match callback.as_deref_mut() {
            Some(callback) => callback(&VerifyContext {
                certificate: link.certificate.clone(),
                depth,
                error: link.error,
            }),
            None => default,
        };
        if !decision {
            log::info!(
                "rejecting certificate {} at depth {}: {}",
                link.certificate.subject(),
                depth,
                link.error
            );
        }
        accepted &= decision;
    }
    accepted && !chain.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(name: &str) -> Certificate {
        let pem = std::fs::read_to_string(format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)).unwrap();
        Certificate::from_pem(pem).unwrap()
    }

    #[test]
    fn test_self_signed_leaf() {
        let leaf = cert("rsa_cert.pem");
        let chain = build_chain(&leaf, &[], &[]);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].error, CertificateError::DepthZeroSelfSignedCert);

        assert!(!decide(&chain, &VerifyOptions::default(), None));
        assert!(decide(&chain, &VerifyOptions::new().allow_self_signed(true), None));
    }

    #[test]
    fn test_trusted_leaf() {
        let leaf = cert("rsa_cert.pem");
        let trusted = vec![leaf.clone()];
        let chain = build_chain(&leaf, &[], &trusted);
        assert_eq!(chain[0].error, CertificateError::Ok);

        let unrelated = vec![cert("other_cert.pem")];
        let chain = build_chain(&leaf, &[], &unrelated);
        assert_eq!(chain[0].error, CertificateError::DepthZeroSelfSignedCert);
    }

    #[test]
    fn test_issued_leaf_chains_to_ca() {
        let leaf = cert("issued_cert.pem");
        let ca = cert("rsa_cert.pem");

        let orphan = build_chain(&leaf, &[], &[]);
        assert_eq!(orphan[0].error, CertificateError::UnableToGetIssuerCertLocally);

        let chain = build_chain(&leaf, &[], &[ca.clone()]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].error, CertificateError::Ok);
        assert_eq!(chain[1].certificate, ca);
        assert!(decide(&chain, &VerifyOptions::default(), None));

        let untrusted = build_chain(&leaf, &[ca], &[]);
        assert_eq!(untrusted[1].error, CertificateError::SelfSignedCertInChain);
    }

    #[test]
    fn test_callback_overrides_and_sees_every_link() {
        let leaf = cert("issued_cert.pem");
        let ca = cert("rsa_cert.pem");
        let chain = build_chain(&leaf, &[ca], &[]);

        let mut seen = Vec::new();
        let mut callback = |ctx: &VerifyContext| {
            seen.push((ctx.depth, ctx.error));
            ctx.error == CertificateError::Ok || ctx.error == CertificateError::SelfSignedCertInChain
        };
        assert!(decide(
            &chain,
            &VerifyOptions::default(),
            Some(&mut callback as &mut VerifyCallback<'_>)
        ));
        assert_eq!(
            seen,
            vec![(0, CertificateError::Ok), (1, CertificateError::SelfSignedCertInChain)]
        );
    }
}
