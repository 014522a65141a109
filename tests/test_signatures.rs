//! Integration tests for signing and verification.
//!
//! Covers:
//! - Every signature method with RSA and P-256 keys
//! - Trust decisions: self-signed leaves, trusted certificates, issuer chains
//! - Verification callbacks
//! - Immutability of a signed document
//! - Tampering detection

use pdf_seal::{
    Certificate, CertificateError, Document, Error, Object, ObjectRef, Page, ParserOptions,
    PrivateKey, SignOptions, SignatureMethod, VerifyContext, VerifyOptions,
};

const METHODS: [SignatureMethod; 3] = [
    SignatureMethod::Pkcs7Sha1,
    SignatureMethod::Pkcs7Detached,
    SignatureMethod::Pkcs1RsaSha1,
];

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rsa() -> (Certificate, PrivateKey) {
    (
        Certificate::from_pem(include_str!("fixtures/rsa_cert.pem")).unwrap(),
        PrivateKey::from_pem(include_str!("fixtures/rsa_key.pem")).unwrap(),
    )
}

fn ec() -> (Certificate, PrivateKey) {
    (
        Certificate::from_pem(include_str!("fixtures/ec_cert.pem")).unwrap(),
        PrivateKey::from_pem(include_str!("fixtures/ec_key.pem")).unwrap(),
    )
}

fn issued() -> (Certificate, PrivateKey) {
    (
        Certificate::from_pem(include_str!("fixtures/issued_cert.pem")).unwrap(),
        PrivateKey::from_pem(include_str!("fixtures/issued_key.pem")).unwrap(),
    )
}

fn other_cert() -> Certificate {
    Certificate::from_pem(include_str!("fixtures/other_cert.pem")).unwrap()
}

fn two_pages() -> Document {
    let mut doc = Document::new();
    doc.append_page(Page::new()).unwrap();
    doc.append_page(Page::new()).unwrap();
    doc
}

/// Sign `doc` and read the signed bytes back.
fn sign_and_reload(mut doc: Document, cert: &Certificate, key: &PrivateKey, options: &SignOptions) -> (Vec<u8>, Document) {
    doc.sign(cert, key, options).unwrap();
    let bytes = doc.to_bytes().unwrap();
    let reread = Document::from_bytes(bytes.clone(), &ParserOptions::strict()).unwrap();
    (bytes, reread)
}

mod method_tests {
    use super::*;

    #[test]
    fn test_every_method_with_rsa_and_ec() {
        init_logging();
        let allow = VerifyOptions::new().allow_self_signed(true);
        for (cert, key) in [rsa(), ec()] {
            for method in METHODS {
                let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::new(method));
                assert!(reread.is_signed(), "{:?} not signed", method);
                assert!(reread.verify(&allow).unwrap(), "{:?} with {} failed", method, cert.subject());

                let signatures = reread.signatures();
                assert_eq!(signatures.len(), 1);
                assert_eq!(signatures[0].method, Some(method));
                assert_eq!(signatures[0].sub_filter.as_deref(), Some(method.sub_filter()));
            }
        }
    }

    #[test]
    fn test_signature_metadata_round_trips() {
        let (cert, key) = rsa();
        let options = SignOptions::default()
            .with_issuer("Jane Signer")
            .with_location("Lisbon")
            .with_contact("jane@example.com")
            .with_reason("Approved");
        let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &options);

        let info = &reread.signatures()[0];
        assert_eq!(info.signer_name.as_deref(), Some("Jane Signer"));
        assert_eq!(info.location.as_deref(), Some("Lisbon"));
        assert_eq!(info.contact_info.as_deref(), Some("jane@example.com"));
        assert_eq!(info.reason.as_deref(), Some("Approved"));
        assert!(info.signing_time.as_deref().is_some_and(|m| m.starts_with("D:")));
        assert_eq!(info.byte_range.len(), 4);
        assert_eq!(info.byte_range[0], 0);
    }

    #[test]
    fn test_sign_into_existing_field() {
        let (cert, key) = rsa();
        let mut doc = two_pages();
        let widget = doc.add_signature_field(2, [50.0, 50.0, 250.0, 100.0]).unwrap();
        let options = SignOptions::default().with_annotation(widget);
        let (_, reread) = sign_and_reload(doc, &cert, &key, &options);

        assert_eq!(reread.signatures().len(), 1);
        let second = reread.get_page(2).unwrap();
        let annots = reread.get_object(second).unwrap().get("Annots").cloned().unwrap();
        let widget = reread.resolve(&reread.resolve(&annots).as_array().unwrap()[0]).clone();
        assert!(widget.get("V").is_some());
        assert!(reread.verify(&VerifyOptions::new().with_trusted_cert(cert)).unwrap());
    }

    #[test]
    fn test_sign_parsed_file() {
        let (cert, key) = ec();
        let data = include_bytes!("fixtures/3_pages.pdf");
        let doc = Document::from_bytes(data.to_vec(), &ParserOptions::strict()).unwrap();
        let (_, reread) = sign_and_reload(doc, &cert, &key, &SignOptions::default());
        assert_eq!(reread.page_count(), 3);
        assert!(reread.verify(&VerifyOptions::new().with_trusted_cert(cert)).unwrap());
    }

    #[test]
    fn test_mismatched_key_is_rejected() {
        let (cert, _) = rsa();
        let (_, key) = ec();
        let mut doc = two_pages();
        assert!(matches!(
            doc.sign(&cert, &key, &SignOptions::default()),
            Err(Error::Signature(_))
        ));
        assert!(!doc.is_frozen());
        assert!(!doc.is_signed());
    }

    #[test]
    fn test_unknown_annotation_is_rejected() {
        let (cert, key) = rsa();
        let mut doc = two_pages();
        let objects = doc.graph().len();
        let options = SignOptions::default().with_annotation(ObjectRef::new(500, 0));
        assert!(matches!(
            doc.sign(&cert, &key, &options),
            Err(Error::ObjectNotFound(500, 0))
        ));
        assert_eq!(doc.graph().len(), objects);
        assert!(doc.signatures().is_empty());

        let number = doc.add_object(Object::Integer(3)).unwrap();
        let options = SignOptions::default().with_annotation(number);
        assert!(matches!(
            doc.sign(&cert, &key, &options),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(doc.signatures().is_empty());
    }

    #[test]
    fn test_capacity_too_small() {
        let (cert, key) = rsa();
        let mut doc = two_pages();
        let objects = doc.graph().len();
        let trailer = doc.trailer().clone();
        let options = SignOptions::default().with_contents_capacity(16);
        assert!(matches!(doc.sign(&cert, &key, &options), Err(Error::Signature(_))));
        assert!(!doc.is_frozen());
        assert!(doc.signatures().is_empty());
        assert_eq!(doc.graph().len(), objects);
        assert_eq!(doc.trailer(), &trailer);
        assert!(doc.catalog().unwrap().get("AcroForm").is_none());
        let first = doc.get_page(1).unwrap();
        assert!(doc.get_object(first).unwrap().get("Annots").is_none());

        doc.sign(&cert, &key, &SignOptions::default()).unwrap();
        assert_eq!(doc.signatures().len(), 1);
    }
}

mod trust_tests {
    use super::*;

    #[test]
    fn test_self_signed_needs_permission() {
        let (cert, key) = rsa();
        let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::default());

        assert!(!reread.verify(&VerifyOptions::new()).unwrap());
        assert!(reread.verify(&VerifyOptions::new().allow_self_signed(true)).unwrap());
    }

    #[test]
    fn test_trusted_certificates() {
        let (cert, key) = rsa();
        let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::default());

        assert!(reread
            .verify(&VerifyOptions::new().with_trusted_cert(cert.clone()))
            .unwrap());
        assert!(!reread
            .verify(&VerifyOptions::new().with_trusted_cert(other_cert()))
            .unwrap());
    }

    #[test]
    fn test_issued_certificate_chains_to_trusted_ca() {
        let (ca, _) = rsa();
        let (cert, key) = issued();
        let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::default());

        assert!(reread.verify(&VerifyOptions::new().with_trusted_cert(ca)).unwrap());
        // the CA is not embedded, so the chain stops at the leaf
        assert!(!reread.verify(&VerifyOptions::new().allow_self_signed(true)).unwrap());
    }

    #[test]
    fn test_verify_in_session() {
        let (cert, key) = ec();
        let mut doc = two_pages();
        doc.sign(&cert, &key, &SignOptions::default()).unwrap();
        assert!(doc.verify(&VerifyOptions::new().with_trusted_cert(cert)).unwrap());
    }

    #[test]
    fn test_unsigned_document_is_an_error() {
        let data = include_bytes!("fixtures/3_pages.pdf");
        let doc = Document::from_bytes(data.to_vec(), &ParserOptions::strict()).unwrap();
        assert!(!doc.is_signed());
        assert!(matches!(doc.verify(&VerifyOptions::new()), Err(Error::Signature(_))));
    }
}

mod callback_tests {
    use super::*;

    #[test]
    fn test_callback_accepts_self_signed() {
        let (cert, key) = rsa();
        let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::default());

        let mut seen = Vec::new();
        let accepted = reread
            .verify_with(&VerifyOptions::new(), |ctx: &VerifyContext| {
                seen.push((ctx.depth, ctx.error, ctx.certificate.subject()));
                ctx.error == CertificateError::DepthZeroSelfSignedCert
            })
            .unwrap();
        assert!(accepted);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[0].1, CertificateError::DepthZeroSelfSignedCert);
        assert_eq!(seen[0].2, cert.subject());
    }

    #[test]
    fn test_callback_overrides_trust() {
        let (cert, key) = rsa();
        let (_, reread) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::default());

        let trusted = VerifyOptions::new().with_trusted_cert(cert);
        assert!(!reread.verify_with(&trusted, |_| false).unwrap());
        assert!(reread.verify_with(&VerifyOptions::new(), |_| true).unwrap());
    }
}

mod immutability_tests {
    use super::*;

    #[test]
    fn test_signed_document_rejects_mutation() {
        let (cert, key) = rsa();
        let mut doc = two_pages();
        doc.sign(&cert, &key, &SignOptions::default()).unwrap();
        assert!(doc.is_signed());
        assert!(doc.is_frozen());

        assert!(matches!(doc.append_page(Page::new()), Err(Error::ImmutableDocument)));
        assert!(matches!(doc.delete_page_at(1), Err(Error::ImmutableDocument)));
        assert!(matches!(
            doc.encrypt(pdf_seal::Cipher::Aes, 128),
            Err(Error::ImmutableDocument)
        ));
        assert!(matches!(
            doc.sign(&cert, &key, &SignOptions::default()),
            Err(Error::ImmutableDocument)
        ));
        assert!(matches!(doc.graph_mut(), Err(Error::ImmutableDocument)));
        assert_eq!(doc.page_count(), 2);
    }

    #[test]
    fn test_signed_bytes_are_stable() {
        let (cert, key) = rsa();
        let mut doc = two_pages();
        doc.sign(&cert, &key, &SignOptions::default()).unwrap();

        let first = doc.to_bytes().unwrap();
        let second = doc.to_bytes().unwrap();
        assert_eq!(first, second);

        let mut saved = Vec::new();
        doc.save(&mut saved).unwrap();
        assert_eq!(saved, first);
    }

    #[test]
    fn test_tampering_breaks_the_signature() {
        let (cert, key) = rsa();
        let (mut bytes, _) = sign_and_reload(two_pages(), &cert, &key, &SignOptions::default());

        // the binary comment on the second line is covered by the first range
        assert_eq!(bytes[9], b'%');
        bytes[10] ^= 0x01;
        let tampered = Document::from_bytes(bytes, &ParserOptions::strict()).unwrap();
        let trusted = VerifyOptions::new().with_trusted_cert(cert);
        assert!(!tampered.verify(&trusted).unwrap());
    }
}
