// Clippy lint configuration
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]

//! # pdf_seal
//!
//! PDF document engine: an object graph with a page tree, a tolerant or
//! strict parser, a serializer for full and incremental saves, the standard
//! security handler and digital signatures.
//!
//! ## Features
//!
//! - **Object graph**: indirect objects keyed by identity, reference
//!   resolution with cycle detection, typed casts
//! - **Page tree**: 1-based page access, insertion, deletion of pages or
//!   whole subtrees with `/Count` kept consistent
//! - **Parser**: classic and stream cross-references, object streams,
//!   `/Prev` chains, reconstruction of broken files in tolerant mode
//! - **Serializer**: full rewrite or incremental update appended after the
//!   original bytes
//! - **Encryption**: RC4 40/128, AES-128, AES-256; objects are deciphered
//!   lazily and enciphered on save
//! - **Signatures**: `adbe.pkcs7.sha1`, `adbe.pkcs7.detached` and
//!   `adbe.x509.rsa_sha1` with RSA or P-256 keys; verification with a trust
//!   policy or a per-certificate callback
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_seal::{Certificate, Document, Page, ParserOptions, PrivateKey, SignOptions, VerifyOptions};
//!
//! # fn main() -> pdf_seal::Result<()> {
//! let mut doc = Document::open("input.pdf", &ParserOptions::default())?;
//! doc.append_page(Page::new())?;
//!
//! let cert = Certificate::from_pem(&std::fs::read_to_string("cert.pem")?)?;
//! let key = PrivateKey::from_pem(&std::fs::read_to_string("key.pem")?)?;
//! doc.sign(&cert, &key, &SignOptions::default())?;
//! doc.save_to_file("signed.pdf")?;
//!
//! let signed = Document::open("signed.pdf", &ParserOptions::default())?;
//! let trusted = VerifyOptions::new().with_trusted_cert(cert);
//! assert!(signed.verify(&trusted)?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Object model
pub mod diagnostics;
pub mod graph;
pub mod object;
pub mod page_tree;

// Parsing
pub mod lexer;
pub mod objstm;
pub mod parser;
pub mod parser_config;
pub mod reader;
pub mod xref;
pub mod xref_reconstruction;

// Stream filters
pub mod decoders;

// Serialization
pub mod writer;

// Security
pub mod encryption;
pub mod signatures;

// Document facade
pub mod document;

pub use document::Document;
pub use encryption::{Cipher, EncryptionOptions, Permissions};
pub use error::{Error, Result};
pub use graph::ObjectGraph;
pub use object::{Dictionary, Object, ObjectRef};
pub use page_tree::{Page, PageKid, PageTreeNode};
pub use parser_config::ParserOptions;
pub use signatures::{
    Certificate, CertificateError, PrivateKey, SignOptions, SignatureInfo, SignatureMethod,
    VerifyContext, VerifyOptions,
};
pub use writer::{SaveMode, SaveOptions};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
