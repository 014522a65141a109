//! The document: object graph, trailer and the operations on them.

use crate::encryption::{Cipher, EncryptionOptions, SecurityHandler};
use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::object::{dict, Dictionary, FromObject, Object, ObjectRef};
use crate::page_tree::{PageKid, PageTree};
use crate::parser_config::ParserOptions;
use crate::reader::{read_document, DEFAULT_VERSION};
use crate::signatures::{
    format_pdf_date, is_signature_dictionary, ByteRangeCalculator, Certificate, PdfSigner,
    PrivateKey, SignOptions, SignatureInfo, SignatureMethod, SignatureVerifier, VerifyCallback,
    VerifyContext, VerifyOptions, BYTE_RANGE_PLACEHOLDER,
};
use crate::writer::{PdfWriter, SaveMode, SaveOptions};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Annotation flags of an invisible signature widget (Print | Locked).
const SIGNATURE_WIDGET_FLAGS: i64 = 4 | 128;

/// `/SigFlags`: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// Bytes a document was read from.
#[derive(Debug, Clone)]
struct Source {
    bytes: Vec<u8>,
    /// Newest cross-reference section, when the chain was intact
    startxref: Option<usize>,
}

/// A PDF document.
///
/// The document owns its [`ObjectGraph`] and trailer. Pages, encryption and
/// signatures are operations over that graph; nothing is written until one
/// of the save methods is called.
///
/// Once [`Document::sign`] succeeds the document is frozen: the signed bytes
/// are kept verbatim, every save writes them unchanged and every mutating
/// operation fails with [`Error::ImmutableDocument`].
///
/// # Example
///
/// ```no_run
/// use pdf_seal::{Document, Page};
///
/// let mut doc = Document::new();
/// doc.append_page(Page::new())?;
/// doc.append_page(Page::new())?;
/// assert_eq!(doc.page_count(), 2);
/// doc.save_to_file("two_pages.pdf")?;
/// # Ok::<(), pdf_seal::Error>(())
/// ```
#[derive(Debug)]
pub struct Document {
    version: (u8, u8),
    graph: ObjectGraph,
    trailer: Dictionary,
    source: Option<Source>,
    /// Output of a successful signing
    signed: Option<Vec<u8>>,
    /// Security handler replaced since the document was read
    security_changed: bool,
    strict: bool,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Empty document: a catalog and an empty page tree.
    pub fn new() -> Self {
        let mut graph = ObjectGraph::new();
        let tree = PageTree::create(&mut graph);
        let catalog = graph.add_object(Object::Dictionary(dict([
            ("Type", Object::name("Catalog")),
            ("Pages", Object::Reference(tree.root())),
        ])));
        let id = Object::String(crate::encryption::random_bytes(16));

        Self {
            version: DEFAULT_VERSION,
            graph,
            trailer: dict([
                ("Root", Object::Reference(catalog)),
                ("ID", Object::Array(vec![id.clone(), id])),
            ]),
            source: None,
            signed: None,
            security_changed: false,
            strict: false,
        }
    }

    /// Read a document from a file.
    pub fn open(path: impl AsRef<Path>, options: &ParserOptions) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("opening {}", path.display());
        Self::from_bytes(std::fs::read(path)?, options)
    }

    /// Read a document from any reader.
    pub fn read<R: Read>(mut reader: R, options: &ParserOptions) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes, options)
    }

    /// Read a document from memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, options: &ParserOptions) -> Result<Self> {
        let bytes = bytes.into();
        let loaded = read_document(&bytes, options)?;
        Ok(Self {
            version: loaded.version,
            graph: loaded.graph,
            trailer: loaded.trailer,
            source: Some(Source {
                bytes,
                startxref: loaded.startxref,
            }),
            signed: None,
            security_changed: false,
            strict: options.strict,
        })
    }

    // ========================================================================
    // Graph access
    // ========================================================================

    /// `%PDF-M.m` version.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Set the version written on full saves.
    pub fn set_version(&mut self, major: u8, minor: u8) -> Result<()> {
        self.ensure_mutable()?;
        self.version = (major, minor);
        Ok(())
    }

    /// Indirect objects.
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// Mutable access to the indirect objects.
    pub fn graph_mut(&mut self) -> Result<&mut ObjectGraph> {
        self.ensure_mutable()?;
        Ok(&mut self.graph)
    }

    /// Trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Object stored under `reference`, decrypted.
    pub fn get_object(&self, reference: ObjectRef) -> Option<&Object> {
        self.graph.get(reference)
    }

    /// Add an indirect object.
    pub fn add_object(&mut self, value: Object) -> Result<ObjectRef> {
        self.ensure_mutable()?;
        Ok(self.graph.add_object(value))
    }

    /// Follow references; dangling ones resolve to `null`.
    pub fn resolve<'a>(&'a self, value: &'a Object) -> &'a Object {
        self.graph.resolve(value)
    }

    /// Resolve and cast `value`. Strict documents fail on a variant
    /// mismatch, tolerant ones fall back to the default value.
    pub fn cast<T: FromObject>(&self, value: &Object) -> Result<T> {
        self.graph.cast(value, self.strict)
    }

    /// Problems recovered from while reading.
    pub fn diagnostics(&self) -> std::cell::Ref<'_, crate::diagnostics::Diagnostics> {
        self.graph.diagnostics()
    }

    fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::ParseError {
                offset: 0,
                reason: "trailer has no /Root".to_string(),
            })
    }

    /// Document catalog.
    pub fn catalog(&self) -> Result<&Dictionary> {
        let value = self.graph.try_resolve(self.catalog_ref()?)?;
        value.as_dict().ok_or(Error::TypeMismatch {
            expected: "Dictionary",
            found: value.type_name(),
        })
    }

    /// Mutable document catalog.
    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        self.ensure_mutable()?;
        let catalog = self.catalog_ref()?;
        dictionary_mut(&mut self.graph, catalog)
    }

    // ========================================================================
    // Pages
    // ========================================================================

    fn page_tree(&self) -> Option<PageTree> {
        let catalog = self.catalog().ok()?;
        catalog.get("Pages").and_then(Object::as_reference).map(PageTree::new)
    }

    fn page_tree_or_create(&mut self) -> Result<PageTree> {
        if let Some(tree) = self.page_tree() {
            return Ok(tree);
        }
        let tree = PageTree::create(&mut self.graph);
        self.catalog_mut()?
            .insert("Pages".to_string(), Object::Reference(tree.root()));
        Ok(tree)
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.page_tree().map_or(0, |tree| tree.count(&self.graph))
    }

    /// Append a page (or a page-tree node with its pages) at the end.
    pub fn append_page(&mut self, page: impl Into<PageKid>) -> Result<ObjectRef> {
        self.ensure_mutable()?;
        let tree = self.page_tree_or_create()?;
        tree.append(&mut self.graph, page)
    }

    /// Insert a page so it lands at 1-based position `index`, in
    /// `1..=page_count() + 1`.
    pub fn insert_page(&mut self, index: usize, page: impl Into<PageKid>) -> Result<ObjectRef> {
        self.ensure_mutable()?;
        let tree = self.page_tree_or_create()?;
        tree.insert(&mut self.graph, index, page)
    }

    /// Page at 1-based position `index`.
    pub fn get_page(&self, index: usize) -> Result<ObjectRef> {
        match self.page_tree() {
            Some(tree) => tree.get(&self.graph, index),
            None => Err(Error::IndexOutOfRange { index, count: 0 }),
        }
    }

    /// Delete the page at 1-based position `index`.
    pub fn delete_page_at(&mut self, index: usize) -> Result<()> {
        self.ensure_mutable()?;
        match self.page_tree() {
            Some(tree) => tree.delete_page_at(&mut self.graph, index),
            None => Err(Error::IndexOutOfRange { index, count: 0 }),
        }
    }

    /// Delete the kids of the page-tree root at the given 0-based
    /// positions; a position naming a page-tree node deletes its subtree.
    pub fn delete_pages_at(&mut self, positions: &[usize]) -> Result<()> {
        self.ensure_mutable()?;
        match self.page_tree() {
            Some(tree) => tree.delete_pages_at(&mut self.graph, positions),
            None if positions.is_empty() => Ok(()),
            None => Err(Error::IndexOutOfRange {
                index: positions[0],
                count: 0,
            }),
        }
    }

    /// All pages in document order.
    pub fn pages(&self) -> Vec<ObjectRef> {
        self.each_page().collect()
    }

    /// Lazy traversal of the pages; each call starts over.
    pub fn each_page(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.page_tree()
            .into_iter()
            .flat_map(move |tree| tree.iter(&self.graph))
    }

    // ========================================================================
    // Encryption
    // ========================================================================

    /// Whether the document has a security handler.
    pub fn is_encrypted(&self) -> bool {
        self.graph.security().is_some()
    }

    /// Encrypt with empty passwords and all permissions.
    pub fn encrypt(&mut self, cipher: Cipher, key_size: u32) -> Result<&mut Self> {
        self.encrypt_with(&EncryptionOptions::new(cipher, key_size))
    }

    /// Encrypt with the given options. Content is enciphered when saved.
    pub fn encrypt_with(&mut self, options: &EncryptionOptions) -> Result<&mut Self> {
        self.ensure_mutable()?;
        let algorithm = options.validate()?;
        let id0 = self.ensure_id();
        let handler = SecurityHandler::new(options, &id0)?;

        self.drop_security();
        let encrypt = self.graph.add_object(Object::Dictionary(handler.to_dictionary()));
        self.trailer.insert("Encrypt".to_string(), Object::Reference(encrypt));
        self.graph.set_security(Some(handler));
        self.security_changed = true;
        log::info!("document will be encrypted with {:?}", algorithm);
        Ok(self)
    }

    /// Remove encryption; the next save writes plain content.
    pub fn decrypt(&mut self) -> Result<&mut Self> {
        self.ensure_mutable()?;
        self.drop_security();
        Ok(self)
    }

    /// Decipher every object with the current handler, then forget it.
    fn drop_security(&mut self) {
        if self.graph.security().is_none() {
            return;
        }
        self.graph.decrypt_all();
        if let Some(Object::Reference(old)) = self.trailer.shift_remove("Encrypt") {
            self.graph.remove(old);
        }
        self.graph.set_security(None);
        self.security_changed = true;
    }

    /// First element of `/ID`, creating the ID pair when absent.
    fn ensure_id(&mut self) -> Vec<u8> {
        let existing = self
            .trailer
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(<[u8]>::to_vec);
        if let Some(id0) = existing {
            return id0;
        }
        let id0 = crate::encryption::random_bytes(16);
        self.trailer.insert(
            "ID".to_string(),
            Object::Array(vec![Object::String(id0.clone()), Object::String(id0.clone())]),
        );
        id0
    }

    /// Keep the first `/ID` element and renew the second.
    fn regenerate_id(&mut self) {
        let id0 = self.ensure_id();
        self.trailer.insert(
            "ID".to_string(),
            Object::Array(vec![
                Object::String(id0),
                Object::String(crate::encryption::random_bytes(16)),
            ]),
        );
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    fn ensure_mutable(&self) -> Result<()> {
        if self.signed.is_some() {
            return Err(Error::ImmutableDocument);
        }
        Ok(())
    }

    /// Whether this document was signed and frozen in this session.
    pub fn is_frozen(&self) -> bool {
        self.signed.is_some()
    }

    /// Whether any signature dictionary holds a signature value.
    pub fn is_signed(&self) -> bool {
        self.signed.is_some() || self.signatures().iter().any(|sig| sig.has_value)
    }

    /// Signature dictionaries present in the graph.
    pub fn signatures(&self) -> Vec<SignatureInfo> {
        self.signature_dictionaries()
            .into_iter()
            .map(|(reference, sig)| SignatureInfo::from_dictionary(Some(reference), sig))
            .collect()
    }

    fn signature_dictionaries(&self) -> Vec<(ObjectRef, &Dictionary)> {
        let mut references: Vec<ObjectRef> = self.graph.references().collect();
        references.sort();
        references
            .into_iter()
            .filter_map(|reference| {
                let sig = self.graph.get(reference)?.as_dict()?;
                is_signature_dictionary(sig).then_some((reference, sig))
            })
            .collect()
    }

    /// Add an empty signature field with its widget on the page at 1-based
    /// position `page`, registered in `/AcroForm`.
    pub fn add_signature_field(&mut self, page: usize, rect: [f64; 4]) -> Result<ObjectRef> {
        self.ensure_mutable()?;
        let page_ref = self.get_page(page)?;
        let widget = self.new_signature_widget(Some(page_ref), rect)?;

        let page_dict = dictionary_mut(&mut self.graph, page_ref)?;
        match page_dict.get("Annots").cloned() {
            Some(Object::Reference(annots)) => {
                let annots = self
                    .graph
                    .get_mut(annots)
                    .and_then(Object::as_array_mut)
                    .ok_or(Error::TypeMismatch {
                        expected: "Array",
                        found: "Reference",
                    })?;
                annots.push(Object::Reference(widget));
            },
            Some(Object::Array(mut annots)) => {
                annots.push(Object::Reference(widget));
                page_dict.insert("Annots".to_string(), Object::Array(annots));
            },
            _ => {
                page_dict.insert(
                    "Annots".to_string(),
                    Object::Array(vec![Object::Reference(widget)]),
                );
            },
        }
        Ok(widget)
    }

    /// Widget annotation merged with a `/FT /Sig` field, listed in `/AcroForm /Fields`.
    fn new_signature_widget(&mut self, page: Option<ObjectRef>, rect: [f64; 4]) -> Result<ObjectRef> {
        let acroform = self.acroform()?;
        let field_count = dictionary_mut(&mut self.graph, acroform)?
            .get("Fields")
            .and_then(Object::as_array)
            .map_or(0, Vec::len);

        let mut widget = dict([
            ("Type", Object::name("Annot")),
            ("Subtype", Object::name("Widget")),
            ("FT", Object::name("Sig")),
            ("T", Object::string(format!("Signature{}", field_count + 1))),
            ("Rect", Object::Array(rect.iter().map(|v| Object::Real(*v)).collect())),
            ("F", Object::Integer(SIGNATURE_WIDGET_FLAGS)),
        ]);
        if let Some(page) = page {
            widget.insert("P".to_string(), Object::Reference(page));
        }
        let widget = self.graph.add_object(Object::Dictionary(widget));

        let form = dictionary_mut(&mut self.graph, acroform)?;
        form.insert("SigFlags".to_string(), Object::Integer(SIG_FLAGS));
        match form
            .entry("Fields".to_string())
            .or_insert_with(|| Object::Array(Vec::new()))
        {
            Object::Array(fields) => fields.push(Object::Reference(widget)),
            other => *other = Object::Array(vec![Object::Reference(widget)]),
        }
        Ok(widget)
    }

    /// The catalog's `/AcroForm`, moved into its own object when inline.
    fn acroform(&mut self) -> Result<ObjectRef> {
        let current = self.catalog()?.get("AcroForm").cloned();
        if let Some(Object::Reference(reference)) = current {
            if self.graph.get(reference).and_then(Object::as_dict).is_some() {
                return Ok(reference);
            }
        }
        let form = match current {
            Some(Object::Dictionary(form)) => form,
            _ => dict([("Fields", Object::Array(Vec::new()))]),
        };
        let reference = self.graph.add_object(Object::Dictionary(form));
        self.catalog_mut()?
            .insert("AcroForm".to_string(), Object::Reference(reference));
        Ok(reference)
    }

    /// Sign the document.
    ///
    /// A signature dictionary is attached to `options.annotation` (or to a
    /// new invisible field on the first page), the document is serialized
    /// once, the byte range around the `/Contents` placeholder is digested
    /// and the signature value is written into the placeholder. The result
    /// is kept as the document's bytes and the document becomes immutable.
    pub fn sign(
        &mut self,
        certificate: &Certificate,
        key: &PrivateKey,
        options: &SignOptions,
    ) -> Result<&mut Self> {
        self.ensure_mutable()?;
        let signer = PdfSigner::new(certificate, key, options.method)?;
        let calculator = ByteRangeCalculator::new(options.contents_capacity);
        if let Some(annotation) = options.annotation {
            let found = self
                .graph
                .get(annotation)
                .ok_or(Error::ObjectNotFound(annotation.id, annotation.gen))?;
            if found.as_dict().is_none() {
                return Err(Error::TypeMismatch {
                    expected: "Dictionary",
                    found: found.type_name(),
                });
            }
        }

        // a failed attempt leaves no trace in the graph or the trailer
        let snapshot = (self.graph.clone(), self.trailer.clone());
        let bytes = match self.attach_signature(certificate, options, &signer, &calculator) {
            Ok(bytes) => bytes,
            Err(e) => {
                (self.graph, self.trailer) = snapshot;
                return Err(e);
            },
        };
        log::info!(
            "signed with {} ({} bytes)",
            options.method.sub_filter(),
            bytes.len()
        );
        self.signed = Some(bytes);
        Ok(self)
    }

    /// Add the signature dictionary, hang it on its field and write the signed file.
    fn attach_signature(
        &mut self,
        certificate: &Certificate,
        options: &SignOptions,
        signer: &PdfSigner<'_>,
        calculator: &ByteRangeCalculator,
    ) -> Result<Vec<u8>> {
        self.regenerate_id();
        let sig_ref = self
            .graph
            .add_object(Object::Dictionary(signature_dictionary(certificate, options)));
        let annotation = match options.annotation {
            Some(annotation) => annotation,
            None if self.page_count() > 0 => self.add_signature_field(1, [0.0; 4])?,
            None => self.new_signature_widget(None, [0.0; 4])?,
        };
        dictionary_mut(&mut self.graph, annotation)?.insert("V".to_string(), Object::Reference(sig_ref));
        self.write_signed(signer, calculator, sig_ref)
    }

    /// Serialize once, fill the byte range and the signature value, and
    /// mirror both into the signature dictionary `sig_ref`.
    fn write_signed(
        &mut self,
        signer: &PdfSigner<'_>,
        calculator: &ByteRangeCalculator,
        sig_ref: ObjectRef,
    ) -> Result<Vec<u8>> {
        let written = PdfWriter::new(&self.graph, &self.trailer, SaveOptions::full_rewrite())
            .write_full(self.version)?;
        let mut bytes = written.bytes;
        let sig_offset = written
            .objects
            .get(&sig_ref)
            .map(|w| w.offset)
            .ok_or_else(|| Error::Signature("signature dictionary was not written".to_string()))?;

        let missing = || Error::Signature("signature placeholders not found in output".to_string());
        let range_offset =
            ByteRangeCalculator::find_byte_range_offset(&bytes, sig_offset).ok_or_else(missing)?;
        let contents_offset =
            ByteRangeCalculator::find_contents_offset(&bytes, sig_offset).ok_or_else(missing)?;

        let byte_range = calculator.calculate_byte_range(bytes.len(), contents_offset);
        ByteRangeCalculator::patch_byte_range(&mut bytes, range_offset, &byte_range)?;
        let signed_bytes = ByteRangeCalculator::extract_signed_bytes(&bytes, &byte_range)?;
        let signature = signer.sign(&signed_bytes)?;
        calculator.insert_signature(&mut bytes, contents_offset, &signature)?;
        log::debug!("ByteRange {:?}", byte_range);

        let mut contents = signature;
        contents.resize(calculator.capacity(), 0);
        let sig = dictionary_mut(&mut self.graph, sig_ref)?;
        sig.insert(
            "ByteRange".to_string(),
            Object::Array(byte_range.iter().map(|v| Object::Integer(*v)).collect()),
        );
        sig.insert("Contents".to_string(), Object::String(contents));
        Ok(bytes)
    }

    /// Verify every signature under the trust policy in `options`.
    ///
    /// Returns `Ok(false)` when a signature does not verify or its chain is
    /// rejected, and an error when the document carries no signature.
    pub fn verify(&self, options: &VerifyOptions) -> Result<bool> {
        self.verify_signatures(options, None)
    }

    /// Verify with a trust callback. The callback sees every certificate of
    /// each chain, leaf first, and its answer replaces the default decision.
    pub fn verify_with<F>(&self, options: &VerifyOptions, mut callback: F) -> Result<bool>
    where
        F: FnMut(&VerifyContext) -> bool,
    {
        self.verify_signatures(options, Some(&mut callback as &mut VerifyCallback<'_>))
    }

    fn verify_signatures(&self, options: &VerifyOptions, mut callback: Option<&mut VerifyCallback<'_>>) -> Result<bool> {
        let data = match (&self.signed, &self.source) {
            (Some(signed), _) => signed.as_slice(),
            (None, Some(source)) => source.bytes.as_slice(),
            (None, None) => {
                return Err(Error::Signature("document has no file bytes to verify".to_string()))
            },
        };

        let signatures: Vec<(SignatureInfo, Vec<u8>, Vec<Certificate>)> = self
            .signature_dictionaries()
            .into_iter()
            .map(|(reference, sig)| {
                let info = SignatureInfo::from_dictionary(Some(reference), sig);
                let contents = sig.get("Contents").and_then(Object::as_string).unwrap_or_default().to_vec();
                (info, contents, self.embedded_certs(sig))
            })
            .filter(|(info, _, _)| info.has_value)
            .collect();
        if signatures.is_empty() {
            return Err(Error::Signature("document is not signed".to_string()));
        }

        let mut valid = true;
        for (info, contents, certs) in &signatures {
            let verifier = SignatureVerifier::new(data, info, contents, certs);
            valid &= verifier.verify(options, callback.as_deref_mut());
        }
        Ok(valid)
    }

    /// `/Cert` of an `adbe.x509.rsa_sha1` signature: one string or an array.
    fn embedded_certs(&self, sig: &Dictionary) -> Vec<Certificate> {
        let Some(value) = sig.get("Cert") else {
            return Vec::new();
        };
        let strings: Vec<&[u8]> = match self.graph.resolve(value) {
            Object::String(der) => vec![der.as_slice()],
            Object::Array(items) => items.iter().filter_map(Object::as_string).collect(),
            _ => Vec::new(),
        };
        strings
            .into_iter()
            .filter_map(|der| Certificate::from_der(der).ok())
            .collect()
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Write a full rewrite to `sink`.
    pub fn save<W: Write>(&mut self, sink: W) -> Result<()> {
        self.save_with_options(sink, SaveOptions::default())
    }

    /// Write to `sink` with explicit options.
    pub fn save_with_options<W: Write>(&mut self, mut sink: W, options: SaveOptions) -> Result<()> {
        let bytes = self.write_bytes(&options)?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(())
    }

    /// Write a full rewrite to a file.
    pub fn save_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.save(BufWriter::new(file))
    }

    /// Full rewrite in memory.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.write_bytes(&SaveOptions::default())
    }

    fn write_bytes(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        if let Some(signed) = &self.signed {
            log::debug!("writing signed bytes unchanged");
            return Ok(signed.clone());
        }

        self.regenerate_id();
        let writer = PdfWriter::new(&self.graph, &self.trailer, options.clone());
        let result = match options.mode {
            SaveMode::Full => writer.write_full(self.version)?,
            SaveMode::Incremental => {
                let source = self.source.as_ref().ok_or_else(|| {
                    Error::Unsupported("incremental save needs a document read from bytes".to_string())
                })?;
                let startxref = source.startxref.ok_or_else(|| {
                    Error::Unsupported(
                        "incremental save needs an intact cross-reference chain".to_string(),
                    )
                })?;
                if self.security_changed {
                    return Err(Error::Unsupported(
                        "encryption changed since reading; use a full save".to_string(),
                    ));
                }
                writer.write_incremental(&source.bytes, startxref)?
            },
        };
        Ok(result.bytes)
    }
}

/// Signature dictionary with its placeholders. `/ByteRange` and
/// `/Contents` come first so the placeholders are found before any
/// caller-supplied text.
fn signature_dictionary(certificate: &Certificate, options: &SignOptions) -> Dictionary {
    let mut sig = dict([
        ("Type", Object::name("Sig")),
        ("Filter", Object::name("Adobe.PPKLite")),
        ("SubFilter", Object::name(options.method.sub_filter())),
        (
            "ByteRange",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
                Object::Integer(BYTE_RANGE_PLACEHOLDER),
            ]),
        ),
        ("Contents", Object::String(vec![0; options.contents_capacity])),
    ]);
    if options.method == SignatureMethod::Pkcs1RsaSha1 {
        sig.insert("Cert".to_string(), Object::String(certificate.to_der().to_vec()));
    }
    let texts = [
        ("Name", &options.issuer),
        ("Location", &options.location),
        ("ContactInfo", &options.contact),
        ("Reason", &options.reason),
    ];
    for (key, value) in texts {
        if let Some(value) = value {
            sig.insert(key.to_string(), Object::string(value));
        }
    }
    sig.insert("M".to_string(), Object::string(format_pdf_date(chrono::Utc::now())));
    sig
}

fn dictionary_mut(graph: &mut ObjectGraph, reference: ObjectRef) -> Result<&mut Dictionary> {
    let value = graph
        .get_mut(reference)
        .ok_or(Error::ObjectNotFound(reference.id, reference.gen))?;
    let found = value.type_name();
    value.as_dict_mut().ok_or(Error::TypeMismatch {
        expected: "Dictionary",
        found,
    })
}
