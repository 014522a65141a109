//! Indirect-object table.
//!
//! The graph owns every indirect object of a document, keyed by identity.
//! Objects link to each other only through [`ObjectRef`] values, so removing
//! an entry from the table is all it takes to drop it; a reference whose
//! target is gone resolves to `Null`.
//!
//! Objects read from an encrypted file keep their ciphered form until first
//! access. The plaintext is then computed once and cached in the entry:
//!
//! ```
//! use pdf_seal::graph::ObjectGraph;
//! use pdf_seal::object::Object;
//!
//! let mut graph = ObjectGraph::new();
//! let r = graph.add_object(Object::string("hello"));
//! assert_eq!(graph.get(r), Some(&Object::string("hello")));
//! assert!(graph.resolve_ref(pdf_seal::object::ObjectRef::new(99, 0)).is_null());
//! ```

use crate::diagnostics::Diagnostics;
use crate::encryption::SecurityHandler;
use crate::error::{Error, Result};
use crate::object::{FromObject, Object, ObjectRef};
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

static NULL: Object = Object::Null;

/// Maximum number of reference hops followed by [`ObjectGraph::resolve`].
const MAX_REFERENCE_CHAIN: usize = 32;

/// One entry of the table: the value as stored plus its plaintext cache.
#[derive(Debug, Clone)]
pub struct IndirectObject {
    raw: Object,
    plain: OnceCell<Object>,
    ciphered: bool,
}

impl IndirectObject {
    /// Entry holding a plaintext value.
    pub fn new(value: Object) -> Self {
        Self {
            raw: value,
            plain: OnceCell::new(),
            ciphered: false,
        }
    }

    /// Entry holding a value still ciphered with the document key.
    pub fn ciphered(raw: Object) -> Self {
        Self {
            raw,
            plain: OnceCell::new(),
            ciphered: true,
        }
    }

    /// Value exactly as stored, before any decryption.
    pub fn raw(&self) -> &Object {
        &self.raw
    }

    /// True when the stored form needs no decryption or the plaintext is
    /// already cached.
    pub fn is_decrypted(&self) -> bool {
        !self.ciphered || self.plain.get().is_some()
    }
}

/// Owner of all indirect objects of one document.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: BTreeMap<ObjectRef, IndirectObject>,
    security: Option<SecurityHandler>,
    dirty: BTreeSet<ObjectRef>,
    removed: BTreeSet<ObjectRef>,
    diagnostics: RefCell<Diagnostics>,
}

impl ObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph recording lookup misses into `diagnostics`.
    pub fn with_diagnostics(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics: RefCell::new(diagnostics),
            ..Self::default()
        }
    }

    /// Add a new object under the next unused number, generation 0.
    pub fn add_object(&mut self, value: Object) -> ObjectRef {
        let reference = ObjectRef::new(self.next_id(), 0);
        self.insert(reference, value);
        reference
    }

    /// Store `value` under `reference`, replacing any previous value.
    pub fn insert(&mut self, reference: ObjectRef, value: Object) {
        self.objects.insert(reference, IndirectObject::new(value));
        self.removed.remove(&reference);
        self.dirty.insert(reference);
    }

    /// Store an object read from a file. Loaded objects are not dirty.
    pub(crate) fn insert_loaded(&mut self, reference: ObjectRef, entry: IndirectObject) {
        self.objects.insert(reference, entry);
    }

    /// Next unused object number.
    pub fn next_id(&self) -> u32 {
        let used = self.objects.keys().map(|r| r.id);
        let removed = self.removed.iter().map(|r| r.id);
        used.chain(removed).max().unwrap_or(0) + 1
    }

    /// Number of objects in the table.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the table is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// True when `reference` names an object in the table.
    pub fn contains(&self, reference: ObjectRef) -> bool {
        self.objects.contains_key(&reference)
    }

    /// Identities of all objects, in ascending order.
    pub fn references(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.objects.keys().copied()
    }

    /// Plaintext value of an object, decrypting and caching it on first access.
    pub fn get(&self, reference: ObjectRef) -> Option<&Object> {
        let entry = self.objects.get(&reference)?;
        if !entry.ciphered {
            return Some(&entry.raw);
        }
        Some(entry.plain.get_or_init(|| self.decrypt_entry(reference, &entry.raw)))
    }

    fn decrypt_entry(&self, reference: ObjectRef, raw: &Object) -> Object {
        let Some(handler) = &self.security else {
            return raw.clone();
        };
        log::debug!("decrypting object {}", reference);
        handler.decrypt_object(reference, raw).unwrap_or_else(|e| {
            self.record(format!("object {} could not be decrypted: {}", reference, e));
            raw.clone()
        })
    }

    /// Stored form of an object, still ciphered when read from an encrypted file.
    pub fn raw(&self, reference: ObjectRef) -> Option<&Object> {
        self.objects.get(&reference).map(IndirectObject::raw)
    }

    /// True when `reference` is present and its plaintext is available
    /// without further decryption.
    pub fn is_decrypted(&self, reference: ObjectRef) -> bool {
        self.objects
            .get(&reference)
            .is_some_and(IndirectObject::is_decrypted)
    }

    /// Mutable access to an object's plaintext. The object becomes dirty.
    pub fn get_mut(&mut self, reference: ObjectRef) -> Option<&mut Object> {
        let entry = self.objects.get(&reference)?;
        if entry.ciphered {
            let plain = match entry.plain.get() {
                Some(plain) => plain.clone(),
                None => self.decrypt_entry(reference, &entry.raw),
            };
            self.objects.insert(reference, IndirectObject::new(plain));
        }
        self.dirty.insert(reference);
        self.objects.get_mut(&reference).map(|entry| &mut entry.raw)
    }

    /// Remove an object from the table.
    pub fn remove(&mut self, reference: ObjectRef) -> Option<Object> {
        let value = self.get(reference).cloned();
        self.objects.remove(&reference)?;
        self.dirty.remove(&reference);
        self.removed.insert(reference);
        value
    }

    /// Follow references until a direct value is reached.
    ///
    /// A dangling reference yields `Null` and records a diagnostic.
    pub fn resolve<'a>(&'a self, value: &'a Object) -> &'a Object {
        let mut current = value;
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current {
                Object::Reference(r) => match self.get(*r) {
                    Some(target) => current = target,
                    None => {
                        self.record(format!("reference {} points to a missing object", r));
                        return &NULL;
                    },
                },
                direct => return direct,
            }
        }
        self.record("reference chain too long".to_string());
        &NULL
    }

    /// Resolve an identity; missing objects yield `Null`.
    pub fn resolve_ref(&self, reference: ObjectRef) -> &Object {
        match self.get(reference) {
            Some(value) => self.resolve(value),
            None => {
                self.record(format!("reference {} points to a missing object", reference));
                &NULL
            },
        }
    }

    /// Strict resolution: a missing target is an error.
    pub fn try_resolve(&self, reference: ObjectRef) -> Result<&Object> {
        let mut current = reference;
        for _ in 0..MAX_REFERENCE_CHAIN {
            match self.get(current) {
                Some(Object::Reference(next)) => current = *next,
                Some(direct) => return Ok(direct),
                None => return Err(Error::ObjectNotFound(current.id, current.gen)),
            }
        }
        Err(Error::CircularReference(reference))
    }

    /// Resolve `value` and cast it. With `strict`, a variant mismatch is a
    /// [`Error::TypeMismatch`]; otherwise it coerces to the default.
    pub fn cast<T: FromObject>(&self, value: &Object, strict: bool) -> Result<T> {
        let resolved = self.resolve(value);
        if strict {
            resolved.cast()
        } else {
            Ok(resolved.cast_or_default())
        }
    }

    /// Decrypt every still-ciphered entry in place.
    pub fn decrypt_all(&mut self) {
        let pending: Vec<ObjectRef> = self
            .objects
            .iter()
            .filter(|(_, entry)| entry.ciphered)
            .map(|(r, _)| *r)
            .collect();
        for reference in pending {
            if let Some(entry) = self.objects.get(&reference) {
                let plain = match entry.plain.get() {
                    Some(plain) => plain.clone(),
                    None => self.decrypt_entry(reference, &entry.raw),
                };
                self.objects.insert(reference, IndirectObject::new(plain));
            }
        }
    }

    /// Security handler used to decrypt and encrypt object content.
    pub fn security(&self) -> Option<&SecurityHandler> {
        self.security.as_ref()
    }

    /// Install or clear the security handler.
    pub fn set_security(&mut self, security: Option<SecurityHandler>) {
        self.security = security;
    }

    /// Objects added or modified since the last [`ObjectGraph::clear_dirty`].
    pub fn dirty(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.dirty.iter().copied()
    }

    /// Objects removed since the last [`ObjectGraph::clear_dirty`].
    pub fn removed(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.removed.iter().copied()
    }

    /// Forget modification tracking, e.g. after an incremental save.
    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
        self.removed.clear();
    }

    /// Diagnostics recorded so far.
    pub fn diagnostics(&self) -> std::cell::Ref<'_, Diagnostics> {
        self.diagnostics.borrow()
    }

    pub(crate) fn record(&self, message: String) {
        self.diagnostics.borrow_mut().record(None, message);
    }

    pub(crate) fn record_at(&self, offset: usize, message: String) {
        self.diagnostics.borrow_mut().record(Some(offset), message);
    }
}
