//! Value nodes of the object graph.
//!
//! `Object` is a closed union over the nine PDF value kinds. Cross-object
//! links are `ObjectRef` identities resolved through the
//! [`ObjectGraph`](crate::graph::ObjectGraph), never owned pointers.

use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Dictionary with insertion-ordered name keys (stored without the leading `/`).
pub type Dictionary = IndexMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (stored without the leading /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(Dictionary),
    /// Stream (dictionary + encoded payload)
    Stream {
        /// Stream dictionary
        dict: Dictionary,
        /// Encoded stream data, as stored in the file
        data: bytes::Bytes,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Identity of an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl From<Dictionary> for Object {
    fn from(d: Dictionary) -> Self {
        Object::Dictionary(d)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Object::Integer(i)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Object::Boolean(b)
    }
}

impl Object {
    /// Build a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Build a string object from bytes or text.
    pub fn string(bytes: impl AsRef<[u8]>) -> Self {
        Object::String(bytes.as_ref().to_vec())
    }

    /// Build a stream object; `Length` is maintained by the serializer.
    pub fn stream(dict: Dictionary, data: impl Into<bytes::Bytes>) -> Self {
        Object::Stream {
            dict,
            data: data.into(),
        }
    }

    /// Get the type name of this object (without data).
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::String(_) => "String",
            Object::Name(_) => "Name",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream { .. } => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a number, accepting integers and reals.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for both Dictionary and Stream objects.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable variant of [`Object::as_dict`].
    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Mutable variant of [`Object::as_array`].
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to real number.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Stream payload as stored (still encoded and, when read from an
    /// encrypted file, still ciphered).
    pub fn stream_data(&self) -> Option<&bytes::Bytes> {
        match self {
            Object::Stream { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Every indirect reference nested in this value, in depth-first order.
    pub fn references(&self) -> Vec<ObjectRef> {
        let mut found = Vec::new();
        self.collect_references(&mut found);
        found
    }

    fn collect_references(&self, found: &mut Vec<ObjectRef>) {
        match self {
            Object::Reference(r) => found.push(*r),
            Object::Array(items) => items.iter().for_each(|item| item.collect_references(found)),
            Object::Dictionary(dict) | Object::Stream { dict, .. } => {
                dict.values().for_each(|item| item.collect_references(found))
            },
            _ => {},
        }
    }

    /// Dictionary lookup that yields `None` for non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Object> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Strict cast: fails with [`Error::TypeMismatch`] on the wrong variant.
    pub fn cast<T: FromObject>(&self) -> Result<T> {
        T::from_object(self).ok_or(Error::TypeMismatch {
            expected: T::EXPECTED,
            found: self.type_name(),
        })
    }

    /// Tolerant cast: the wrong variant coerces to `T::default()`.
    pub fn cast_or_default<T: FromObject>(&self) -> T {
        T::from_object(self).unwrap_or_default()
    }

    /// Filter names of a stream, in application order.
    pub fn stream_filters(&self) -> Vec<String> {
        match self.get("Filter") {
            Some(Object::Name(name)) => vec![name.clone()],
            Some(Object::Array(arr)) => arr
                .iter()
                .filter_map(|obj| obj.as_name().map(|s| s.to_string()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Decode stream data through its filter chain.
    ///
    /// The payload must already be deciphered; decryption always happens
    /// before filters are applied.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => {
                let filters: Vec<String> = self
                    .stream_filters()
                    .into_iter()
                    .filter(|f| f != "Crypt")
                    .collect();
                if filters.is_empty() {
                    return Ok(data.to_vec());
                }
                let params = crate::decoders::DecodeParams::from_object(dict.get("DecodeParms"));
                crate::decoders::decode_stream_with_params(data, &filters, params.as_ref())
            },
            _ => Err(Error::TypeMismatch {
                expected: "Stream",
                found: self.type_name(),
            }),
        }
    }
}

/// Conversion from a graph value into a Rust type, used by the cast accessors.
pub trait FromObject: Sized + Default {
    /// Variant name reported in [`Error::TypeMismatch`].
    const EXPECTED: &'static str;

    /// Extract the value, or `None` on a variant mismatch.
    fn from_object(obj: &Object) -> Option<Self>;
}

impl FromObject for i64 {
    const EXPECTED: &'static str = "Integer";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_integer()
    }
}

impl FromObject for f64 {
    const EXPECTED: &'static str = "Real";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_number()
    }
}

impl FromObject for bool {
    const EXPECTED: &'static str = "Boolean";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_bool()
    }
}

/// Names cast to `String`.
impl FromObject for String {
    const EXPECTED: &'static str = "Name";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_name().map(str::to_string)
    }
}

/// Byte strings cast to `Vec<u8>`.
impl FromObject for Vec<u8> {
    const EXPECTED: &'static str = "String";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_string().map(<[u8]>::to_vec)
    }
}

impl FromObject for Vec<Object> {
    const EXPECTED: &'static str = "Array";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_array().cloned()
    }
}

impl FromObject for Dictionary {
    const EXPECTED: &'static str = "Dictionary";

    fn from_object(obj: &Object) -> Option<Self> {
        obj.as_dict().cloned()
    }
}

/// Build a dictionary from `(key, value)` pairs, keeping their order.
pub fn dict<I, K>(entries: I) -> Dictionary
where
    I: IntoIterator<Item = (K, Object)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
