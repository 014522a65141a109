//! Error types for the document engine.
//!
//! One enum covers every failure kind surfaced by the public API: page index
//! bounds, structural parse failures, type mismatches on graph values,
//! password authentication, signatures and writes attempted on a signed
//! document.

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, editing or writing a document.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Page index outside the valid range for the operation
    #[error("Page index {index} out of range (document has {count} pages)")]
    IndexOutOfRange {
        /// Offending index, as passed by the caller
        index: usize,
        /// Number of pages at the time of the call
        count: usize,
    },

    /// Invalid file header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Structural violation at a byte offset
    #[error("Failed to parse at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where the violation was found
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid or broken cross-reference section
    #[error("Invalid cross-reference table: {0}")]
    InvalidXref(String),

    /// Referenced object not present in the graph
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Graph value accessed as the wrong variant
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected object type
        expected: &'static str,
        /// Actual object type found
        found: &'static str,
    },

    /// Unexpected end of input
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// Password does not reproduce the stored check value
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Encryption precondition or cipher failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Signature too large, malformed, or failed digest comparison
    #[error("Signature error: {0}")]
    Signature(String),

    /// Structural mutation attempted after the document was signed
    #[error("Document is signed and can no longer be modified")]
    ImmutableDocument,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Circular reference detected in the page tree or a reference chain
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Signature(format!("DER: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    #[test]
    fn test_index_error_message() {
        let err = Error::IndexOutOfRange { index: 4, count: 3 };
        let msg = format!("{}", err);
        assert!(msg.contains("4"));
        assert!(msg.contains("3 pages"));
    }

    #[test]
    fn test_parse_error() {
        let err = Error::ParseError {
            offset: 1234,
            reason: "invalid token".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1234"));
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn test_object_not_found_error() {
        let err = Error::ObjectNotFound(10, 0);
        assert!(format!("{}", err).contains("10 0 R"));
    }

    #[test]
    fn test_type_mismatch_error() {
        let err = Error::TypeMismatch {
            expected: "Dictionary",
            found: "Array",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Dictionary"));
        assert!(msg.contains("Array"));
    }

    #[test]
    fn test_circular_reference_error() {
        let err = Error::CircularReference(ObjectRef::new(7, 0));
        assert!(format!("{}", err).contains("7 0 R"));
    }

    #[test]
    fn test_immutable_document_error() {
        let msg = format!("{}", Error::ImmutableDocument);
        assert!(msg.contains("signed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
