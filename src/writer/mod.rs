//! Serialization of an object graph back into file bytes.
//!
//! ## Architecture
//!
//! ```text
//! ObjectGraph + trailer
//!     ↓
//! [PdfWriter] (full rewrite or incremental update, xref, trailer)
//!     ↓
//! [ObjectSerializer] (object syntax)
//!     ↓
//! PDF bytes
//! ```

mod object_serializer;
mod pdf_writer;

pub use object_serializer::ObjectSerializer;
pub use pdf_writer::{PdfWriter, SaveMode, SaveOptions, WriteResult, WrittenObject};
