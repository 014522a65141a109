//! Document writer.
//!
//! Two layouts are produced:
//!
//! - a full rewrite: header, every object reachable from the trailer
//!   renumbered from 1 in discovery order, one cross-reference table and a
//!   trailer without `/Prev`;
//! - an incremental update: the original bytes untouched, followed by the
//!   objects changed since reading, a cross-reference section for just
//!   those objects and a trailer whose `/Prev` points at the previous one.
//!
//! Strings and streams are enciphered here, with the identity the object is
//! written under, when the graph carries a security handler.

use super::object_serializer::ObjectSerializer;
use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;

/// Trailer keys carried from one revision to the next.
const TRAILER_KEYS: [&str; 4] = ["Root", "Info", "Encrypt", "ID"];

/// Layout of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Rewrite the whole file
    #[default]
    Full,
    /// Append changed objects to the bytes the document was read from
    Incremental,
}

/// Options for a save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Full rewrite or incremental update
    pub mode: SaveMode,
    /// Flate-compress streams that have no filter yet
    pub compress_streams: bool,
}

impl SaveOptions {
    /// Full rewrite, streams as they are.
    pub fn full_rewrite() -> Self {
        Self::default()
    }

    /// Incremental update.
    pub fn incremental() -> Self {
        Self {
            mode: SaveMode::Incremental,
            compress_streams: false,
        }
    }

    /// Compress unfiltered streams with FlateDecode.
    pub fn with_compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }
}

/// Where one graph object ended up in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenObject {
    /// Identity used in the file
    pub reference: ObjectRef,
    /// Byte offset of its `N G obj` header
    pub offset: usize,
}

/// Output of a save.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// The file
    pub bytes: Vec<u8>,
    /// Placement of every written object, keyed by its identity in the graph
    pub objects: BTreeMap<ObjectRef, WrittenObject>,
    /// Offset of the cross-reference section just written
    pub startxref: usize,
}

fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Serializes a graph with its trailer.
#[derive(Debug)]
pub struct PdfWriter<'g> {
    graph: &'g ObjectGraph,
    trailer: &'g Dictionary,
    options: SaveOptions,
    serializer: ObjectSerializer,
}

impl<'g> PdfWriter<'g> {
    /// Writer over `graph`, whose entry points are named by `trailer`.
    pub fn new(graph: &'g ObjectGraph, trailer: &'g Dictionary, options: SaveOptions) -> Self {
        Self {
            graph,
            trailer,
            options,
            serializer: ObjectSerializer::new(),
        }
    }

    fn encrypt_ref(&self) -> Option<ObjectRef> {
        self.trailer.get("Encrypt").and_then(Object::as_reference)
    }

    fn check_encryption(&self) -> Result<()> {
        if self.graph.security().is_some() && self.encrypt_ref().is_none() {
            return Err(Error::Encryption(
                "document has a security handler but the trailer has no /Encrypt reference"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Final form of one object: compressed if asked, then enciphered as `written_as`.
    fn prepare(&self, original: ObjectRef, written_as: ObjectRef, value: Object) -> Result<Object> {
        let value = if self.options.compress_streams {
            compress_stream(value)?
        } else {
            value
        };
        match self.graph.security() {
            Some(handler) if Some(original) != self.encrypt_ref() => {
                handler.encrypt_object(written_as, &value)
            },
            _ => Ok(value),
        }
    }

    /// Full rewrite.
    pub fn write_full(&self, version: (u8, u8)) -> Result<WriteResult> {
        self.check_encryption()?;
        let root = self
            .trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::Unsupported("cannot save a document without /Root".to_string()))?;

        let order = self.reachable_from_trailer(root);
        let renumber: HashMap<ObjectRef, ObjectRef> = order
            .iter()
            .enumerate()
            .map(|(i, r)| (*r, ObjectRef::new(i as u32 + 1, 0)))
            .collect();
        log::debug!(
            "full rewrite of {} reachable objects out of {}",
            order.len(),
            self.graph.len()
        );

        let mut out = format!("%PDF-{}.{}\n", version.0, version.1).into_bytes();
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut objects = BTreeMap::new();
        for original in &order {
            let written_as = renumber[original];
            let value = self.graph.get(*original).cloned().unwrap_or(Object::Null);
            let value = self.prepare(*original, written_as, remap(&value, &renumber))?;
            objects.insert(
                *original,
                WrittenObject {
                    reference: written_as,
                    offset: out.len(),
                },
            );
            out.extend_from_slice(&self.serializer.serialize_indirect(written_as, &value));
        }

        let startxref = out.len();
        write!(out, "xref\n0 {}\n0000000000 65535 f \n", order.len() + 1)?;
        for original in &order {
            write!(out, "{:010} {:05} n \n", objects[original].offset, 0)?;
        }

        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(order.len() as i64 + 1));
        for key in TRAILER_KEYS {
            if let Some(value) = self.trailer.get(key) {
                trailer.insert(key.to_string(), remap(value, &renumber));
            }
        }
        self.write_trailer(&mut out, &trailer, startxref)?;

        Ok(WriteResult {
            bytes: out,
            objects,
            startxref,
        })
    }

    /// Incremental update appended to `source`, whose newest section is at `prev_startxref`.
    pub fn write_incremental(&self, source: &[u8], prev_startxref: usize) -> Result<WriteResult> {
        self.check_encryption()?;
        let mut out = source.to_vec();
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }

        let mut lines: BTreeMap<u32, String> = BTreeMap::new();
        let mut objects = BTreeMap::new();
        let changed: Vec<ObjectRef> = self.graph.dirty().collect();
        for reference in changed {
            let Some(value) = self.graph.get(reference).cloned() else {
                continue;
            };
            let value = self.prepare(reference, reference, value)?;
            let offset = out.len();
            out.extend_from_slice(&self.serializer.serialize_indirect(reference, &value));
            objects.insert(reference, WrittenObject { reference, offset });
            lines.insert(reference.id, format!("{:010} {:05} n \n", offset, reference.gen));
        }
        for reference in self.graph.removed() {
            if !self.graph.contains(reference) {
                let next_gen = reference.gen.saturating_add(1);
                lines.insert(reference.id, format!("{:010} {:05} f \n", 0, next_gen));
            }
        }
        log::debug!("incremental update with {} changed entries", lines.len());

        let startxref = out.len();
        out.extend_from_slice(b"xref\n");
        for (start, run) in contiguous_runs(&lines) {
            writeln!(out, "{} {}", start, run.len())?;
            for line in run {
                out.extend_from_slice(line.as_bytes());
            }
        }

        let previous_size = self.trailer.get("Size").and_then(Object::as_integer).unwrap_or(0);
        let max_id = self.graph.references().map(|r| r.id).max().unwrap_or(0) as i64;
        let mut trailer = Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(previous_size.max(max_id + 1)));
        for key in TRAILER_KEYS {
            if let Some(value) = self.trailer.get(key) {
                trailer.insert(key.to_string(), value.clone());
            }
        }
        trailer.insert("Prev".to_string(), Object::Integer(prev_startxref as i64));
        self.write_trailer(&mut out, &trailer, startxref)?;

        Ok(WriteResult {
            bytes: out,
            objects,
            startxref,
        })
    }

    fn write_trailer(&self, out: &mut Vec<u8>, trailer: &Dictionary, startxref: usize) -> Result<()> {
        out.extend_from_slice(b"trailer\n");
        self.serializer
            .write_object(out, &Object::Dictionary(trailer.clone()));
        write!(out, "\nstartxref\n{}\n%%EOF\n", startxref)?;
        Ok(())
    }

    /// Breadth-first walk from the trailer entries, in discovery order.
    fn reachable_from_trailer(&self, root: ObjectRef) -> Vec<ObjectRef> {
        let mut queue: VecDeque<ObjectRef> = VecDeque::from([root]);
        for key in ["Info", "Encrypt"] {
            if let Some(r) = self.trailer.get(key).and_then(Object::as_reference) {
                queue.push_back(r);
            }
        }

        let mut seen = std::collections::HashSet::new();
        let mut order = Vec::new();
        while let Some(reference) = queue.pop_front() {
            if !seen.insert(reference) {
                continue;
            }
            let Some(value) = self.graph.get(reference) else {
                log::debug!("dropping dangling reference {}", reference);
                continue;
            };
            order.push(reference);
            queue.extend(value.references());
        }
        order
    }
}

/// Rewrite references through `map`; references to unwritten objects become `null`.
fn remap(value: &Object, map: &HashMap<ObjectRef, ObjectRef>) -> Object {
    match value {
        Object::Reference(r) => map.get(r).map_or(Object::Null, |r| Object::Reference(*r)),
        Object::Array(items) => Object::Array(items.iter().map(|item| remap(item, map)).collect()),
        Object::Dictionary(dict) => Object::Dictionary(remap_dict(dict, map)),
        Object::Stream { dict, data } => Object::Stream {
            dict: remap_dict(dict, map),
            data: data.clone(),
        },
        other => other.clone(),
    }
}

fn remap_dict(dict: &Dictionary, map: &HashMap<ObjectRef, ObjectRef>) -> Dictionary {
    dict.iter()
        .map(|(key, value)| (key.clone(), remap(value, map)))
        .collect()
}

fn compress_stream(value: Object) -> Result<Object> {
    match value {
        Object::Stream { mut dict, data }
            if !data.is_empty()
                && !dict.contains_key("Filter")
                && dict.get("Type").and_then(Object::as_name) != Some("Metadata") =>
        {
            let compressed = compress_data(&data)?;
            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
            dict.shift_remove("DecodeParms");
            Ok(Object::stream(dict, compressed))
        },
        other => Ok(other),
    }
}

/// Group `(id, line)` pairs into runs of consecutive ids.
fn contiguous_runs(lines: &BTreeMap<u32, String>) -> Vec<(u32, Vec<&String>)> {
    let mut runs: Vec<(u32, Vec<&String>)> = Vec::new();
    for (id, line) in lines {
        match runs.last_mut() {
            Some((start, run)) if *start + run.len() as u32 == *id => run.push(line),
            _ => runs.push((*id, vec![line])),
        }
    }
    runs
}
