//! Turns file bytes into an object graph.
//!
//! Reading runs in a fixed order: header, cross-reference chain (or its
//! reconstruction), security handler, then every located object. Objects of
//! an encrypted file enter the graph still ciphered and are deciphered on
//! first access; object streams are the exception, since their members can
//! only be located after the container is deciphered and decoded. The read
//! ends by checking that `/Root` and every other reference have a target.

use crate::diagnostics::Diagnostics;
use crate::encryption::SecurityHandler;
use crate::error::{Error, Result};
use crate::graph::{IndirectObject, ObjectGraph};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::ObjectParser;
use crate::parser_config::ParserOptions;
use crate::xref::{find_startxref, load_xref_chain, CrossRefTable, XRefEntry};
use crate::xref_reconstruction::reconstruct_xref;
use std::collections::{BTreeMap, BTreeSet};

/// Version assumed when the header is missing in tolerant mode.
pub const DEFAULT_VERSION: (u8, u8) = (1, 7);

/// Everything recovered from a file.
#[derive(Debug)]
pub struct LoadedDocument {
    /// `%PDF-M.m` version
    pub version: (u8, u8),
    /// Indirect objects
    pub graph: ObjectGraph,
    /// Merged trailer dictionary
    pub trailer: Dictionary,
    /// Offset of the newest cross-reference section, when the chain was intact
    pub startxref: Option<usize>,
}

/// Parse `%PDF-M.m` from the first kilobyte.
pub fn parse_header(data: &[u8]) -> Option<(u8, u8)> {
    let window = &data[..data.len().min(1024)];
    let pos = window.windows(5).position(|w| w == b"%PDF-")?;
    let version = data.get(pos + 5..pos + 8)?;
    match version {
        [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Some((major - b'0', minor - b'0'))
        },
        _ => None,
    }
}

/// Records violations, or turns them into errors when they must abort the read.
struct Violations<'o> {
    options: &'o ParserOptions,
}

impl Violations<'_> {
    fn report(&self, graph: &ObjectGraph, offset: usize, reason: String) -> Result<()> {
        if self.options.strict {
            return Err(Error::ParseError { offset, reason });
        }
        graph.record_at(offset, reason);
        let count = graph.diagnostics().len();
        if !self.options.should_continue(count) {
            return Err(Error::ParseError {
                offset,
                reason: format!("giving up after {} recovered errors", count),
            });
        }
        Ok(())
    }
}

/// Read a whole document from memory.
pub fn read_document(data: &[u8], options: &ParserOptions) -> Result<LoadedDocument> {
    if options.max_file_size > 0 && data.len() > options.max_file_size {
        return Err(Error::Unsupported(format!(
            "input of {} bytes exceeds the {} byte limit",
            data.len(),
            options.max_file_size
        )));
    }

    let graph = ObjectGraph::with_diagnostics(Diagnostics::new(options.verbosity));
    let violations = Violations { options };

    let version = match parse_header(data) {
        Some(version) => version,
        None if options.strict => {
            return Err(Error::InvalidHeader("missing %PDF-M.m header".to_string()));
        },
        None => {
            violations.report(&graph, 0, "missing %PDF-M.m header".to_string())?;
            DEFAULT_VERSION
        },
    };

    let (table, startxref) = locate_objects(data, options, &graph, &violations)?;
    let mut loader = Loader {
        data,
        table: &table,
        options,
        violations: &violations,
        graph,
    };
    loader.load()?;

    let mut graph = loader.graph;
    let trailer = table.trailer().clone();
    check_root(&graph, &trailer, data.len(), &violations)?;
    check_references(&graph, &trailer, data.len(), &violations)?;
    graph.clear_dirty();

    log::info!(
        "read PDF {}.{} with {} objects ({} recovered errors)",
        version.0,
        version.1,
        graph.len(),
        graph.diagnostics().len()
    );

    Ok(LoadedDocument {
        version,
        graph,
        trailer,
        startxref,
    })
}

/// `/Root` must name a catalog dictionary that was actually loaded.
fn check_root(
    graph: &ObjectGraph,
    trailer: &Dictionary,
    offset: usize,
    violations: &Violations<'_>,
) -> Result<()> {
    let Some(root) = trailer.get("Root").and_then(Object::as_reference) else {
        return violations.report(graph, offset, "trailer has no /Root".to_string());
    };
    match graph.try_resolve(root) {
        Ok(Object::Dictionary(_)) => Ok(()),
        Ok(other) => violations.report(
            graph,
            offset,
            format!("/Root {} is a {}, expected a dictionary", root, other.type_name()),
        ),
        Err(e) => violations.report(graph, offset, format!("/Root {} does not resolve: {}", root, e)),
    }
}

/// Every reference held by a loaded object or the trailer must have a target.
///
/// Checked on the raw form, so ciphered objects are not decrypted here.
fn check_references(
    graph: &ObjectGraph,
    trailer: &Dictionary,
    offset: usize,
    violations: &Violations<'_>,
) -> Result<()> {
    let mut dangling: BTreeMap<ObjectRef, Option<ObjectRef>> = BTreeMap::new();
    for holder in graph.references() {
        let Some(raw) = graph.raw(holder) else {
            continue;
        };
        for target in raw.references() {
            if !graph.contains(target) {
                dangling.entry(target).or_insert(Some(holder));
            }
        }
    }
    let trailer_refs = trailer
        .iter()
        .filter(|(key, _)| key.as_str() != "Root")
        .flat_map(|(_, value)| value.references());
    for target in trailer_refs {
        if !graph.contains(target) {
            dangling.entry(target).or_insert(None);
        }
    }

    for (target, holder) in dangling {
        let reason = match holder {
            Some(holder) => format!("object {} refers to missing object {}", holder, target),
            None => format!("trailer refers to missing object {}", target),
        };
        violations.report(graph, offset, reason)?;
    }
    Ok(())
}

/// Cross-reference table from the `startxref` chain, or rebuilt by scanning.
fn locate_objects(
    data: &[u8],
    options: &ParserOptions,
    graph: &ObjectGraph,
    violations: &Violations<'_>,
) -> Result<(CrossRefTable, Option<usize>)> {
    let chained = find_startxref(data).and_then(|offset| {
        let table = load_xref_chain(data, offset, options.max_recursion_depth)?;
        if table.trailer().get("Root").is_none() {
            return Err(Error::InvalidXref("trailer has no /Root".to_string()));
        }
        Ok((table, offset))
    });

    match chained {
        Ok((table, offset)) => Ok((table, Some(offset))),
        Err(e) if options.strict => Err(e),
        Err(e) => {
            violations.report(graph, data.len(), format!("broken cross-reference chain: {}", e))?;
            log::info!("rebuilding cross-reference table by scanning the file");
            Ok((reconstruct_xref(data)?, None))
        },
    }
}

struct Loader<'a> {
    data: &'a [u8],
    table: &'a CrossRefTable,
    options: &'a ParserOptions,
    violations: &'a Violations<'a>,
    graph: ObjectGraph,
}

impl Loader<'_> {
    fn load(&mut self) -> Result<()> {
        let encrypt_ref = self.table.trailer().get("Encrypt").and_then(Object::as_reference);
        let mut containers: BTreeMap<u32, Object> = BTreeMap::new();
        let wanted_containers: BTreeSet<u32> = self
            .table
            .iter()
            .filter_map(|(_, entry)| match entry {
                XRefEntry::Compressed { stream, .. } => Some(*stream),
                _ => None,
            })
            .collect();

        let located: Vec<(ObjectRef, usize)> = self
            .table
            .iter()
            .filter_map(|(id, entry)| match entry {
                XRefEntry::InUse { offset, gen } if id != 0 => Some((ObjectRef::new(id, *gen), *offset)),
                _ => None,
            })
            .collect();

        let mut plain: Vec<(ObjectRef, Object)> = Vec::new();
        for (reference, offset) in located {
            let Some(object) = self.parse_at(reference, offset)? else {
                continue;
            };
            match object.get("Type").and_then(Object::as_name) {
                Some("XRef") if matches!(object, Object::Stream { .. }) => continue,
                Some("ObjStm") if wanted_containers.contains(&reference.id) => {
                    containers.insert(reference.id, object);
                    continue;
                },
                _ => {},
            }
            plain.push((reference, object));
        }

        self.install_security(encrypt_ref, &plain)?;
        let encrypted = self.graph.security().is_some();

        for (reference, object) in plain {
            let entry = if encrypted && Some(reference) != encrypt_ref {
                IndirectObject::ciphered(object)
            } else {
                IndirectObject::new(object)
            };
            self.graph.insert_loaded(reference, entry);
        }

        self.load_compressed(containers)
    }

    fn install_security(
        &mut self,
        encrypt_ref: Option<ObjectRef>,
        objects: &[(ObjectRef, Object)],
    ) -> Result<()> {
        let encrypt = match self.table.trailer().get("Encrypt") {
            None => return Ok(()),
            Some(Object::Dictionary(dict)) => dict.clone(),
            Some(Object::Reference(_)) => objects
                .iter()
                .find(|(r, _)| Some(*r) == encrypt_ref)
                .and_then(|(_, object)| object.as_dict().cloned())
                .ok_or_else(|| Error::Encryption("/Encrypt dictionary not found".to_string()))?,
            Some(other) => {
                return Err(Error::Encryption(format!(
                    "/Encrypt is a {}, expected a dictionary",
                    other.type_name()
                )));
            },
        };

        let id0 = self
            .table
            .trailer()
            .get("ID")
            .and_then(Object::as_array)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(<[u8]>::to_vec)
            .unwrap_or_else(|| {
                log::warn!("encrypted document has no /ID; using an empty file identifier");
                Vec::new()
            });

        let handler = SecurityHandler::open(&encrypt, &id0, self.options.password.as_deref())?;
        self.graph.set_security(Some(handler));
        Ok(())
    }

    /// Parse the indirect object at `offset`, checking its header against `reference`.
    fn parse_at(&self, reference: ObjectRef, offset: usize) -> Result<Option<Object>> {
        let Some(input) = self.data.get(offset..) else {
            self.violations.report(
                &self.graph,
                offset,
                format!("object {} lies past the end of the file", reference),
            )?;
            return Ok(None);
        };

        let lengths = |r: ObjectRef| self.direct_length(r);
        let parser = ObjectParser::new(self.options.max_nesting).with_lengths(&lengths);
        match parser.parse_indirect(input) {
            Ok((_, syntax)) => {
                if syntax.reference != reference {
                    self.violations.report(
                        &self.graph,
                        offset,
                        format!("expected object {}, found {}", reference, syntax.reference),
                    )?;
                }
                if !syntax.terminated {
                    self.violations.report(
                        &self.graph,
                        offset,
                        format!("object {} is missing endobj", reference),
                    )?;
                }
                Ok(Some(syntax.object))
            },
            Err(e) => {
                self.violations.report(
                    &self.graph,
                    offset,
                    format!("object {} could not be parsed: {:?}", reference, e.map(|err| err.code)),
                )?;
                Ok(None)
            },
        }
    }

    /// Value of an indirect `/Length`, read straight from the file.
    fn direct_length(&self, reference: ObjectRef) -> Option<usize> {
        let XRefEntry::InUse { offset, .. } = self.table.get(reference.id)? else {
            return None;
        };
        let (_, syntax) = ObjectParser::new(4).parse_indirect(self.data.get(*offset..)?).ok()?;
        syntax.object.as_integer().and_then(|n| usize::try_from(n).ok())
    }

    fn load_compressed(&mut self, containers: BTreeMap<u32, Object>) -> Result<()> {
        for (id, container) in containers {
            let reference = ObjectRef::new(id, 0);
            let container = match self.graph.security() {
                Some(handler) => match handler.decrypt_object(reference, &container) {
                    Ok(plain) => plain,
                    Err(e) => {
                        self.violations.report(
                            &self.graph,
                            0,
                            format!("object stream {} could not be decrypted: {}", reference, e),
                        )?;
                        continue;
                    },
                },
                None => container,
            };

            let members = match parse_object_stream(&container, self.options.max_nesting) {
                Ok(members) => members,
                Err(e) => {
                    self.violations.report(
                        &self.graph,
                        0,
                        format!("object stream {} is unreadable: {}", reference, e),
                    )?;
                    continue;
                },
            };

            for (member, object) in members {
                let located_here = matches!(
                    self.table.get(member),
                    Some(XRefEntry::Compressed { stream, .. }) if *stream == id
                );
                if located_here {
                    self.graph
                        .insert_loaded(ObjectRef::new(member, 0), IndirectObject::new(object));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(objects: &[&str], root: u32) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                root,
                xref
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header(b"%PDF-1.4\n"), Some((1, 4)));
        assert_eq!(parse_header(b"junk\n%PDF-2.0\n"), Some((2, 0)));
        assert_eq!(parse_header(b"hello"), None);
    }

    #[test]
    fn test_read_simple_document() {
        let data = build(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
            ],
            1,
        );
        let loaded = read_document(&data, &ParserOptions::strict()).unwrap();
        assert_eq!(loaded.version, (1, 4));
        assert_eq!(loaded.graph.len(), 2);
        assert!(loaded.startxref.is_some());
        assert_eq!(loaded.graph.dirty().count(), 0);
    }

    #[test]
    fn test_missing_header() {
        let data = build(&["<< /Type /Catalog >>"], 1);
        let headless = &data[9..];
        // offsets are now off by nine bytes
        assert!(read_document(headless, &ParserOptions::strict()).is_err());

        let loaded = read_document(headless, &ParserOptions::lenient()).unwrap();
        assert_eq!(loaded.version, DEFAULT_VERSION);
        assert!(!loaded.graph.diagnostics().is_empty());
        assert_eq!(loaded.graph.len(), 1);
    }

    #[test]
    fn test_broken_startxref_is_reconstructed() {
        let mut data = build(&["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Count 0 >>"], 1);
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        data.extend_from_slice(b"startxref\n999999\n%%EOF\n");

        assert!(read_document(&data, &ParserOptions::strict()).is_err());
        let loaded = read_document(&data, &ParserOptions::lenient()).unwrap();
        assert_eq!(loaded.graph.len(), 2);
        assert!(loaded.startxref.is_none());
        assert!(loaded.trailer.get("Root").is_some());
    }

    #[test]
    fn test_max_errors_gate() {
        let mut data = build(&["<< /Type /Catalog >>"], 1);
        let pos = data.windows(9).rposition(|w| w == b"startxref").unwrap();
        data.truncate(pos);
        let mut options = ParserOptions::lenient();
        options.max_errors = 1;
        assert!(matches!(
            read_document(&data, &options),
            Err(Error::ParseError { .. })
        ));
    }

    #[test]
    fn test_file_size_limit() {
        let data = build(&["<< /Type /Catalog >>"], 1);
        let mut options = ParserOptions::lenient();
        options.max_file_size = 10;
        assert!(read_document(&data, &options).is_err());
    }
}
