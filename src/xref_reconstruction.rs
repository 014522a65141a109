//! Cross-reference reconstruction for damaged files.
//!
//! Used only in tolerant mode when `startxref` or the section chain cannot be
//! read. The whole file is scanned for `N G obj` headers; a later header for
//! the same object number wins, as it would in an incremental update.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::parser::ObjectParser;
use crate::xref::{CrossRefTable, XRefEntry};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref RE_OBJ_HEADER: Regex =
        Regex::new(r"(\d+)\s+(\d+)\s+obj").expect("valid object header pattern");
    static ref RE_TRAILER: Regex = Regex::new(r"trailer\s*<<").expect("valid trailer pattern");
}

/// Rebuild a cross-reference table by scanning `data`.
///
/// The trailer is taken from the last `trailer` dictionary that names a
/// `/Root`; failing that, a minimal trailer is synthesized around the last
/// object whose `/Type` is `/Catalog`.
pub fn reconstruct_xref(data: &[u8]) -> Result<CrossRefTable> {
    log::info!("reconstructing cross-reference table by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    for capture in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(whole), Some(id), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2))
        else {
            continue;
        };

        // Headers start a token: reject matches glued to the preceding byte
        if whole.start() > 0 && !data[whole.start() - 1].is_ascii_whitespace() {
            continue;
        }
        let after = data.get(whole.end()).copied();
        if after.is_some_and(|c| c.is_ascii_alphanumeric()) {
            continue;
        }

        let (Some(id), Some(gen)) = (
            ascii_number::<u32>(id.as_bytes()),
            ascii_number::<u16>(gen.as_bytes()),
        ) else {
            continue;
        };
        table.add_entry(
            id,
            XRefEntry::InUse {
                offset: whole.start(),
                gen,
            },
        );
    }

    if table.is_empty() {
        return Err(Error::InvalidXref("no objects found while scanning".to_string()));
    }
    log::info!("reconstructed {} object locations", table.len());

    let trailer = find_trailer(data)
        .or_else(|| synthesize_trailer(data, &table))
        .ok_or_else(|| Error::InvalidXref("no trailer or catalog found".to_string()))?;
    table.set_trailer(trailer);
    Ok(table)
}

fn ascii_number<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn find_trailer(data: &[u8]) -> Option<crate::object::Dictionary> {
    let parser = ObjectParser::default();
    RE_TRAILER
        .find_iter(data)
        .filter_map(|m| {
            // Skip the keyword, keep the `<<`
            let (_, obj) = parser.parse(&data[m.start() + 7..]).ok()?;
            match obj {
                Object::Dictionary(dict) if dict.contains_key("Root") => Some(dict),
                _ => None,
            }
        })
        .last()
}

fn synthesize_trailer(data: &[u8], table: &CrossRefTable) -> Option<crate::object::Dictionary> {
    let parser = ObjectParser::default();
    let catalog = table
        .iter()
        .filter_map(|(id, entry)| match entry {
            XRefEntry::InUse { offset, gen } => Some((ObjectRef::new(id, *gen), *offset)),
            _ => None,
        })
        .filter(|(_, offset)| {
            parser
                .parse_indirect(&data[*offset..])
                .map(|(_, parsed)| parsed.object.get("Type").and_then(Object::as_name) == Some("Catalog"))
                .unwrap_or(false)
        })
        .map(|(reference, _)| reference)
        .last()?;

    log::warn!("no usable trailer, using catalog {}", catalog);
    let size = table.iter().map(|(id, _)| id).max().unwrap_or(0) as i64 + 1;
    Some(crate::object::dict([
        ("Size", Object::Integer(size)),
        ("Root", Object::Reference(catalog)),
    ]))
}
