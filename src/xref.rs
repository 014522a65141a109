//! Cross-reference sections.
//!
//! A section maps object numbers to their location in one revision of the
//! file. Traditional tables (`xref ... trailer`) and cross-reference streams
//! (`/Type /XRef`) are both read; sections are chained through `/Prev` and
//! merged newest first, so an object number already located by a later
//! revision is never overwritten by an earlier one.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object};
use crate::parser::ObjectParser;
use std::collections::{BTreeMap, HashSet};

/// Location of one object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry
    Free {
        /// Next free object number
        next: u32,
        /// Generation to use on reuse
        gen: u16,
    },
    /// Object stored at a byte offset
    InUse {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Object packed inside an object stream (generation is always 0)
    Compressed {
        /// Object number of the containing `/ObjStm`
        stream: u32,
        /// Index within the stream
        index: u32,
    },
}

impl XRefEntry {
    /// True unless the entry is free.
    pub fn in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }

    /// Generation of the located object.
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { gen, .. } | XRefEntry::InUse { gen, .. } => *gen,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// Merged view over a chain of cross-reference sections.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
    /// Offsets of the sections read, newest first
    sections: Vec<usize>,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry, replacing any previous one for the number.
    pub fn add_entry(&mut self, id: u32, entry: XRefEntry) {
        self.entries.insert(id, entry);
    }

    /// Entry for an object number.
    pub fn get(&self, id: u32) -> Option<&XRefEntry> {
        self.entries.get(&id)
    }

    /// Iterate entries in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trailer of the newest section, completed with keys only older
    /// sections carry.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Replace the trailer.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = trailer;
    }

    /// Offsets of the sections this table was merged from, newest first.
    pub fn section_offsets(&self) -> &[usize] {
        &self.sections
    }

    /// Merge an older section: entries and trailer keys already present win.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (id, entry) in older.entries {
            self.entries.entry(id).or_insert(entry);
        }
        for (key, value) in older.trailer {
            if key != "Prev" && key != "XRefStm" {
                self.trailer.entry(key).or_insert(value);
            }
        }
        self.sections.extend(older.sections);
    }
}

/// Byte offset named by the last `startxref` in the file.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| Error::InvalidXref("startxref not found".to_string()))?;

    match token(&tail[pos + keyword.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 => Ok(offset as usize),
        _ => Err(Error::InvalidXref("startxref offset is not a number".to_string())),
    }
}

/// Read the section at `offset` and every section reachable through `/Prev`
/// and `/XRefStm`, merged newest first.
pub fn load_xref_chain(data: &[u8], offset: usize, max_depth: u32) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    load_recursive(data, offset, 0, max_depth, &mut visited)
}

fn load_recursive(
    data: &[u8],
    offset: usize,
    depth: u32,
    max_depth: u32,
    visited: &mut HashSet<usize>,
) -> Result<CrossRefTable> {
    if depth > max_depth {
        return Err(Error::RecursionLimitExceeded(max_depth));
    }
    if !visited.insert(offset) {
        return Err(Error::InvalidXref(format!("/Prev loop at offset {}", offset)));
    }

    let mut table = parse_section(data, offset)?;
    log::debug!("xref section at {} with {} entries", offset, table.len());

    // Hybrid files: the table section points at a stream section of the same revision
    if let Some(stm) = table.trailer.get("XRefStm").and_then(Object::as_integer) {
        if stm >= 0 && !visited.contains(&(stm as usize)) {
            visited.insert(stm as usize);
            let hidden = parse_section(data, stm as usize)?;
            table.merge_from(hidden);
        }
    }

    if let Some(prev) = table.trailer.get("Prev").and_then(Object::as_integer) {
        if prev >= 0 {
            let older = load_recursive(data, prev as usize, depth + 1, max_depth, visited)?;
            table.merge_from(older);
        }
    }

    Ok(table)
}

/// Parse one section, detecting whether it is a table or a stream.
pub fn parse_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let input = data
        .get(offset..)
        .ok_or_else(|| Error::InvalidXref(format!("offset {} past end of file", offset)))?;
    let body = crate::lexer::skip_ws(input).map(|(rest, _)| rest).unwrap_or(input);

    let mut table = if body.starts_with(b"xref") {
        parse_table(body)
    } else if body.first().is_some_and(u8::is_ascii_digit) {
        parse_stream_section(body)
    } else {
        Err(Error::InvalidXref(format!("no xref section at offset {}", offset)))
    }?;

    table.sections.push(offset);
    Ok(table)
}

fn parse_table(input: &[u8]) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut rest = &input[4..];

    loop {
        let (after_ws, _) = crate::lexer::skip_ws(rest).map_err(|_| truncated())?;
        if after_ws.starts_with(b"trailer") {
            rest = &after_ws[7..];
            break;
        }

        let (after, start) = integer(after_ws)?;
        let (after, count) = integer(after)?;
        rest = after;

        for i in 0..count {
            let (after, line) = entry_line(rest)?;
            rest = after;
            table.add_entry((start + i) as u32, parse_entry(line)?);
        }
    }

    let (_, trailer) = ObjectParser::default()
        .parse(rest)
        .map_err(|_| Error::InvalidXref("unparsable trailer dictionary".to_string()))?;
    match trailer {
        Object::Dictionary(dict) => table.set_trailer(dict),
        other => {
            return Err(Error::InvalidXref(format!("trailer is a {}", other.type_name())));
        },
    }
    Ok(table)
}

fn truncated() -> Error {
    Error::InvalidXref("truncated xref table".to_string())
}

fn integer(input: &[u8]) -> Result<(&[u8], u64)> {
    match token(input) {
        Ok((rest, Token::Integer(n))) if n >= 0 => Ok((rest, n as u64)),
        _ => Err(Error::InvalidXref("expected subsection header".to_string())),
    }
}

/// Next non-blank line of a subsection.
fn entry_line(input: &[u8]) -> Result<(&[u8], &[u8])> {
    let start = input
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .ok_or_else(truncated)?;
    let line = &input[start..];
    let end = line
        .iter()
        .position(|&c| c == b'\r' || c == b'\n')
        .unwrap_or(line.len());
    Ok((&line[end..], &line[..end]))
}

/// `nnnnnnnnnn ggggg n|f`
fn parse_entry(line: &[u8]) -> Result<XRefEntry> {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.split_whitespace();
    let bad = || Error::InvalidXref(format!("malformed entry {:?}", text.trim()));

    let first: u64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    let gen: u16 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
    match parts.next() {
        Some("n") => Ok(XRefEntry::InUse {
            offset: first as usize,
            gen,
        }),
        Some("f") => Ok(XRefEntry::Free {
            next: first as u32,
            gen,
        }),
        _ => Err(bad()),
    }
}

/// `/Type /XRef` stream: `/W` field widths, optional `/Index` ranges.
fn parse_stream_section(input: &[u8]) -> Result<CrossRefTable> {
    let (_, parsed) = ObjectParser::default()
        .parse_indirect(input)
        .map_err(|_| Error::InvalidXref("unparsable xref stream object".to_string()))?;

    let stream = parsed.object;
    let dict = match &stream {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidXref(format!("xref stream is a {}", other.type_name())));
        },
    };
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(Error::InvalidXref("missing /Type /XRef".to_string()));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|n| n.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 {
        return Err(Error::InvalidXref("/W must have three entries".to_string()));
    }

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .ok_or_else(|| Error::InvalidXref("missing /Size".to_string()))?;
    let ranges: Vec<(u64, u64)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [start, count] => Some((
                    start.as_integer()?.max(0) as u64,
                    count.as_integer()?.max(0) as u64,
                )),
                _ => None,
            })
            .collect(),
        None => vec![(0, size.max(0) as u64)],
    };

    let decoded = stream.decode_stream_data()?;
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::InvalidXref("zero-width xref stream entries".to_string()));
    }
    let mut rows = decoded.chunks_exact(entry_size);

    let mut table = CrossRefTable::new();
    for (start, count) in ranges {
        for i in 0..count {
            let row = rows
                .next()
                .ok_or_else(|| Error::InvalidXref("truncated xref stream data".to_string()))?;
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to 1
            let kind = if widths[0] == 0 { 1 } else { read_be(f1) };
            let (f2, f3) = (read_be(f2), read_be(f3));

            let entry = match kind {
                0 => XRefEntry::Free {
                    next: f2 as u32,
                    gen: f3 as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f2 as usize,
                    gen: f3 as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: f2 as u32,
                    index: f3 as u32,
                },
                other => {
                    log::debug!("ignoring xref stream entry of type {}", other);
                    continue;
                },
            };
            table.add_entry((start + i) as u32, entry);
        }
    }

    let mut trailer = dict.clone();
    for key in ["Type", "W", "Index", "Length", "Filter", "DecodeParms"] {
        trailer.shift_remove(key);
    }
    table.set_trailer(trailer);
    Ok(table)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
