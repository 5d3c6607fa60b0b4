//! Cross-reference table parser.
//!
//! The xref table maps object numbers to byte offsets. Classic tables are
//! parsed along the `/Prev` chain of incremental updates. Cross-reference
//! streams contribute their dictionary (the trailer) only; object offsets for
//! such files come from [`reconstruct_xref`], which scans the file for
//! `N G obj` headers.

use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::{parse_indirect_object, parse_object};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::{HashMap, HashSet};

lazy_static! {
    static ref RE_OBJ_HEADER: Regex = Regex::new(r"(?-u)(\d+)[ \t\r\n\x0C\x00]+(\d+)[ \t\r\n\x0C\x00]+obj\b")
        .expect("object header pattern is valid");
}

/// Longest `/Prev` chain followed before giving up.
const MAX_PREV_DEPTH: usize = 100;

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object stored uncompressed at a byte offset
    InUse {
        /// Byte offset of the `N G obj` header
        offset: u64,
        /// Generation number
        generation: u16,
    },
    /// Free entry
    Free,
}

/// Cross-reference table merged over all revisions.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Option<HashMap<String, Object>>,
    has_stream_sections: bool,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: HashMap<String, Object>) {
        self.trailer = Some(trailer);
    }

    /// Trailer dictionary of the newest revision.
    pub fn trailer(&self) -> Option<&HashMap<String, Object>> {
        self.trailer.as_ref()
    }

    /// Add an entry, replacing any previous one for the same object.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Look up an entry.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Merge entries from an older revision. Entries already present win.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
        self.has_stream_sections |= older.has_stream_sections;
    }

    /// Whether any revision on the chain used a cross-reference stream.
    pub fn has_stream_sections(&self) -> bool {
        self.has_stream_sections
    }

    /// Highest object number with an entry.
    pub fn max_object_number(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset named by the last `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let keyword = b"startxref";

    let pos = tail
        .windows(keyword.len())
        .rposition(|window| window == keyword)
        .ok_or_else(|| Error::MalformedDocument("startxref not found".to_string()))?;

    let digits: String = tail[pos + keyword.len()..]
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();

    digits
        .parse::<u64>()
        .map_err(|_| Error::MalformedDocument("startxref offset is not a number".to_string()))
}

/// Parse the xref section at `offset` and every older section it links to.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut table: Option<CrossRefTable> = None;
    let mut next = Some(offset);

    while let Some(offset) = next {
        if !visited.insert(offset) || visited.len() > MAX_PREV_DEPTH {
            log::warn!("Stopping at repeated or too deep /Prev offset {}", offset);
            break;
        }

        let section = parse_section(data, offset)?;
        next = section
            .trailer()
            .and_then(|t| t.get("Prev"))
            .and_then(Object::as_integer)
            .and_then(|prev| u64::try_from(prev).ok());

        table = Some(match table {
            None => section,
            Some(mut newer) => {
                newer.merge_from(section);
                newer
            },
        });
    }

    table.ok_or_else(|| Error::MalformedDocument("no xref section".to_string()))
}

fn parse_section(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let start = usize::try_from(offset)
        .ok()
        .filter(|&o| o < data.len())
        .ok_or_else(|| Error::MalformedDocument(format!("xref offset {} is out of range", offset)))?;
    let at = crate::lexer::skip_ws(&data[start..]);

    if at.starts_with(b"xref") {
        log::debug!("Parsing classic xref at offset {}", offset);
        return parse_traditional_xref(data, data.len() - at.len());
    }

    match parse_indirect_object(at) {
        Ok((_, (_, Object::Stream { dict, .. })))
            if dict.get("Type").and_then(Object::as_name) == Some("XRef") =>
        {
            log::debug!("Cross-reference stream at offset {}", offset);
            let mut table = CrossRefTable::new();
            table.has_stream_sections = true;
            table.set_trailer(dict);
            Ok(table)
        },
        _ => Err(Error::MalformedDocument(format!("no xref section at offset {}", offset))),
    }
}

/// Split off one line, accepting CR, LF and CRLF endings.
fn next_line(data: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    if pos >= data.len() {
        return None;
    }
    let end = data[pos..]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .map_or(data.len(), |i| pos + i);
    let mut next = end;
    if data.get(next) == Some(&b'\r') {
        next += 1;
    }
    if data.get(next) == Some(&b'\n') {
        next += 1;
    }
    Some((&data[pos..end], next))
}

/// Parse a classic table starting at the `xref` keyword.
///
/// ```text
/// xref
/// 0 7
/// 0000000000 65535 f
/// 0000000015 00000 n
/// trailer
/// << /Size 7 /Root 1 0 R >>
/// ```
fn parse_traditional_xref(data: &[u8], start: usize) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let (_, mut pos) = next_line(data, start)
        .ok_or_else(|| Error::MalformedDocument("empty xref section".to_string()))?;
    let mut subsection: Option<(u32, u32)> = None;

    while let Some((line, next)) = next_line(data, pos) {
        let text = String::from_utf8_lossy(line);
        let trimmed = text.trim();

        if let Some(keyword_at) = line.windows(7).position(|w| w == b"trailer") {
            let dict_start = pos + keyword_at + 7;
            let (_, trailer) = parse_object(&data[dict_start..])
                .map_err(|_| Error::MalformedDocument("unreadable trailer dictionary".to_string()))?;
            match trailer {
                Object::Dictionary(dict) => table.set_trailer(dict),
                other => {
                    return Err(Error::MalformedDocument(format!(
                        "trailer is a {}, expected a dictionary",
                        other.type_name()
                    )))
                },
            }
            return Ok(table);
        }
        pos = next;

        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        match parts.as_slice() {
            [first, count] => {
                let first = first.parse().map_err(|_| {
                    Error::MalformedDocument(format!("bad xref subsection header: {:?}", trimmed))
                })?;
                let count = count.parse().map_err(|_| {
                    Error::MalformedDocument(format!("bad xref subsection header: {:?}", trimmed))
                })?;
                subsection = Some((first, count));
            },
            [offset, generation, kind, ..] => {
                let Some((number, remaining)) = subsection else {
                    return Err(Error::MalformedDocument("xref entry outside a subsection".to_string()));
                };
                if remaining == 0 {
                    log::warn!("Extra xref entry after subsection of object {} ignored", number);
                    continue;
                }
                let entry = match (kind.starts_with('n'), offset.parse(), generation.parse()) {
                    (true, Ok(offset), Ok(generation)) if offset > 0 => XRefEntry::InUse { offset, generation },
                    (true, _, _) => {
                        log::warn!("Malformed in-use xref entry for object {}: {:?}", number, trimmed);
                        XRefEntry::Free
                    },
                    _ => XRefEntry::Free,
                };
                table.add_entry(number, entry);
                subsection = Some((number + 1, remaining - 1));
            },
            _ => log::warn!("Skipping unrecognised xref line {:?}", trimmed),
        }
    }

    Err(Error::MalformedDocument("xref table without trailer".to_string()))
}

/// Rebuild a table by scanning the whole file for object headers.
///
/// Later definitions of the same object win, matching incremental update
/// semantics. The trailer is the last `trailer` dictionary in the file, or the
/// last cross-reference stream dictionary, or a minimal one pointing at the
/// first catalog found.
pub fn reconstruct_xref(data: &[u8]) -> Result<CrossRefTable> {
    log::info!("Reconstructing xref table by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    let mut xref_stream_dict = None;
    let mut catalog = None;

    for capture in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(whole), Some(num), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2)) else {
            continue;
        };
        let at_line_start = whole.start() == 0 || data[whole.start() - 1].is_ascii_whitespace();
        if !at_line_start {
            continue;
        }
        let parsed = std::str::from_utf8(num.as_bytes())
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .zip(std::str::from_utf8(gen.as_bytes()).ok().and_then(|s| s.parse::<u16>().ok()));
        let Some((number, generation)) = parsed else {
            log::warn!("Skipping unparsable object header at offset {}", whole.start());
            continue;
        };

        table.add_entry(
            number,
            XRefEntry::InUse {
                offset: whole.start() as u64,
                generation,
            },
        );

        if let Ok((_, (obj_ref, obj))) = parse_indirect_object(&data[whole.start()..]) {
            match obj.as_dict().and_then(|d| d.get("Type")).and_then(Object::as_name) {
                Some("XRef") => xref_stream_dict = obj.as_dict().cloned(),
                Some("Catalog") if catalog.is_none() => catalog = Some(obj_ref),
                _ => {},
            }
        }
    }

    if table.is_empty() {
        return Err(Error::MalformedDocument("no objects found while scanning".to_string()));
    }
    log::info!("Reconstructed xref with {} objects", table.len());

    let keyword = b"trailer";
    let trailer = data
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .and_then(|pos| parse_object(&data[pos + keyword.len()..]).ok())
        .and_then(|(_, obj)| match obj {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        })
        .or(xref_stream_dict);

    match (trailer, catalog) {
        (Some(trailer), _) => table.set_trailer(trailer),
        (None, Some(root)) => {
            log::warn!("No trailer found, using catalog {} as root", root);
            let mut trailer = HashMap::new();
            trailer.insert("Root".to_string(), Object::Reference(root));
            table.set_trailer(trailer);
        },
        (None, None) => {
            return Err(Error::MalformedDocument("no trailer and no catalog found".to_string()));
        },
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000015 00000 n \n0000000064 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_find_xref_offset() {
        let data = b"%PDF-1.4\n...\nstartxref\n1234\n%%EOF\n";
        assert_eq!(find_xref_offset(data).unwrap(), 1234);
    }

    #[test]
    fn test_find_xref_offset_uses_last_keyword() {
        let data = b"startxref\n10\n%%EOF\nmore\nstartxref\r\n20\r\n%%EOF";
        assert_eq!(find_xref_offset(data).unwrap(), 20);
    }

    #[test]
    fn test_find_xref_offset_missing() {
        assert!(matches!(find_xref_offset(b"%PDF-1.4\n%%EOF"), Err(Error::MalformedDocument(_))));
    }

    #[test]
    fn test_parse_single_table() {
        let table = parse_xref(TABLE, 0).unwrap();
        assert_eq!(table.get(0), Some(&XRefEntry::Free));
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::InUse {
                offset: 15,
                generation: 0
            })
        );
        assert_eq!(table.max_object_number(), 2);
        let trailer = table.trailer().unwrap();
        assert_eq!(trailer["Size"].as_integer(), Some(3));
        assert!(!table.has_stream_sections());
    }

    #[test]
    fn test_parse_multiple_subsections() {
        let data = b"xref\r\n0 1\r\n0000000000 65535 f\r\n4 2\r\n0000000100 00000 n\r\n0000000200 00001 n\r\ntrailer << /Size 6 >>";
        let table = parse_xref(data, 0).unwrap();
        assert_eq!(
            table.get(5),
            Some(&XRefEntry::InUse {
                offset: 200,
                generation: 1
            })
        );
        assert!(table.get(3).is_none());
    }

    #[test]
    fn test_prev_chain_newer_entries_win() {
        let mut data = TABLE.to_vec();
        let second = data.len();
        data.extend_from_slice(
            b"xref\n1 1\n0000000500 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R /Prev 0 >>\n",
        );
        let table = parse_xref(&data, second as u64).unwrap();
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::InUse {
                offset: 500,
                generation: 0
            })
        );
        assert_eq!(
            table.get(2),
            Some(&XRefEntry::InUse {
                offset: 64,
                generation: 0
            })
        );
        assert_eq!(table.trailer().unwrap()["Prev"].as_integer(), Some(0));
    }

    #[test]
    fn test_circular_prev_terminates() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        assert!(parse_xref(data, 0).is_ok());
    }

    #[test]
    fn test_parse_xref_bad_offset() {
        assert!(parse_xref(TABLE, 10_000).is_err());
        assert!(parse_xref(b"garbage here", 0).is_err());
    }

    #[test]
    fn test_xref_stream_contributes_trailer() {
        let data = b"9 0 obj\n<< /Type /XRef /Size 10 /Root 1 0 R /Length 3 >>\nstream\nabc\nendstream\nendobj\n";
        let table = parse_xref(data, 0).unwrap();
        assert!(table.has_stream_sections());
        assert!(table.is_empty());
        assert!(table.trailer().unwrap().contains_key("Root"));
    }

    #[test]
    fn test_reconstruct_later_definition_wins() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n1 0 obj\n<< /Type /Catalog /V 2 >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n";
        let table = reconstruct_xref(data).unwrap();
        let second = data.windows(5).rposition(|w| w == b"1 0 o").unwrap();
        assert_eq!(
            table.get(1),
            Some(&XRefEntry::InUse {
                offset: second as u64,
                generation: 0
            })
        );
        assert!(table.trailer().unwrap().contains_key("Root"));
    }

    #[test]
    fn test_reconstruct_without_trailer_uses_catalog() {
        let data = b"%PDF-1.4\n4 0 obj\n<< /Type /Catalog /Pages 5 0 R >>\nendobj\n";
        let table = reconstruct_xref(data).unwrap();
        let root = table.trailer().unwrap()["Root"].as_reference().unwrap();
        assert_eq!(root.id, 4);
    }

    #[test]
    fn test_reconstruct_empty_fails() {
        assert!(reconstruct_xref(b"%PDF-1.4\nnothing\n").is_err());
    }
}
