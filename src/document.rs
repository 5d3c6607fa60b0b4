//! Read access to the newest revision of a PDF.
//!
//! [`PdfDocument`] borrows the raw bytes and exposes what an incremental
//! update needs: the trailer, the `startxref` offset of the newest section, and
//! object lookup by reference.

use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::parser::parse_indirect_object;
use crate::xref::{self, CrossRefTable, XRefEntry};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Deepest page tree walked when looking for the first page.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// A parsed view over PDF bytes.
#[derive(Debug)]
pub struct PdfDocument<'a> {
    data: &'a [u8],
    version: (u8, u8),
    startxref: u64,
    xref: CrossRefTable,
    scanned: OnceLock<Option<CrossRefTable>>,
}

impl<'a> PdfDocument<'a> {
    /// Parse the header, `startxref` and cross-reference data.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let version = parse_header(data)?;
        let startxref = xref::find_xref_offset(data)?;

        let xref = match xref::parse_xref(data, startxref) {
            Ok(table) if table.has_stream_sections() => {
                log::warn!("Cross-reference streams present; locating objects by scanning");
                let mut scanned = xref::reconstruct_xref(data)?;
                if let Some(trailer) = table.trailer() {
                    scanned.set_trailer(trailer.clone());
                }
                scanned
            },
            Ok(table) => table,
            Err(e) => {
                log::warn!("Failed to parse xref at {} ({}), reconstructing", startxref, e);
                xref::reconstruct_xref(data)?
            },
        };

        if xref.trailer().is_none() {
            return Err(Error::MalformedDocument("trailer not found".to_string()));
        }

        log::debug!(
            "Parsed PDF {}.{}: {} xref entries, startxref {}",
            version.0,
            version.1,
            xref.len(),
            startxref
        );

        Ok(Self {
            data,
            version,
            startxref,
            xref,
            scanned: OnceLock::new(),
        })
    }

    /// Header version `(major, minor)`.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Offset of the newest xref section; becomes `/Prev` of the next one.
    pub fn startxref(&self) -> u64 {
        self.startxref
    }

    /// Trailer dictionary of the newest revision.
    pub fn trailer(&self) -> &HashMap<String, Object> {
        static EMPTY: OnceLock<HashMap<String, Object>> = OnceLock::new();
        self.xref
            .trailer()
            .unwrap_or_else(|| EMPTY.get_or_init(HashMap::new))
    }

    /// Next free object number: the larger of `/Size` and the highest number
    /// in use plus one.
    pub fn next_object_number(&self) -> u32 {
        let size = self
            .trailer()
            .get("Size")
            .and_then(Object::as_integer)
            .and_then(|s| u32::try_from(s).ok())
            .unwrap_or(0);
        size.max(self.xref.max_object_number() + 1)
    }

    /// Load an indirect object.
    ///
    /// Falls back to a full scan when the xref offset does not point at the
    /// expected object header.
    pub fn object(&self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(obj) = self.object_from(&self.xref, obj_ref) {
            return Ok(obj);
        }

        let scanned = self.scanned.get_or_init(|| {
            log::warn!("Object {} not at its xref offset, scanning file", obj_ref);
            xref::reconstruct_xref(self.data).ok()
        });
        scanned
            .as_ref()
            .and_then(|table| self.object_from(table, obj_ref))
            .ok_or_else(|| {
                Error::MalformedDocument(format!(
                    "object {} not found (objects inside compressed object streams are not supported)",
                    obj_ref
                ))
            })
    }

    fn object_from(&self, table: &CrossRefTable, obj_ref: ObjectRef) -> Option<Object> {
        let offset = match table.get(obj_ref.id)? {
            XRefEntry::InUse { offset, .. } => usize::try_from(*offset).ok()?,
            XRefEntry::Free => return None,
        };
        let (_, (found, obj)) = parse_indirect_object(self.data.get(offset..)?).ok()?;
        (found.id == obj_ref.id).then_some(obj)
    }

    /// Follow a reference; direct objects are returned as is.
    pub fn resolve(&self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.object(*r),
            other => Ok(other.clone()),
        }
    }

    /// Reference to the catalog named by `/Root`.
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::MalformedDocument("trailer has no /Root reference".to_string()))
    }

    /// The catalog dictionary.
    pub fn catalog(&self) -> Result<HashMap<String, Object>> {
        let catalog = self.object(self.catalog_ref()?)?;
        match catalog {
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::MalformedDocument(format!(
                "catalog is a {}, expected a dictionary",
                other.type_name()
            ))),
        }
    }

    /// Reference and dictionary of the first leaf of the page tree.
    pub fn first_page(&self) -> Result<(ObjectRef, HashMap<String, Object>)> {
        let catalog = self.catalog()?;
        let mut node_ref = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::MalformedDocument("catalog has no /Pages reference".to_string()))?;

        for _ in 0..MAX_PAGE_TREE_DEPTH {
            let node = match self.object(node_ref)? {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(Error::MalformedDocument(format!(
                        "page tree node {} is a {}",
                        node_ref,
                        other.type_name()
                    )))
                },
            };

            let is_leaf = node.get("Type").and_then(Object::as_name) == Some("Page")
                || !node.contains_key("Kids");
            if is_leaf {
                return Ok((node_ref, node));
            }

            let kids = self.resolve(&node["Kids"])?;
            node_ref = kids
                .as_array()
                .and_then(|k| k.first())
                .and_then(Object::as_reference)
                .ok_or_else(|| Error::MalformedDocument(format!("page tree node {} has no kids", node_ref)))?;
        }

        Err(Error::MalformedDocument("page tree is too deep".to_string()))
    }
}

/// Parse `%PDF-M.m` from the first kilobyte.
fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let marker = b"%PDF-";
    let head = &data[..data.len().min(1024)];
    let pos = head
        .windows(marker.len())
        .position(|w| w == marker)
        .ok_or_else(|| Error::MalformedDocument("missing %PDF- header".to_string()))?;

    let rest = &head[pos + marker.len()..];
    let parsed = match rest {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            Some((major - b'0', minor - b'0'))
        },
        _ => None,
    };
    parsed.ok_or_else(|| Error::MalformedDocument("unreadable PDF version in header".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = include_bytes!("../tests/fixtures/simple.pdf");

    #[test]
    fn test_parse_simple() {
        let doc = PdfDocument::parse(SIMPLE).unwrap();
        assert_eq!(doc.version(), (1, 4));
        assert_eq!(doc.startxref(), 484);
        assert_eq!(doc.next_object_number(), 7);
    }

    #[test]
    fn test_catalog_and_first_page() {
        let doc = PdfDocument::parse(SIMPLE).unwrap();
        assert_eq!(doc.catalog_ref().unwrap(), ObjectRef::new(1, 0));
        let catalog = doc.catalog().unwrap();
        assert_eq!(catalog["Type"].as_name(), Some("Catalog"));

        let (page_ref, page) = doc.first_page().unwrap();
        assert_eq!(page_ref, ObjectRef::new(3, 0));
        assert_eq!(page["Type"].as_name(), Some("Page"));
    }

    #[test]
    fn test_trailer_carries_info_and_id() {
        let doc = PdfDocument::parse(SIMPLE).unwrap();
        assert_eq!(doc.trailer()["Info"].as_reference(), Some(ObjectRef::new(6, 0)));
        assert_eq!(doc.trailer()["ID"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_missing_header() {
        let err = PdfDocument::parse(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn test_wrong_offsets_fall_back_to_scan() {
        let mut data = SIMPLE.to_vec();
        // Shift every object without updating the xref table or startxref.
        data.splice(9..9, b"%x\n".iter().copied());
        let doc = PdfDocument::parse(&data).unwrap();
        let (page_ref, _) = doc.first_page().unwrap();
        assert_eq!(page_ref.id, 3);
    }

    #[test]
    fn test_missing_object() {
        let doc = PdfDocument::parse(SIMPLE).unwrap();
        assert!(doc.object(ObjectRef::new(99, 0)).is_err());
    }
}
