//! Byte-range placeholder locator.
//!
//! Finds the unresolved `/ByteRange` token of a prepared document and the
//! `/Contents` slot that follows it, and turns their offsets into a
//! [`ByteRange`]. Populated arrays from earlier signatures are never matched.

use super::byterange::ByteRange;
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    /// `/ByteRange [0 x y z]` where every x, y, z is `0` or a `/***` name.
    static ref RE_UNRESOLVED_BYTE_RANGE: Regex = Regex::new(
        r"(?-u)/ByteRange\s*\[\s*0(?:\s+(?:0|/\*+)){3}\s*\]"
    )
    .expect("placeholder pattern is valid");
}

/// A placeholder found in a prepared document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedPlaceholder {
    /// The exact placeholder token, e.g. `/ByteRange [0 /********** ...]`
    pub placeholder: String,
    /// Offset of the token's first byte
    pub offset: usize,
    /// Offsets computed from the `/Contents` slot
    pub byte_range: ByteRange,
}

impl LocatedPlaceholder {
    /// Width of the placeholder token in bytes.
    pub fn width(&self) -> usize {
        self.placeholder.len()
    }
}

/// Locate the newest unresolved placeholder and its signature slot.
///
/// When several unresolved placeholders exist (a document prepared twice
/// without signing), the last one in the file wins: it belongs to the newest
/// revision, and its range covers every earlier one.
pub fn locate_placeholder(pdf_data: &[u8]) -> Result<LocatedPlaceholder> {
    let token = RE_UNRESOLVED_BYTE_RANGE
        .find_iter(pdf_data)
        .last()
        .ok_or_else(|| Error::ByteRangeNotFound("no unresolved /ByteRange placeholder".to_string()))?;

    let placeholder = String::from_utf8_lossy(token.as_bytes()).into_owned();
    let byte_range_end = token.end();

    let contents_tag = find_from(pdf_data, b"/Contents ", byte_range_end)
        .ok_or_else(|| Error::ByteRangeNotFound("no /Contents after the placeholder".to_string()))?;
    let slot_open = find_from(pdf_data, b"<", contents_tag)
        .ok_or_else(|| Error::ByteRangeNotFound("no '<' opening the /Contents slot".to_string()))?;
    let slot_close = find_from(pdf_data, b">", slot_open)
        .ok_or_else(|| Error::ByteRangeNotFound("no '>' closing the /Contents slot".to_string()))?;

    let placeholder_length = slot_close - slot_open - 1;
    let byte_range = ByteRange::from_slot(pdf_data.len(), slot_open, placeholder_length, byte_range_end)?;

    log::debug!(
        "Placeholder at {} ({} bytes), slot {}..{} with {} hex chars",
        token.start(),
        placeholder.len(),
        byte_range.sig_start,
        byte_range.sig_end,
        placeholder_length
    );

    Ok(LocatedPlaceholder {
        placeholder,
        offset: token.start(),
        byte_range,
    })
}

fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(byte_range: &str, slot: &str) -> Vec<u8> {
        format!(
            "%PDF-1.4\n7 0 obj\n<</ByteRange {}/ContactInfo ()/Contents <{}>/Filter /Adobe.PPKLite>>\nendobj\ntrailer\n%%EOF\n",
            byte_range, slot
        )
        .into_bytes()
    }

    #[test]
    fn test_locate_star_placeholder() {
        let pdf = prepared("[0 /********** /********** /**********]", &"0".repeat(64));
        let located = locate_placeholder(&pdf).unwrap();

        assert_eq!(located.placeholder, "/ByteRange [0 /********** /********** /**********]");
        assert_eq!(&pdf[located.offset..located.byte_range.byte_range_end], located.placeholder.as_bytes());

        let br = located.byte_range;
        assert_eq!(br.placeholder_length, 64);
        assert_eq!(pdf[br.sig_start], b'<');
        assert_eq!(pdf[br.sig_end - 1], b'>');
        assert_eq!(br.sig_end + br.doc_end, pdf.len());
    }

    #[test]
    fn test_locate_zero_placeholder() {
        let pdf = prepared("[0 0 0 0]", &"0".repeat(8));
        let located = locate_placeholder(&pdf).unwrap();
        assert_eq!(located.placeholder, "/ByteRange [0 0 0 0]");
        assert_eq!(located.byte_range.placeholder_length, 8);
    }

    #[test]
    fn test_populated_range_never_matches() {
        let pdf = prepared("[0 1200 5400 8800]", &"ab".repeat(8));
        assert!(matches!(locate_placeholder(&pdf), Err(Error::ByteRangeNotFound(_))));
    }

    #[test]
    fn test_populated_then_unresolved_picks_unresolved() {
        let mut pdf = prepared("[0 10 20 30]        ", "abcd");
        let second_start = pdf.len();
        pdf.extend(prepared("[0 /********** /********** /**********]", "0000"));
        let located = locate_placeholder(&pdf).unwrap();
        assert!(located.offset > second_start);
    }

    #[test]
    fn test_missing_contents() {
        let pdf = b"<</ByteRange [0 /********** /********** /**********]/Type /Sig>>".to_vec();
        let err = locate_placeholder(&pdf).unwrap_err();
        assert!(err.to_string().contains("/Contents"));
    }

    #[test]
    fn test_unclosed_slot() {
        let pdf = b"<</ByteRange [0 0 0 0]/Contents <0000".to_vec();
        assert!(matches!(locate_placeholder(&pdf), Err(Error::ByteRangeNotFound(_))));
    }

    #[test]
    fn test_no_placeholder_at_all() {
        assert!(matches!(locate_placeholder(b"%PDF-1.4\n%%EOF"), Err(Error::ByteRangeNotFound(_))));
    }
}
