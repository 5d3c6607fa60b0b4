//! ByteRange value for PDF signatures.
//!
//! PDF digital signatures use a ByteRange array to specify which portions
//! of the document are covered by the signature:
//! `[doc_start sig_start sig_end doc_end]`, where `doc_start` is always 0,
//! `sig_start` is the offset of the `<` opening the `/Contents` slot,
//! `sig_end` is the offset just past its `>`, and `doc_end` is the number of
//! bytes from `sig_end` to the end of the file. The second and fourth values
//! are used as lengths by PDF readers, which works out because the first range
//! starts at 0.

use crate::error::{Error, Result};

/// Offsets of a reserved signature slot inside a prepared document.
///
/// Invariants: `doc_start == 0`,
/// `sig_end == sig_start + placeholder_length + 2`, and
/// `sig_end + doc_end` equals the document length it was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Always 0
    pub doc_start: usize,
    /// Offset of the `<` opening the slot
    pub sig_start: usize,
    /// Offset one past the closing `>`
    pub sig_end: usize,
    /// Bytes from `sig_end` to the end of the document
    pub doc_end: usize,
    /// Hex characters between the brackets
    pub placeholder_length: usize,
    /// Offset one past the `/ByteRange` placeholder token
    pub byte_range_end: usize,
}

impl ByteRange {
    /// Compute the range for a slot at `sig_start` holding `placeholder_length`
    /// hex characters in a document of `total_length` bytes.
    pub fn from_slot(
        total_length: usize,
        sig_start: usize,
        placeholder_length: usize,
        byte_range_end: usize,
    ) -> Result<Self> {
        let sig_end = sig_start + placeholder_length + 2;
        if sig_end > total_length {
            return Err(Error::ByteRangeNotFound(format!(
                "signature slot ends at {} past document length {}",
                sig_end, total_length
            )));
        }

        Ok(Self {
            doc_start: 0,
            sig_start,
            sig_end,
            doc_end: total_length - sig_end,
            placeholder_length,
            byte_range_end,
        })
    }

    /// The four values as written into the document.
    pub fn to_array(&self) -> [usize; 4] {
        [self.doc_start, self.sig_start, self.sig_end, self.doc_end]
    }

    /// Total document length this range was computed for.
    pub fn total_length(&self) -> usize {
        self.sig_end + self.doc_end
    }

    /// Render `/ByteRange [a b c d]` right-padded with spaces to `width`.
    ///
    /// Fails with [`Error::SpliceIntegrity`] when the rendered array is wider
    /// than `width`; writing it would shift every later offset.
    pub fn to_pdf_string(&self, width: usize) -> Result<String> {
        let [a, b, c, d] = self.to_array();
        let actual = format!("/ByteRange [{} {} {} {}]", a, b, c, d);
        if actual.len() > width {
            return Err(Error::SpliceIntegrity(format!(
                "{:?} is {} bytes, placeholder is only {}",
                actual,
                actual.len(),
                width
            )));
        }
        Ok(format!("{:<width$}", actual, width = width))
    }

    /// The detached content: everything except the slot and its brackets.
    pub fn signed_content(&self, pdf_data: &[u8]) -> Result<Vec<u8>> {
        if self.total_length() != pdf_data.len() {
            return Err(Error::SpliceIntegrity(format!(
                "ByteRange covers {} bytes, document has {}",
                self.total_length(),
                pdf_data.len()
            )));
        }

        let mut content = Vec::with_capacity(self.sig_start + self.doc_end);
        content.extend_from_slice(&pdf_data[..self.sig_start]);
        content.extend_from_slice(&pdf_data[self.sig_end..]);
        Ok(content)
    }
}

/// Extract the bytes covered by a ByteRange read from a signed document.
pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
    let mut signed = Vec::new();
    for pair in byte_range.chunks_exact(2) {
        let (offset, length) = (pair[0], pair[1]);
        let range = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(length).ok())
            .and_then(|(o, l)| Some(o..o.checked_add(l)?))
            .filter(|r| r.end <= pdf_data.len())
            .ok_or_else(|| {
                Error::MalformedDocument(format!(
                    "ByteRange segment {} + {} exceeds file size {}",
                    offset,
                    length,
                    pdf_data.len()
                ))
            })?;
        signed.extend_from_slice(&pdf_data[range]);
    }
    Ok(signed)
}

/// Check that a ByteRange starts at 0, has a gap, and ends at `file_size`.
pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
    let [offset1, length1, offset2, length2] = *byte_range;

    if byte_range.iter().any(|&v| v < 0) {
        return Err(Error::MalformedDocument(format!("ByteRange has a negative value: {:?}", byte_range)));
    }
    if offset1 != 0 {
        return Err(Error::MalformedDocument(format!("ByteRange must start at 0, got {}", offset1)));
    }
    if length1 == 0 {
        return Err(Error::MalformedDocument("ByteRange first range is empty".to_string()));
    }
    if length1 >= offset2 {
        return Err(Error::MalformedDocument(format!(
            "ByteRange first range ({}) overlaps second range start ({})",
            length1, offset2
        )));
    }
    let end = offset2.checked_add(length2);
    if end != i64::try_from(file_size).ok() {
        return Err(Error::MalformedDocument(format!(
            "ByteRange must end at file size {}, got {:?}",
            file_size, end
        )));
    }

    Ok(())
}
