//! Signature splicing.
//!
//! Turns a prepared document into a signed one in three checked steps:
//! write the real ByteRange over the placeholder token, cut the zero-filled
//! slot out, and put the hex signature back in its place. Every step checks its
//! offsets against the [`ByteRange`] and fails with
//! [`Error::SpliceIntegrity`] instead of producing a shifted document.

use super::byterange::ByteRange;
use super::locator::LocatedPlaceholder;
use crate::error::{Error, Result};

/// Overwrite the placeholder token with the padded ByteRange array.
///
/// The document length is unchanged. A document that already carries the
/// same array at the token offset is returned as is; the signature is computed
/// over that state, so the array must be in place before signing.
pub fn write_byte_range_array(pdf_data: &[u8], located: &LocatedPlaceholder) -> Result<Vec<u8>> {
    let start = located.offset;
    let end = located.byte_range.byte_range_end;
    let actual = located.byte_range.to_pdf_string(located.width())?;

    match pdf_data.get(start..end) {
        Some(token) if token == located.placeholder.as_bytes() => {},
        Some(token) if token == actual.as_bytes() => return Ok(pdf_data.to_vec()),
        _ => {
            return Err(Error::SpliceIntegrity(format!(
                "placeholder {:?} not found at offset {}",
                located.placeholder, start
            )))
        },
    }

    let mut out = pdf_data.to_vec();
    out[start..end].copy_from_slice(actual.as_bytes());

    log::debug!("Wrote {} at {}", actual.trim_end(), start);
    Ok(out)
}

/// Remove the `<...>` slot, leaving the bytes that will be signed.
pub fn strip_placeholder_contents(pdf_data: &[u8], byte_range: &ByteRange) -> Result<Vec<u8>> {
    let ByteRange { sig_start, sig_end, doc_end, .. } = *byte_range;

    if sig_end + doc_end != pdf_data.len() {
        return Err(Error::SpliceIntegrity(format!(
            "ByteRange ends at {}, document has {} bytes",
            sig_end + doc_end,
            pdf_data.len()
        )));
    }
    if pdf_data[sig_start] != b'<' || pdf_data[sig_end - 1] != b'>' {
        return Err(Error::SpliceIntegrity(format!(
            "no <...> slot at {}..{}",
            sig_start, sig_end
        )));
    }

    byte_range.signed_content(pdf_data)
}

/// Insert `<hex>` at `sig_start` of a stripped document.
///
/// `hex` must already be padded to exactly `placeholder_length` characters;
/// the result has the length of the prepared document.
pub fn insert_signature_bytes(stripped: &[u8], hex: &str, byte_range: &ByteRange) -> Result<Vec<u8>> {
    if hex.len() != byte_range.placeholder_length {
        return Err(Error::SpliceIntegrity(format!(
            "signature is {} hex characters, slot holds {}",
            hex.len(),
            byte_range.placeholder_length
        )));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::SpliceIntegrity("signature contains non-hex characters".to_string()));
    }
    if stripped.len() != byte_range.sig_start + byte_range.doc_end {
        return Err(Error::SpliceIntegrity(format!(
            "stripped document has {} bytes, expected {}",
            stripped.len(),
            byte_range.sig_start + byte_range.doc_end
        )));
    }

    let mut out = Vec::with_capacity(byte_range.total_length());
    out.extend_from_slice(&stripped[..byte_range.sig_start]);
    out.push(b'<');
    out.extend_from_slice(hex.as_bytes());
    out.push(b'>');
    out.extend_from_slice(&stripped[byte_range.sig_start..]);

    debug_assert_eq!(out.len(), byte_range.total_length());
    Ok(out)
}

/// Run all three steps with a signature computed elsewhere.
pub fn splice_signature(pdf_data: &[u8], located: &LocatedPlaceholder, hex: &str) -> Result<Vec<u8>> {
    let with_range = write_byte_range_array(pdf_data, located)?;
    let stripped = strip_placeholder_contents(&with_range, &located.byte_range)?;
    insert_signature_bytes(&stripped, hex, &located.byte_range)
}
