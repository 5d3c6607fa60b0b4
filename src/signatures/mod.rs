//! PDF Digital Signatures module.
//!
//! The byte-range signing core: reserve a signature slot in an unsigned PDF,
//! find it again by byte offset, build a detached CMS signature over everything
//! outside the slot, and splice the signature back into the exact same bytes.
//!
//! ## Stages
//!
//! - **Placeholder**: append an incremental update with a `/ByteRange`
//!   placeholder and a zero-filled `/Contents` slot
//! - **Locator**: compute the [`ByteRange`] from the placeholder position
//! - **CMS**: detached SignedData, SHA-256, signed attributes; the raw
//!   signature comes from a [`DigestSigner`]
//! - **Splicer**: write the ByteRange, drop the slot, insert the signature
//! - **Verifier**: check a signed document
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PAdES signatures (ETSI.CAdES.detached)
//!
//! ## Example
//!
//! ```ignore
//! use pdf_token_sign::signatures::{insert_placeholder, locate_placeholder, PlaceholderOptions};
//!
//! let prepared = insert_placeholder(&pdf, &PlaceholderOptions::default())?;
//! let located = locate_placeholder(&prepared)?;
//! let hex = build_signature(&certificate_pem, &signer, &prepared, &located.byte_range).await?;
//! let signed = splice_signature(&prepared, &located, &hex)?;
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ETSI TS 102 778 - PAdES

mod byterange;
mod cms;
mod locator;
mod placeholder;
mod splicer;
mod types;
mod verifier;

pub use self::cms::{
    build_signature, build_signature_at, estimate_signature_length, pad_signature_hex, signed_attributes,
    DigestSigner,
};
pub use byterange::{extract_signed_bytes, validate_byte_range, ByteRange};
pub use locator::{locate_placeholder, LocatedPlaceholder};
pub use placeholder::{
    insert_placeholder, remove_trailing_newline, PlaceholderOptions, BYTE_RANGE_PLACEHOLDER, DEFAULT_REASON,
    DEFAULT_SIGNATURE_LENGTH,
};
pub use splicer::{insert_signature_bytes, splice_signature, strip_placeholder_contents, write_byte_range_array};
pub use types::{
    SignatureInfo, SignatureSubFilter, SigningAlgorithm, VerificationResult, VerificationStatus,
};
pub use verifier::SignatureVerifier;
