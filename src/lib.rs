// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]
#![cfg_attr(test, allow(unused_variables))]

//! # PDF Token Sign
//!
//! Byte-range PDF signing with the private key held by an external token.
//!
//! ## Core Features
//!
//! - **Placeholder Reservation**: appends an incremental update with a signature
//!   field, a `/ByteRange` placeholder and a zero-filled `/Contents` slot
//! - **Byte-Range Location**: exact byte offsets of the slot in the prepared file
//! - **Detached CMS**: PKCS#7 SignedData with SHA-256 and signed attributes; the
//!   raw signature is requested from a [`RemoteKeyProvider`]
//! - **In-place Splicing**: the signature lands in the reserved bytes without
//!   moving anything else
//! - **Verification**: digest and signature checks of signed documents
//!
//! ## Architecture
//! - **Async signing seam**: [`signatures::DigestSigner`] and
//!   [`provider::RemoteKeyProvider`] are `async-trait` traits; signing a digest is
//!   the only suspension point
//! - **Minimal PDF layer**: just enough object syntax to read the last revision
//!   and write one incremental update
//!
//! ## Quick Start - Rust
//!
//! ```ignore
//! use pdf_token_sign::config::SignerConfig;
//! use pdf_token_sign::pipeline::sign_document;
//! use pdf_token_sign::provider::SoftwareToken;
//!
//! # async fn run() -> pdf_token_sign::Result<()> {
//! let token = SoftwareToken::from_files("signer.pem", "signer.key")?;
//! let pdf = std::fs::read("contract.pdf")?;
//!
//! let signed = sign_document(&pdf, token.certificate_id(), &token, &SignerConfig::default()).await?;
//! std::fs::write("contract.signed.pdf", signed)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Minimal PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod xref;

// Incremental update writing
pub mod writer;

// Byte-range signing core
pub mod signatures;

// Certificates and key providers
pub mod certificate;
pub mod provider;

// Signing pipeline
pub mod pipeline;

// Configuration
pub mod config;

// Re-exports
pub use config::{SignatureCapacity, SignerConfig};
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use object::{Object, ObjectRef};
pub use pipeline::{presign, sign_document, sign_prepared};
pub use provider::{CertificateFormat, KeyKind, RemoteKeyProvider, RemoteKeySigner, SoftwareToken};
pub use signatures::{
    ByteRange, DigestSigner, LocatedPlaceholder, PlaceholderOptions, SignatureSubFilter, SignatureVerifier,
    SigningAlgorithm, VerificationResult, VerificationStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pdf_token_sign");
    }
}
