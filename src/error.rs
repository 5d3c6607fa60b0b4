//! Error types for the signing pipeline.
//!
//! Every stage of the pipeline reports failures through [`Error`]. The variants
//! map one-to-one onto the ways a signing attempt can end: bad input, a missing
//! placeholder, an undersized slot, a failing token, or an internal offset bug.

/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while preparing, signing or splicing a PDF.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input is not a PDF the placeholder inserter can augment.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The `/ByteRange` placeholder or the `/Contents` slot could not be found.
    ///
    /// Signing cannot resume from this state; restart from the unsigned copy.
    #[error("ByteRange placeholder not found: {0}")]
    ByteRangeNotFound(String),

    /// The reserved `/Contents` slot is too small for the produced signature.
    #[error("Signature exceeds placeholder length: {required} > {available} hex characters")]
    SignatureTooLarge {
        /// Hex characters the signature needs
        required: usize,
        /// Hex characters reserved in the document
        available: usize,
    },

    /// The key provider could not produce a signature (device missing, PIN
    /// rejected, user cancelled).
    #[error("Remote signing failed: {0}")]
    RemoteSigning(String),

    /// A splice step produced offsets that disagree with the computed ByteRange.
    #[error("Splice integrity violated: {0}")]
    SpliceIntegrity(String),

    /// Certificate could not be decoded or used.
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// No private key on the provider matches the requested certificate.
    #[error("No private key found for {0}")]
    KeyNotFound(String),

    /// DER encoding or decoding failure.
    #[error("ASN.1 error: {0}")]
    Asn1(#[from] der::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the caller may retry the same request unchanged.
    ///
    /// Only token failures qualify; the device state is unaffected by a failed
    /// attempt. Retries must start again from the original unsigned bytes.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::RemoteSigning(_))
    }

    /// Whether the error indicates a state that can never be completed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ByteRangeNotFound(_) | Error::SpliceIntegrity(_))
    }
}
