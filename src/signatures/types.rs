//! Digital signature types and data structures.

use serde::{Deserialize, Serialize};

/// Signature sub-filter written into the signature dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    #[serde(rename = "adbe.pkcs7.detached")]
    Pkcs7Detached,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    #[serde(rename = "ETSI.CAdES.detached")]
    CadesDetached,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }
}

/// Raw signature scheme requested from a key holder.
///
/// Both schemes sign a SHA-256 digest. The scheme is derived from the public
/// key in the signer certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RsaPkcs1Sha256,
    /// ECDSA on P-256 with SHA-256
    EcdsaP256Sha256,
}

impl SigningAlgorithm {
    /// Name as used by WebCrypto-style bridges.
    pub fn name(&self) -> &'static str {
        match self {
            SigningAlgorithm::RsaPkcs1Sha256 => "RSASSA-PKCS1-v1_5",
            SigningAlgorithm::EcdsaP256Sha256 => "ECDSA",
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/SHA-256", self.name())
    }
}

/// Information about an existing signature in a PDF.
#[derive(Debug, Clone, Default)]
pub struct SignatureInfo {
    /// Name of the signer
    pub signer_name: Option<String>,
    /// Signing time from the /M entry
    pub signing_time: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Signature sub-filter type
    pub sub_filter: Option<SignatureSubFilter>,
    /// Whether the signature covers the whole document
    pub covers_whole_document: bool,
    /// Byte range of the signed data
    pub byte_range: Vec<i64>,
    /// Certificate subject common name
    pub certificate_cn: Option<String>,
    /// Certificate issuer
    pub certificate_issuer: Option<String>,
    /// Certificate validity start
    pub valid_from: Option<String>,
    /// Certificate validity end
    pub valid_to: Option<String>,
}

/// Result of signature verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Overall verification status
    pub status: VerificationStatus,
    /// Signature information
    pub signature_info: SignatureInfo,
    /// Verification messages (errors, warnings)
    pub messages: Vec<String>,
    /// Whether bytes were appended after the signed revision
    pub document_modified: bool,
    /// Whether the message-digest attribute matches the signed bytes
    pub digest_matches: bool,
    /// Whether the signature value verifies against the embedded certificate
    pub signature_valid: bool,
    /// Whether the certificate is outside its validity period
    pub certificate_expired: bool,
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self {
            status: VerificationStatus::Unknown,
            signature_info: SignatureInfo::default(),
            messages: Vec::new(),
            document_modified: false,
            digest_matches: false,
            signature_valid: false,
            certificate_expired: false,
        }
    }
}

/// Verification status of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Signature is valid
    Valid,
    /// Signature is invalid (cryptographically)
    Invalid,
    /// Signature validity is unknown
    Unknown,
    /// Signature is valid but the document was extended or the certificate expired
    ValidWithWarnings,
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }

    /// Check if the status indicates any form of validity (including warnings).
    pub fn is_ok(&self) -> bool {
        matches!(self, VerificationStatus::Valid | VerificationStatus::ValidWithWarnings)
    }
}
