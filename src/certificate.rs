//! X.509 certificate helpers.
//!
//! Decoding of PEM/DER certificates into the `x509-cert` model embedded in
//! CMS, signature scheme detection from the subject public key, and readable
//! summaries via `x509-parser`.

use crate::error::{Error, Result};
use crate::signatures::SigningAlgorithm;
use der::asn1::ObjectIdentifier;
use der::pem::LineEnding;
use der::{Decode, DecodePem, EncodePem};
use x509_cert::Certificate;

/// rsaEncryption
pub const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// id-ecPublicKey
pub const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
/// prime256v1 (P-256)
pub const OID_PRIME256V1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// Upper bound of a DER ECDSA P-256 signature.
const ECDSA_P256_MAX_SIGNATURE: usize = 72;

/// Decode a PEM `CERTIFICATE` block.
pub fn parse_certificate_pem(pem: &str) -> Result<Certificate> {
    Certificate::from_pem(pem.trim().as_bytes())
        .map_err(|e| Error::Certificate(format!("cannot decode PEM certificate: {}", e)))
}

/// Decode a DER certificate.
pub fn parse_certificate_der(der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(der).map_err(|e| Error::Certificate(format!("cannot decode DER certificate: {}", e)))
}

/// Encode a certificate as PEM with LF line endings.
pub fn certificate_to_pem(cert: &Certificate) -> Result<String> {
    Ok(cert.to_pem(LineEnding::LF)?)
}

/// Signature scheme matching the certificate's public key.
///
/// RSA keys of any size map to PKCS#1 v1.5; EC keys must be on P-256.
pub fn signing_algorithm(cert: &Certificate) -> Result<SigningAlgorithm> {
    let algorithm = &cert.tbs_certificate.subject_public_key_info.algorithm;

    if algorithm.oid == OID_RSA_ENCRYPTION {
        return Ok(SigningAlgorithm::RsaPkcs1Sha256);
    }
    if algorithm.oid == OID_EC_PUBLIC_KEY {
        let curve = algorithm
            .parameters
            .as_ref()
            .and_then(|p| p.decode_as::<ObjectIdentifier>().ok());
        return match curve {
            Some(oid) if oid == OID_PRIME256V1 => Ok(SigningAlgorithm::EcdsaP256Sha256),
            Some(oid) => Err(Error::Certificate(format!("unsupported EC curve {}", oid))),
            None => Err(Error::Certificate("EC key without named curve".to_string())),
        };
    }

    Err(Error::Certificate(format!(
        "unsupported public key algorithm {}",
        algorithm.oid
    )))
}

/// Largest signature value the certificate's key can produce, in bytes.
pub fn max_signature_len(cert: &Certificate) -> Result<usize> {
    Ok(match signing_algorithm(cert)? {
        // The RSAPublicKey structure is slightly longer than the modulus.
        SigningAlgorithm::RsaPkcs1Sha256 => cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
            .len(),
        SigningAlgorithm::EcdsaP256Sha256 => ECDSA_P256_MAX_SIGNATURE,
    })
}

/// Readable certificate fields for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject common name
    pub common_name: Option<String>,
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number as colon-separated hex
    pub serial: String,
    /// Start of validity
    pub not_before: String,
    /// End of validity
    pub not_after: String,
    /// Whether the current time is outside the validity period
    pub expired: bool,
}

/// Summarize a DER certificate.
pub fn summarize(der: &[u8]) -> Result<CertificateSummary> {
    use x509_parser::prelude::*;

    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| Error::Certificate(format!("cannot parse certificate: {}", e)))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);
    let validity = cert.validity();

    Ok(CertificateSummary {
        common_name,
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: validity.not_before.to_string(),
        not_after: validity.not_after.to_string(),
        expired: !validity.is_valid(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Encode;

    const RSA_CERT: &str = include_str!("../tests/fixtures/rsa_signer_cert.pem");
    const EC_CERT: &str = include_str!("../tests/fixtures/ec_signer_cert.pem");

    #[test]
    fn test_rsa_certificate() {
        let cert = parse_certificate_pem(RSA_CERT).unwrap();
        assert_eq!(signing_algorithm(&cert).unwrap(), SigningAlgorithm::RsaPkcs1Sha256);
        let max = max_signature_len(&cert).unwrap();
        assert!((256..300).contains(&max));
    }

    #[test]
    fn test_ec_certificate() {
        let cert = parse_certificate_pem(EC_CERT).unwrap();
        assert_eq!(signing_algorithm(&cert).unwrap(), SigningAlgorithm::EcdsaP256Sha256);
        assert_eq!(max_signature_len(&cert).unwrap(), 72);
    }

    #[test]
    fn test_pem_roundtrip_through_der() {
        let cert = parse_certificate_pem(RSA_CERT).unwrap();
        let der = cert.to_der().unwrap();
        let again = parse_certificate_der(&der).unwrap();
        assert_eq!(cert, again);
        assert!(certificate_to_pem(&again).unwrap().starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_summary() {
        let der = parse_certificate_pem(EC_CERT).unwrap().to_der().unwrap();
        let summary = summarize(&der).unwrap();
        assert_eq!(summary.common_name.as_deref(), Some("EC Test Signer"));
        assert!(summary.subject.contains("EC Test Signer"));
        assert!(!summary.serial.is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(parse_certificate_pem("not a certificate"), Err(Error::Certificate(_))));
        assert!(matches!(parse_certificate_der(&[0x30, 0x03, 0x02]), Err(Error::Certificate(_))));
        assert!(matches!(summarize(b"junk"), Err(Error::Certificate(_))));
    }
}
