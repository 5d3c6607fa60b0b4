//! PDF signature verification.
//!
//! Checks signatures produced by the signing pipeline (or any detached
//! PKCS#7/CAdES signer): the ByteRange geometry, the message-digest attribute
//! against the signed bytes, and the signature value over the signed
//! attributes with the embedded certificate. Chain building and revocation are
//! not checked.

use super::byterange::{extract_signed_bytes, validate_byte_range};
use super::cms::{OID_ECDSA_WITH_SHA256, OID_MESSAGE_DIGEST};
use super::types::{SignatureInfo, SignatureSubFilter, VerificationResult, VerificationStatus};
use crate::certificate::{self, OID_RSA_ENCRYPTION};
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::parser::decode_hex;
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{ObjectIdentifier, OctetString};
use der::{Decode, Encode, SliceReader};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

/// sha256WithRSAEncryption, accepted in place of rsaEncryption.
const OID_SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// Verifier for PDF digital signatures.
#[derive(Debug, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Create a new signature verifier.
    pub fn new() -> Self {
        Self
    }

    /// Extract signature information from a signature dictionary.
    pub fn extract_signature_info(&self, sig_dict: &Object) -> Result<SignatureInfo> {
        let dict = match sig_dict {
            Object::Dictionary(d) => d,
            _ => return Err(Error::MalformedDocument("Signature must be a dictionary".to_string())),
        };
        let text = |key: &str| dict.get(key).and_then(Object::as_text);

        let mut info = SignatureInfo {
            signer_name: text("Name"),
            signing_time: text("M"),
            reason: text("Reason"),
            location: text("Location"),
            contact_info: text("ContactInfo"),
            ..SignatureInfo::default()
        };

        if let Some(Object::Name(sub_filter)) = dict.get("SubFilter") {
            info.sub_filter = SignatureSubFilter::from_pdf_name(sub_filter);
        }

        if let Some(Object::Array(byte_range)) = dict.get("ByteRange") {
            info.byte_range = byte_range.iter().filter_map(Object::as_integer).collect();
        }

        // Check if signature covers whole document (ByteRange should be 4 elements)
        info.covers_whole_document = info.byte_range.len() == 4;

        Ok(info)
    }

    /// Signature dictionaries of all signed `/FT /Sig` fields, in field order.
    pub fn signature_dictionaries(&self, doc: &PdfDocument<'_>) -> Result<Vec<Object>> {
        let catalog = doc.catalog()?;
        let acroform = match catalog.get("AcroForm") {
            Some(obj) => doc.resolve(obj)?,
            None => return Ok(Vec::new()),
        };
        let fields = match acroform.as_dict().and_then(|d| d.get("Fields")) {
            Some(obj) => doc.resolve(obj)?,
            None => return Ok(Vec::new()),
        };

        let mut signatures = Vec::new();
        for field in fields.as_array().map(Vec::as_slice).unwrap_or_default() {
            let field = match doc.resolve(field) {
                Ok(f) => f,
                Err(e) => {
                    log::warn!("Skipping unreadable form field: {}", e);
                    continue;
                },
            };
            let Some(dict) = field.as_dict() else { continue };
            if dict.get("FT").and_then(Object::as_name) != Some("Sig") {
                continue;
            }
            if let Some(value) = dict.get("V") {
                let value = doc.resolve(value)?;
                // Unresolved placeholders have names in their ByteRange.
                let populated = value
                    .as_dict()
                    .and_then(|d| d.get("ByteRange"))
                    .and_then(Object::as_array)
                    .is_some_and(|range| range.iter().all(|v| v.as_integer().is_some()));
                if populated {
                    signatures.push(value);
                }
            }
        }
        Ok(signatures)
    }

    /// Verify the newest signature of a document.
    pub fn verify(&self, pdf_data: &[u8]) -> Result<VerificationResult> {
        let doc = PdfDocument::parse(pdf_data)?;
        let sig_dict = self
            .signature_dictionaries(&doc)?
            .pop()
            .ok_or_else(|| Error::MalformedDocument("document has no signed signature field".to_string()))?;
        self.verify_signature(pdf_data, &sig_dict)
    }

    /// Verify every signature of a document.
    pub fn verify_all(&self, pdf_data: &[u8]) -> Result<Vec<VerificationResult>> {
        let doc = PdfDocument::parse(pdf_data)?;
        self.signature_dictionaries(&doc)?
            .iter()
            .map(|sig_dict| self.verify_signature(pdf_data, sig_dict))
            .collect()
    }

    /// Verify one signature dictionary against the document bytes.
    pub fn verify_signature(&self, pdf_data: &[u8], sig_dict: &Object) -> Result<VerificationResult> {
        let mut result = VerificationResult {
            signature_info: self.extract_signature_info(sig_dict)?,
            ..VerificationResult::default()
        };

        let byte_range: [i64; 4] = match result.signature_info.byte_range.as_slice().try_into() {
            Ok(range) => range,
            Err(_) => {
                return Ok(invalid(result, "Invalid ByteRange: expected 4 elements".to_string()));
            },
        };

        // A signed revision may be followed by later incremental updates.
        let covered_end = match usize::try_from(byte_range[2].saturating_add(byte_range[3])) {
            Ok(end) if end <= pdf_data.len() => end,
            _ => {
                return Ok(invalid(
                    result,
                    format!("ByteRange {:?} ends outside the file", byte_range),
                ));
            },
        };
        if let Err(e) = validate_byte_range(&byte_range, covered_end) {
            return Ok(invalid(result, format!("ByteRange validation failed: {}", e)));
        }
        result.document_modified = covered_end < pdf_data.len();

        let slot = usize::try_from(byte_range[1])
            .ok()
            .zip(usize::try_from(byte_range[2]).ok())
            .and_then(|(start, end)| pdf_data.get(start..end));
        let hex = match slot {
            Some([b'<', hex @ .., b'>']) => hex,
            _ => return Ok(invalid(result, "ByteRange gap is not the /Contents string".to_string())),
        };
        let contents = match decode_hex(hex) {
            Ok(contents) => contents,
            Err(e) => return Ok(invalid(result, format!("/Contents is not a hex string: {}", e))),
        };
        let signed_bytes = extract_signed_bytes(pdf_data, &byte_range)?;

        match verify_pkcs7(&contents, &signed_bytes) {
            Ok(checked) => {
                result.digest_matches = checked.digest_matches;
                result.signature_valid = checked.signature_valid;
                result.messages.extend(checked.messages);

                if let Some(summary) = checked.summary {
                    result.signature_info.certificate_cn = summary.common_name;
                    result.signature_info.certificate_issuer = Some(summary.issuer);
                    result.signature_info.valid_from = Some(summary.not_before);
                    result.signature_info.valid_to = Some(summary.not_after);
                    result.certificate_expired = summary.expired;
                }
            },
            Err(e) => {
                return Ok(invalid(result, format!("Signature verification failed: {}", e)));
            },
        }

        result.status = if !result.digest_matches || !result.signature_valid {
            VerificationStatus::Invalid
        } else if result.document_modified || result.certificate_expired {
            VerificationStatus::ValidWithWarnings
        } else {
            VerificationStatus::Valid
        };

        if result.document_modified {
            result
                .messages
                .push("Document was modified after signing".to_string());
        }
        if result.certificate_expired {
            log::warn!("Signer certificate is outside its validity period");
            result.messages.push("Certificate has expired".to_string());
        }

        log::info!("Signature verification: {:?}", result.status);
        Ok(result)
    }
}

fn invalid(mut result: VerificationResult, message: String) -> VerificationResult {
    result.status = VerificationStatus::Invalid;
    result.messages.push(message);
    result
}

/// Outcome of the CMS checks.
struct Pkcs7Check {
    digest_matches: bool,
    signature_valid: bool,
    messages: Vec<String>,
    summary: Option<certificate::CertificateSummary>,
}

/// Decode the CMS blob (ignoring zero padding) and check it against `signed_bytes`.
fn verify_pkcs7(pkcs7_data: &[u8], signed_bytes: &[u8]) -> Result<Pkcs7Check> {
    let mut reader = SliceReader::new(pkcs7_data)?;
    let content_info = ContentInfo::decode(&mut reader)?;
    let signed_data: SignedData = content_info.content.decode_as()?;

    let signer_info = signed_data
        .signer_infos
        .0
        .get(0)
        .ok_or_else(|| Error::MalformedDocument("SignedData has no signer".to_string()))?;
    let cert = signer_certificate(&signed_data, signer_info)?;

    let mut check = Pkcs7Check {
        digest_matches: false,
        signature_valid: false,
        messages: Vec::new(),
        summary: None,
    };
    match certificate::summarize(&cert.to_der()?) {
        Ok(summary) => check.summary = Some(summary),
        Err(e) => check.messages.push(format!("Certificate details unavailable: {}", e)),
    }

    let signed_attrs = signer_info
        .signed_attrs
        .as_ref()
        .ok_or_else(|| Error::MalformedDocument("SignerInfo has no signed attributes".to_string()))?;

    let message_digest: Option<OctetString> = signed_attrs
        .iter()
        .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
        .and_then(|attr| attr.values.get(0))
        .and_then(|value| value.decode_as().ok());
    check.digest_matches = match message_digest {
        Some(digest) => digest.as_bytes() == Sha256::digest(signed_bytes).as_slice(),
        None => false,
    };
    if !check.digest_matches {
        check
            .messages
            .push("Message digest does not match the signed bytes".to_string());
    }

    let attrs_der = signed_attrs.to_der()?;
    let spki_der = cert.tbs_certificate.subject_public_key_info.to_der()?;
    let signature = signer_info.signature.as_bytes();
    let algorithm = signer_info.signature_algorithm.oid;

    check.signature_valid = if algorithm == OID_RSA_ENCRYPTION || algorithm == OID_SHA256_WITH_RSA {
        let public = RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::Certificate(format!("cannot read RSA public key: {}", e)))?;
        public
            .verify(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(&attrs_der), signature)
            .is_ok()
    } else if algorithm == OID_ECDSA_WITH_SHA256 {
        use signature::Verifier;

        let public = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::Certificate(format!("cannot read EC public key: {}", e)))?;
        p256::ecdsa::Signature::from_der(signature)
            .map(|sig| public.verify(&attrs_der, &sig).is_ok())
            .unwrap_or(false)
    } else {
        check
            .messages
            .push(format!("Unsupported signature algorithm {}", algorithm));
        false
    };
    if !check.signature_valid {
        check
            .messages
            .push("Signature value does not verify with the embedded certificate".to_string());
    }

    Ok(check)
}

/// The embedded certificate named by the signer identifier.
fn signer_certificate(signed_data: &SignedData, signer_info: &SignerInfo) -> Result<Certificate> {
    let certificates = signed_data
        .certificates
        .as_ref()
        .map(|set| set.0.iter())
        .into_iter()
        .flatten()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert),
            _ => None,
        });

    for cert in certificates {
        let matches = match &signer_info.sid {
            SignerIdentifier::IssuerAndSerialNumber(id) => {
                cert.tbs_certificate.issuer == id.issuer && cert.tbs_certificate.serial_number == id.serial_number
            },
            SignerIdentifier::SubjectKeyIdentifier(_) => true,
        };
        if matches {
            return Ok(cert.clone());
        }
    }

    Err(Error::Certificate("signer certificate is not embedded".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_sig_dict() -> Object {
        let mut dict = HashMap::new();
        dict.insert("Type".to_string(), Object::Name("Sig".to_string()));
        dict.insert("Filter".to_string(), Object::Name("Adobe.PPKLite".to_string()));
        dict.insert("SubFilter".to_string(), Object::Name("adbe.pkcs7.detached".to_string()));
        dict.insert("Name".to_string(), Object::String(b"Test Signer".to_vec()));
        dict.insert("Reason".to_string(), Object::String(b"Testing".to_vec()));
        dict.insert("Location".to_string(), Object::String(b"Test City".to_vec()));
        dict.insert("M".to_string(), Object::String(b"D:20240101120000Z".to_vec()));
        dict.insert(
            "ByteRange".to_string(),
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(10),
                Object::Integer(16),
                Object::Integer(4),
            ]),
        );
        Object::Dictionary(dict)
    }

    #[test]
    fn test_extract_signature_info() {
        let verifier = SignatureVerifier::new();
        let info = verifier.extract_signature_info(&make_sig_dict()).unwrap();

        assert_eq!(info.signer_name, Some("Test Signer".to_string()));
        assert_eq!(info.reason, Some("Testing".to_string()));
        assert_eq!(info.location, Some("Test City".to_string()));
        assert_eq!(info.sub_filter, Some(SignatureSubFilter::Pkcs7Detached));
        assert_eq!(info.byte_range, vec![0, 10, 16, 4]);
        assert!(info.covers_whole_document);
    }

    #[test]
    fn test_extract_utf16_name() {
        let mut dict = HashMap::new();
        dict.insert("Name".to_string(), Object::String(vec![0xFE, 0xFF, 0x00, 0x4A, 0x01, 0x0D]));
        let info = SignatureVerifier::new()
            .extract_signature_info(&Object::Dictionary(dict))
            .unwrap();
        assert_eq!(info.signer_name.as_deref(), Some("J\u{10D}"));
    }

    #[test]
    fn test_short_byte_range_is_invalid() {
        let mut dict = HashMap::new();
        dict.insert("ByteRange".to_string(), Object::Array(vec![Object::Integer(0)]));
        let result = SignatureVerifier::new()
            .verify_signature(b"whatever", &Object::Dictionary(dict))
            .unwrap();
        assert_eq!(result.status, VerificationStatus::Invalid);
    }

    #[test]
    fn test_byte_range_past_end_is_invalid() {
        let result = SignatureVerifier::new()
            .verify_signature(b"0123456789<abcd>", &make_sig_dict())
            .unwrap();
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert!(result.messages[0].contains("outside the file"));
    }

    fn dict_with_range(range: [i64; 4]) -> Object {
        let mut dict = HashMap::new();
        dict.insert(
            "ByteRange".to_string(),
            Object::Array(range.iter().map(|&v| Object::Integer(v)).collect()),
        );
        Object::Dictionary(dict)
    }

    #[test]
    fn test_negative_and_empty_ranges_are_invalid() {
        let verifier = SignatureVerifier::new();
        let data = b"0123456789abcdef";
        for range in [
            [0, -10, -5, 10],
            [0, -10, 6, 10],
            [0, 10, -5, 21],
            [0, 0, 6, 10],
            [0, 10, 10, 6],
            [0, 10, i64::MAX, 1],
        ] {
            let result = verifier.verify_signature(data, &dict_with_range(range)).unwrap();
            assert_eq!(result.status, VerificationStatus::Invalid, "{:?}", range);
        }
    }

    #[test]
    fn test_gap_must_be_contents_string() {
        let result = SignatureVerifier::new()
            .verify_signature(b"0123456789(abcd)wxyz", &make_sig_dict())
            .unwrap();
        assert_eq!(result.status, VerificationStatus::Invalid);
    }

    #[test]
    fn test_garbage_contents_is_invalid() {
        let result = SignatureVerifier::new()
            .verify_signature(b"0123456789<abcd>wxyz", &make_sig_dict())
            .unwrap();
        assert_eq!(result.status, VerificationStatus::Invalid);
        assert!(result.messages[0].starts_with("Signature verification failed"));
    }

    #[test]
    fn test_unsigned_document_has_no_signature() {
        let pdf = include_bytes!("../../tests/fixtures/simple.pdf");
        assert!(SignatureVerifier::new().verify(pdf).is_err());
        assert!(SignatureVerifier::new().verify_all(pdf).unwrap().is_empty());
    }
}
