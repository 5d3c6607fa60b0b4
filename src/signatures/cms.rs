//! Detached CMS signature construction.
//!
//! Builds a `ContentInfo(SignedData)` with a single signer for the bytes a
//! [`ByteRange`] covers. The raw signature value comes from a [`DigestSigner`],
//! so key material never enters this module.
//!
//! Layout:
//! - digest algorithm SHA-256, detached `id-data` content
//! - the signer certificate in `certificates`
//! - signed attributes content-type, signing-time and message-digest
//! - `SignerIdentifier::IssuerAndSerialNumber`

use super::byterange::ByteRange;
use super::types::SigningAlgorithm;
use crate::certificate::{self, OID_RSA_ENCRYPTION};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::Encode;
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

/// id-data
pub const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// id-signedData
pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// id-contentType attribute
pub const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
/// id-messageDigest attribute
pub const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// id-signingTime attribute
pub const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
/// id-sha256
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
/// ecdsa-with-SHA256
pub const OID_ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

/// Structure bytes around the certificate and signature value: OIDs,
/// attributes, algorithm identifiers and length headers.
const CMS_OVERHEAD: usize = 512;

/// Produces the raw signature over a SHA-256 digest.
///
/// This is the only suspension point of a signing run. Implementations talk to
/// whatever holds the private key.
#[async_trait]
pub trait DigestSigner: Send + Sync {
    /// Sign `digest`, the SHA-256 of the DER signed attributes.
    ///
    /// RSA signers return the PKCS#1 v1.5 signature value; ECDSA signers return
    /// a DER `Ecdsa-Sig-Value`.
    async fn sign(&self, digest: &[u8], algorithm: SigningAlgorithm) -> Result<Vec<u8>>;
}

/// Build the hex signature for the slot described by `byte_range`.
///
/// The result is lower-case hex padded with `0` to exactly
/// `byte_range.placeholder_length` characters.
pub async fn build_signature(
    certificate_pem: &str,
    signer: &dyn DigestSigner,
    pdf_data: &[u8],
    byte_range: &ByteRange,
) -> Result<String> {
    build_signature_at(certificate_pem, signer, pdf_data, byte_range, Utc::now()).await
}

/// [`build_signature`] with a fixed signing-time attribute.
pub async fn build_signature_at(
    certificate_pem: &str,
    signer: &dyn DigestSigner,
    pdf_data: &[u8],
    byte_range: &ByteRange,
    signing_time: DateTime<Utc>,
) -> Result<String> {
    let cert = certificate::parse_certificate_pem(certificate_pem)?;
    let algorithm = certificate::signing_algorithm(&cert)?;

    let content = byte_range.signed_content(pdf_data)?;
    let content_digest = Sha256::digest(&content);
    log::debug!("Detached content: {} bytes", content.len());

    let signed_attrs = signed_attributes(&content_digest, signing_time)?;
    let attrs_digest = Sha256::digest(signed_attrs.to_der()?);

    let signature = signer.sign(&attrs_digest, algorithm).await?;
    log::debug!("{} signature value: {} bytes", algorithm, signature.len());

    let der = encode_signed_data(&cert, algorithm, signed_attrs, signature)?;
    pad_signature_hex(hex::encode(der), byte_range.placeholder_length)
}

/// Right-pad `hex` with `0` to `placeholder_length` characters.
pub fn pad_signature_hex(mut hex: String, placeholder_length: usize) -> Result<String> {
    if hex.len() > placeholder_length {
        return Err(Error::SignatureTooLarge {
            required: hex.len(),
            available: placeholder_length,
        });
    }
    if (placeholder_length - hex.len()) % 2 != 0 {
        return Err(Error::SpliceIntegrity(format!(
            "slot of {} hex characters cannot hold whole bytes",
            placeholder_length
        )));
    }

    let used = hex.len();
    hex.extend(std::iter::repeat('0').take(placeholder_length - used));
    log::debug!("Signature uses {} of {} hex characters", used, placeholder_length);
    Ok(hex)
}

/// Slot size in bytes for signatures made with `cert`'s key.
///
/// Certificate, signer identifier and signature value are measured; `margin`
/// is added on top of a fixed structure allowance.
pub fn estimate_signature_length(cert: &Certificate, margin: usize) -> Result<usize> {
    let tbs = &cert.tbs_certificate;
    let sid = tbs.issuer.to_der()?.len() + tbs.serial_number.to_der()?.len();
    Ok(cert.to_der()?.len() + sid + certificate::max_signature_len(cert)? + CMS_OVERHEAD + margin)
}

/// content-type, signing-time and message-digest in DER set order.
pub fn signed_attributes(content_digest: &[u8], signing_time: DateTime<Utc>) -> Result<SignedAttributes> {
    let seconds = u64::try_from(signing_time.timestamp())
        .map_err(|_| Error::Config(format!("signing time {} predates 1970", signing_time)))?;
    let utc_time = UtcTime::from_unix_duration(Duration::from_secs(seconds))?;

    let attributes = vec![
        attribute(OID_CONTENT_TYPE, Any::encode_from(&OID_DATA)?)?,
        attribute(OID_SIGNING_TIME, Any::encode_from(&utc_time)?)?,
        attribute(OID_MESSAGE_DIGEST, Any::encode_from(&OctetString::new(content_digest)?)?)?,
    ];
    Ok(SetOfVec::try_from(attributes)?)
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

fn encode_signed_data(
    cert: &Certificate,
    algorithm: SigningAlgorithm,
    signed_attrs: SignedAttributes,
    signature: Vec<u8>,
) -> Result<Vec<u8>> {
    let digest_alg = AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: None,
    };
    let signature_algorithm = match algorithm {
        SigningAlgorithm::RsaPkcs1Sha256 => AlgorithmIdentifierOwned {
            oid: OID_RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        SigningAlgorithm::EcdsaP256Sha256 => AlgorithmIdentifierOwned {
            oid: OID_ECDSA_WITH_SHA256,
            parameters: None,
        },
    };

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: cert.tbs_certificate.issuer.clone(),
            serial_number: cert.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: digest_alg.clone(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm,
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest_alg])?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(SetOfVec::try_from(vec![
            CertificateChoices::Certificate(cert.clone()),
        ])?)),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
    };

    let content_info = ContentInfo {
        content_type: OID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };
    Ok(content_info.to_der()?)
}
