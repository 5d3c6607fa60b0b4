//! End-to-end signing.
//!
//! Runs the stages in order on one document: reserve the slot, locate it,
//! write the real ByteRange, sign the covered bytes through the provider, and
//! splice the signature in. Each call starts from the caller's unsigned bytes;
//! nothing survives a failed or cancelled run.

use crate::certificate;
use crate::config::{SignatureCapacity, SignerConfig};
use crate::error::Result;
use crate::provider::{find_private_key, CertificateFormat, RemoteKeyProvider, RemoteKeySigner};
use crate::signatures::{
    build_signature, estimate_signature_length, insert_placeholder, locate_placeholder, splice_signature,
    write_byte_range_array, DigestSigner, DEFAULT_SIGNATURE_LENGTH,
};

/// Sign `pdf_data` with the certificate `certificate_id` on `provider`.
///
/// The private key is found by the identifier convention of the bridge; the
/// certificate is exported as PEM and embedded in the signature.
pub async fn sign_document(
    pdf_data: &[u8],
    certificate_id: &str,
    provider: &dyn RemoteKeyProvider,
    config: &SignerConfig,
) -> Result<Vec<u8>> {
    config.validate()?;

    let key_id = find_private_key(provider, certificate_id).await?;
    let certificate_pem = provider
        .export_certificate(certificate_id, CertificateFormat::Pem)
        .await?;
    log::debug!("Signing with {} (key {})", certificate_id, key_id);

    let signature_length = signature_length(config, Some(&certificate_pem))?;
    let prepared = insert_placeholder(pdf_data, &config.placeholder_options(signature_length))?;

    let signer = RemoteKeySigner::new(provider, key_id);
    let signed = sign_prepared(&prepared, &certificate_pem, &signer).await?;

    log::info!(
        "Signed document with {}: {} -> {} bytes",
        certificate_id,
        pdf_data.len(),
        signed.len()
    );
    Ok(signed)
}

/// Reserve a signature slot without signing.
///
/// With automatic capacity there is no certificate to measure, so the default
/// length is used.
pub fn presign(pdf_data: &[u8], config: &SignerConfig) -> Result<Vec<u8>> {
    config.validate()?;
    let signature_length = signature_length(config, None)?;
    insert_placeholder(pdf_data, &config.placeholder_options(signature_length))
}

/// Sign a document that already carries an unresolved placeholder.
pub async fn sign_prepared(prepared: &[u8], certificate_pem: &str, signer: &dyn DigestSigner) -> Result<Vec<u8>> {
    let located = locate_placeholder(prepared)?;
    let with_range = write_byte_range_array(prepared, &located)?;
    let signature = build_signature(certificate_pem, signer, &with_range, &located.byte_range).await?;
    splice_signature(&with_range, &located, &signature)
}

/// Slot size in bytes for `config`, measured on the certificate when given.
pub fn signature_length(config: &SignerConfig, certificate_pem: Option<&str>) -> Result<usize> {
    match (config.signature_capacity, certificate_pem) {
        (SignatureCapacity::Fixed(bytes), _) => Ok(bytes),
        (SignatureCapacity::Auto { margin }, Some(pem)) => {
            let cert = certificate::parse_certificate_pem(pem)?;
            let length = estimate_signature_length(&cert, margin)?;
            log::debug!("Estimated signature length {} bytes", length);
            Ok(length)
        },
        (SignatureCapacity::Auto { .. }, None) => Ok(DEFAULT_SIGNATURE_LENGTH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::provider::SoftwareToken;
    use crate::signatures::{SignatureSubFilter, SignatureVerifier, VerificationStatus};

    const SIMPLE: &[u8] = include_bytes!("../tests/fixtures/simple.pdf");
    const RSA_CERT: &str = include_str!("../tests/fixtures/rsa_signer_cert.pem");
    const RSA_KEY: &str = include_str!("../tests/fixtures/rsa_signer_key.pem");

    #[test]
    fn test_pipeline_futures_are_send() {
        fn assert_send<T: Send>(_: &T) {}

        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        let config = SignerConfig::default();
        assert_send(&sign_document(SIMPLE, token.certificate_id(), &token, &config));

        let signer = crate::provider::RemoteKeySigner::new(&token, token.key_id());
        assert_send(&sign_prepared(SIMPLE, RSA_CERT, &signer));
    }

    #[test]
    fn test_signature_length() {
        let fixed = SignerConfig::new().with_signature_length(1612);
        assert_eq!(signature_length(&fixed, Some(RSA_CERT)).unwrap(), 1612);

        let auto = SignerConfig::new();
        assert_eq!(signature_length(&auto, None).unwrap(), DEFAULT_SIGNATURE_LENGTH);
        let estimated = signature_length(&auto, Some(RSA_CERT)).unwrap();
        assert!(estimated > 2048 + 871 && estimated < DEFAULT_SIGNATURE_LENGTH);
    }

    #[test]
    fn test_presign_reserves_configured_slot() {
        let config = SignerConfig::new()
            .with_signature_length(1612)
            .with_sub_filter(SignatureSubFilter::CadesDetached);
        let prepared = presign(SIMPLE, &config).unwrap();
        let located = locate_placeholder(&prepared).unwrap();
        assert_eq!(located.byte_range.placeholder_length, 3224);
    }

    #[tokio::test]
    async fn test_sign_document_with_software_token() {
        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        let config = SignerConfig::new().with_name("RSA Test Signer");
        let signed = sign_document(SIMPLE, token.certificate_id(), &token, &config)
            .await
            .unwrap();

        let result = SignatureVerifier::new().verify(&signed).unwrap();
        assert_eq!(result.status, VerificationStatus::Valid, "{:?}", result.messages);
        assert_eq!(result.signature_info.signer_name.as_deref(), Some("RSA Test Signer"));
    }

    #[tokio::test]
    async fn test_presigned_document_can_be_signed_later() {
        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        let prepared = presign(SIMPLE, &SignerConfig::new()).unwrap();
        let signer = RemoteKeySigner::new(&token, token.key_id());

        let signed = sign_prepared(&prepared, RSA_CERT, &signer).await.unwrap();
        assert_eq!(signed.len(), prepared.len());
        assert!(SignatureVerifier::new().verify(&signed).unwrap().status.is_valid());
    }

    #[tokio::test]
    async fn test_unknown_certificate() {
        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        let err = sign_document(SIMPLE, "x509-nothing-here", &token, &SignerConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(_)));
    }
}
