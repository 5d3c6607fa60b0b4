//! In-process token backed by PEM files.
//!
//! Stands in for a hardware token behind a bridge: it answers the same
//! requests with the same identifier scheme and returns ECDSA signatures as raw
//! `r || s` like a WebCrypto bridge does.

use super::{CertificateFormat, KeyKind, RemoteKeyProvider};
use crate::certificate;
use crate::error::{Error, Result};
use crate::signatures::SigningAlgorithm;
use async_trait::async_trait;
use der::Encode;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use signature::hazmat::PrehashSigner;
use std::path::Path;

enum SoftwareKey {
    Rsa(RsaPrivateKey),
    Ecdsa(p256::ecdsa::SigningKey),
}

/// A single certificate and its PKCS#8 private key.
pub struct SoftwareToken {
    certificate_pem: String,
    certificate_id: String,
    key_id: String,
    public_key_id: String,
    key: SoftwareKey,
}

impl std::fmt::Debug for SoftwareToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareToken")
            .field("certificate_id", &self.certificate_id)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SoftwareToken {
    /// Load a certificate and the private key for its public key.
    ///
    /// RSA keys and P-256 EC keys are accepted; the key must match the
    /// certificate.
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self> {
        let cert = certificate::parse_certificate_pem(certificate_pem)?;
        let spki_der = cert.tbs_certificate.subject_public_key_info.to_der()?;

        let key = match certificate::signing_algorithm(&cert)? {
            SigningAlgorithm::RsaPkcs1Sha256 => {
                let key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
                    .map_err(|e| Error::Config(format!("cannot read RSA private key: {}", e)))?;
                let public = RsaPublicKey::from_public_key_der(&spki_der)
                    .map_err(|e| Error::Certificate(format!("cannot read RSA public key: {}", e)))?;
                if key.to_public_key() != public {
                    return Err(Error::Certificate("private key does not match the certificate".to_string()));
                }
                SoftwareKey::Rsa(key)
            },
            SigningAlgorithm::EcdsaP256Sha256 => {
                let key = p256::ecdsa::SigningKey::from_pkcs8_pem(private_key_pem)
                    .map_err(|e| Error::Config(format!("cannot read EC private key: {}", e)))?;
                let public = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der)
                    .map_err(|e| Error::Certificate(format!("cannot read EC public key: {}", e)))?;
                if *key.verifying_key() != public {
                    return Err(Error::Certificate("private key does not match the certificate".to_string()));
                }
                SoftwareKey::Ecdsa(key)
            },
        };

        let fingerprint = hex::encode(Sha256::digest(cert.to_der()?));
        let (name, id) = (&fingerprint[..16], &fingerprint[16..24]);

        Ok(Self {
            certificate_pem: certificate::certificate_to_pem(&cert)?,
            certificate_id: format!("x509-{}-{}", name, id),
            key_id: format!("private-{}-{}", name, id),
            public_key_id: format!("public-{}-{}", name, id),
            key,
        })
    }

    /// Read [`from_pem`](Self::from_pem) inputs from files.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(certificate_path: P, private_key_path: Q) -> Result<Self> {
        let certificate_pem = std::fs::read_to_string(certificate_path)?;
        let private_key_pem = std::fs::read_to_string(private_key_path)?;
        Self::from_pem(&certificate_pem, &private_key_pem)
    }

    /// Identifier of the certificate, `x509-<hash>-<id>`.
    pub fn certificate_id(&self) -> &str {
        &self.certificate_id
    }

    /// Identifier of the private key, `private-<hash>-<id>`.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl RemoteKeyProvider for SoftwareToken {
    async fn list_keys(&self, kind: KeyKind) -> Result<Vec<String>> {
        Ok(match kind {
            KeyKind::Private => vec![self.key_id.clone()],
            KeyKind::Public => vec![self.public_key_id.clone()],
        })
    }

    async fn list_certificates(&self) -> Result<Vec<String>> {
        Ok(vec![self.certificate_id.clone()])
    }

    async fn export_certificate(&self, certificate_id: &str, format: CertificateFormat) -> Result<String> {
        if certificate_id != self.certificate_id {
            return Err(Error::Certificate(format!("unknown certificate {}", certificate_id)));
        }
        match format {
            CertificateFormat::Pem => Ok(self.certificate_pem.clone()),
        }
    }

    async fn sign_digest(&self, algorithm: SigningAlgorithm, key_id: &str, data: &[u8]) -> Result<Vec<u8>> {
        if key_id != self.key_id {
            return Err(Error::KeyNotFound(key_id.to_string()));
        }

        match (&self.key, algorithm) {
            (SoftwareKey::Rsa(key), SigningAlgorithm::RsaPkcs1Sha256) => key
                .sign(Pkcs1v15Sign::new_unprefixed(), data)
                .map_err(|e| Error::RemoteSigning(format!("RSA signing failed: {}", e))),
            (SoftwareKey::Ecdsa(key), SigningAlgorithm::EcdsaP256Sha256) => {
                let signature: p256::ecdsa::Signature = key
                    .sign_prehash(data)
                    .map_err(|e| Error::RemoteSigning(format!("ECDSA signing failed: {}", e)))?;
                Ok(signature.to_bytes().to_vec())
            },
            (_, algorithm) => Err(Error::RemoteSigning(format!(
                "key {} cannot produce {} signatures",
                key_id, algorithm
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{find_private_key, SHA256_DIGEST_INFO_PREFIX};
    use signature::hazmat::PrehashVerifier;

    const RSA_CERT: &str = include_str!("../../tests/fixtures/rsa_signer_cert.pem");
    const RSA_KEY: &str = include_str!("../../tests/fixtures/rsa_signer_key.pem");
    const EC_CERT: &str = include_str!("../../tests/fixtures/ec_signer_cert.pem");
    const EC_KEY: &str = include_str!("../../tests/fixtures/ec_signer_key.pem");

    #[tokio::test]
    async fn test_identifiers_pair_up() {
        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        let certificates = token.list_certificates().await.unwrap();
        assert_eq!(certificates.len(), 1);
        assert!(certificates[0].starts_with("x509-"));
        assert_eq!(certificates[0].split('-').count(), 3);

        let key = find_private_key(&token, &certificates[0]).await.unwrap();
        assert_eq!(key, token.key_id());
        assert!(token.list_keys(KeyKind::Public).await.unwrap()[0].starts_with("public-"));
    }

    #[tokio::test]
    async fn test_export_certificate_pem() {
        let token = SoftwareToken::from_pem(EC_CERT, EC_KEY).unwrap();
        let pem = token
            .export_certificate(token.certificate_id(), CertificateFormat::Pem)
            .await
            .unwrap();
        assert_eq!(
            certificate::parse_certificate_pem(&pem).unwrap(),
            certificate::parse_certificate_pem(EC_CERT).unwrap()
        );
        assert!(token.export_certificate("x509-0-0", CertificateFormat::Pem).await.is_err());
    }

    #[tokio::test]
    async fn test_rsa_signature_verifies() {
        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        let digest = Sha256::digest(b"signed attributes");
        let mut digest_info = SHA256_DIGEST_INFO_PREFIX.to_vec();
        digest_info.extend_from_slice(&digest);

        let signature = token
            .sign_digest(SigningAlgorithm::RsaPkcs1Sha256, token.key_id(), &digest_info)
            .await
            .unwrap();
        assert_eq!(signature.len(), 256);

        let public = RsaPrivateKey::from_pkcs8_pem(RSA_KEY).unwrap().to_public_key();
        public
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .unwrap();
    }

    #[tokio::test]
    async fn test_ecdsa_signature_is_raw_and_verifies() {
        let token = SoftwareToken::from_pem(EC_CERT, EC_KEY).unwrap();
        let digest = Sha256::digest(b"signed attributes");

        let raw = token
            .sign_digest(SigningAlgorithm::EcdsaP256Sha256, token.key_id(), &digest)
            .await
            .unwrap();
        assert_eq!(raw.len(), 64);

        let signature = p256::ecdsa::Signature::from_slice(&raw).unwrap();
        let key = p256::ecdsa::SigningKey::from_pkcs8_pem(EC_KEY).unwrap();
        key.verifying_key().verify_prehash(&digest, &signature).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_key_and_wrong_algorithm() {
        let token = SoftwareToken::from_pem(RSA_CERT, RSA_KEY).unwrap();
        assert!(matches!(
            token
                .sign_digest(SigningAlgorithm::RsaPkcs1Sha256, "private-x-y", &[0; 51])
                .await,
            Err(Error::KeyNotFound(_))
        ));
        assert!(matches!(
            token
                .sign_digest(SigningAlgorithm::EcdsaP256Sha256, token.key_id(), &[0; 32])
                .await,
            Err(Error::RemoteSigning(_))
        ));
    }

    #[test]
    fn test_mismatched_key_is_rejected() {
        assert!(SoftwareToken::from_pem(RSA_CERT, EC_KEY).is_err());
        assert!(matches!(
            SoftwareToken::from_pem(EC_CERT, RSA_KEY),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, EC_CERT).unwrap();
        std::fs::write(&key_path, EC_KEY).unwrap();

        let token = SoftwareToken::from_files(&cert_path, &key_path).unwrap();
        assert!(token.certificate_id().starts_with("x509-"));
        assert!(matches!(
            SoftwareToken::from_files(dir.path().join("missing.pem"), &key_path),
            Err(Error::Io(_))
        ));
    }
}
