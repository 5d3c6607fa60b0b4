//! Remote key providers.
//!
//! A [`RemoteKeyProvider`] is the signing bridge to a token that holds the
//! private key: it lists key and certificate identifiers, exports
//! certificates, and signs prepared digests. [`RemoteKeySigner`] adapts one
//! key of a provider to the [`DigestSigner`] seam of the CMS builder.
//!
//! Identifiers follow the bridge's `name-type-id` convention, e.g.
//! `x509-<hash>-<id>` for a certificate and `private-<hash>-<id>` for the
//! matching private key.

mod software;

pub use software::SoftwareToken;

use crate::error::{Error, Result};
use crate::signatures::{DigestSigner, SigningAlgorithm};
use async_trait::async_trait;

/// DER prefix of a `DigestInfo` for SHA-256 (RFC 8017 section 9.2).
pub const SHA256_DIGEST_INFO_PREFIX: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00, 0x04,
    0x20,
];

/// Kind of key listed by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Private keys, usable for signing
    Private,
    /// Public keys
    Public,
}

impl KeyKind {
    /// Bridge name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Private => "private",
            KeyKind::Public => "public",
        }
    }
}

/// Export format for certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum CertificateFormat {
    /// PEM text with a `CERTIFICATE` label
    #[default]
    Pem,
}

/// Access to a key-holding device through its signing bridge.
#[async_trait]
pub trait RemoteKeyProvider: Send + Sync {
    /// Identifiers of the keys of `kind`.
    async fn list_keys(&self, kind: KeyKind) -> Result<Vec<String>>;

    /// Identifiers of the certificates on the device.
    async fn list_certificates(&self) -> Result<Vec<String>>;

    /// Export a certificate.
    async fn export_certificate(&self, certificate_id: &str, format: CertificateFormat) -> Result<String>;

    /// Sign `data` with the key `key_id`.
    ///
    /// For RSA, `data` is a DER `DigestInfo` and the result is the PKCS#1 v1.5
    /// signature. For ECDSA, `data` is the raw digest and the result is either
    /// raw `r || s` or a DER `Ecdsa-Sig-Value`.
    async fn sign_digest(&self, algorithm: SigningAlgorithm, key_id: &str, data: &[u8]) -> Result<Vec<u8>>;
}

/// Third segment of a `name-type-id` identifier.
fn identifier_id(identifier: &str) -> Option<&str> {
    identifier.split('-').nth(2)
}

/// Find the private key paired with `certificate_id`.
pub async fn find_private_key(provider: &dyn RemoteKeyProvider, certificate_id: &str) -> Result<String> {
    let wanted = identifier_id(certificate_id)
        .ok_or_else(|| Error::KeyNotFound(format!("malformed certificate id {:?}", certificate_id)))?;

    let keys = provider.list_keys(KeyKind::Private).await?;
    log::debug!("Provider lists {} private keys", keys.len());

    keys.into_iter()
        .find(|key| key.split('-').next() == Some(KeyKind::Private.as_str()) && identifier_id(key) == Some(wanted))
        .ok_or_else(|| Error::KeyNotFound(certificate_id.to_string()))
}

/// [`DigestSigner`] backed by one key of a [`RemoteKeyProvider`].
pub struct RemoteKeySigner<'a> {
    provider: &'a dyn RemoteKeyProvider,
    key_id: String,
}

impl<'a> RemoteKeySigner<'a> {
    /// Sign with `key_id` on `provider`.
    pub fn new(provider: &'a dyn RemoteKeyProvider, key_id: impl Into<String>) -> Self {
        Self {
            provider,
            key_id: key_id.into(),
        }
    }

    /// The key used for signing.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

#[async_trait]
impl DigestSigner for RemoteKeySigner<'_> {
    async fn sign(&self, digest: &[u8], algorithm: SigningAlgorithm) -> Result<Vec<u8>> {
        log::debug!("Requesting {} signature from key {}", algorithm, self.key_id);

        match algorithm {
            SigningAlgorithm::RsaPkcs1Sha256 => {
                let mut digest_info = SHA256_DIGEST_INFO_PREFIX.to_vec();
                digest_info.extend_from_slice(digest);
                self.provider.sign_digest(algorithm, &self.key_id, &digest_info).await
            },
            SigningAlgorithm::EcdsaP256Sha256 => {
                let raw = self.provider.sign_digest(algorithm, &self.key_id, digest).await?;
                ecdsa_signature_to_der(&raw)
            },
        }
    }
}

/// Normalize an ECDSA P-256 signature to DER.
///
/// Accepts 64-byte `r || s` as returned by WebCrypto-style bridges, or DER.
pub fn ecdsa_signature_to_der(raw: &[u8]) -> Result<Vec<u8>> {
    let signature = if raw.len() == 64 {
        p256::ecdsa::Signature::from_slice(raw)
    } else {
        p256::ecdsa::Signature::from_der(raw)
    }
    .map_err(|e| Error::RemoteSigning(format!("provider returned an unusable ECDSA signature: {}", e)))?;

    Ok(signature.to_der().as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Provider with fixed listings that records sign requests.
    struct ScriptedProvider {
        keys: Vec<String>,
        response: Vec<u8>,
        requests: Mutex<Vec<(SigningAlgorithm, String, Vec<u8>)>>,
    }

    impl ScriptedProvider {
        fn new(keys: &[&str], response: Vec<u8>) -> Self {
            Self {
                keys: keys.iter().map(|k| k.to_string()).collect(),
                response,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteKeyProvider for ScriptedProvider {
        async fn list_keys(&self, _kind: KeyKind) -> Result<Vec<String>> {
            Ok(self.keys.clone())
        }

        async fn list_certificates(&self) -> Result<Vec<String>> {
            Ok(vec!["x509-abc-7".to_string()])
        }

        async fn export_certificate(&self, _id: &str, _format: CertificateFormat) -> Result<String> {
            Err(Error::Certificate("not exported".to_string()))
        }

        async fn sign_digest(&self, algorithm: SigningAlgorithm, key_id: &str, data: &[u8]) -> Result<Vec<u8>> {
            self.requests
                .lock()
                .unwrap()
                .push((algorithm, key_id.to_string(), data.to_vec()));
            Ok(self.response.clone())
        }
    }

    #[tokio::test]
    async fn test_find_private_key_by_third_segment() {
        let provider = ScriptedProvider::new(&["public-abc-7", "private-abc-3", "private-abc-7"], vec![]);
        assert_eq!(find_private_key(&provider, "x509-abc-7").await.unwrap(), "private-abc-7");
    }

    #[tokio::test]
    async fn test_find_private_key_missing() {
        let provider = ScriptedProvider::new(&["public-abc-7", "private-abc-3"], vec![]);
        assert!(matches!(
            find_private_key(&provider, "x509-abc-7").await,
            Err(Error::KeyNotFound(_))
        ));
        assert!(matches!(find_private_key(&provider, "x509").await, Err(Error::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_rsa_digest_is_wrapped_in_digest_info() {
        let provider = ScriptedProvider::new(&[], vec![1, 2, 3]);
        let signer = RemoteKeySigner::new(&provider, "private-abc-7");
        let digest = [0x11u8; 32];

        let signature = signer.sign(&digest, SigningAlgorithm::RsaPkcs1Sha256).await.unwrap();
        assert_eq!(signature, vec![1, 2, 3]);

        let requests = provider.requests.lock().unwrap();
        let (algorithm, key_id, data) = &requests[0];
        assert_eq!(*algorithm, SigningAlgorithm::RsaPkcs1Sha256);
        assert_eq!(key_id, "private-abc-7");
        assert_eq!(data.len(), 51);
        assert_eq!(&data[..19], &SHA256_DIGEST_INFO_PREFIX);
        assert_eq!(&data[19..], &digest);
    }

    #[tokio::test]
    async fn test_ecdsa_raw_signature_becomes_der() {
        let mut raw = vec![0x01u8; 32];
        raw.extend(vec![0x80u8; 32]);
        let provider = ScriptedProvider::new(&[], raw);
        let signer = RemoteKeySigner::new(&provider, "private-abc-7");

        let der = signer.sign(&[0x22; 32], SigningAlgorithm::EcdsaP256Sha256).await.unwrap();
        assert_eq!(der[0], 0x30);
        // s has its high bit set and gains a leading zero.
        assert_eq!(der.len(), 2 + (2 + 32) + (2 + 33));
        assert_eq!(provider.requests.lock().unwrap()[0].2, vec![0x22; 32]);
    }

    #[test]
    fn test_ecdsa_der_passes_through() {
        let mut raw = vec![0x01u8; 32];
        raw.extend(vec![0x02u8; 32]);
        let der = ecdsa_signature_to_der(&raw).unwrap();
        assert_eq!(ecdsa_signature_to_der(&der).unwrap(), der);
    }

    #[test]
    fn test_ecdsa_garbage_is_remote_failure() {
        let err = ecdsa_signature_to_der(&[0u8; 10]).unwrap_err();
        assert!(err.is_retriable());
    }
}
