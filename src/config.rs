//! Configuration for signing runs.

use crate::error::{Error, Result};
use crate::signatures::{PlaceholderOptions, SignatureSubFilter, DEFAULT_REASON};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default extra bytes reserved on top of the estimated signature size.
pub const DEFAULT_CAPACITY_MARGIN: usize = 2048;

/// How many bytes to reserve for the DER signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureCapacity {
    /// Exactly this many bytes.
    Fixed(usize),
    /// Estimated from the signer certificate, plus `margin` bytes.
    Auto {
        /// Extra bytes on top of the estimate
        margin: usize,
    },
}

impl Default for SignatureCapacity {
    fn default() -> Self {
        SignatureCapacity::Auto {
            margin: DEFAULT_CAPACITY_MARGIN,
        }
    }
}

/// Signing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Signature slot size
    pub signature_capacity: SignatureCapacity,

    /// Signature format written to `/SubFilter`
    pub sub_filter: SignatureSubFilter,

    /// Reason for signing
    pub reason: String,

    /// Contact information
    pub contact_info: String,

    /// Name of the signer
    pub name: String,

    /// Signing location
    pub location: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            signature_capacity: SignatureCapacity::default(),
            sub_filter: SignatureSubFilter::default(),
            reason: DEFAULT_REASON.to_string(),
            contact_info: String::new(),
            name: String::new(),
            location: String::new(),
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid signer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject settings that can never produce a signature.
    pub fn validate(&self) -> Result<()> {
        if self.signature_capacity == SignatureCapacity::Fixed(0) {
            return Err(Error::Config("fixed signature capacity must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Reserve exactly `bytes` for the signature.
    pub fn with_signature_length(mut self, bytes: usize) -> Self {
        self.signature_capacity = SignatureCapacity::Fixed(bytes);
        self
    }

    /// Estimate the reservation from the certificate with `margin` extra bytes.
    pub fn with_auto_capacity(mut self, margin: usize) -> Self {
        self.signature_capacity = SignatureCapacity::Auto { margin };
        self
    }

    /// Set the sub-filter.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact_info(mut self, contact_info: impl Into<String>) -> Self {
        self.contact_info = contact_info.into();
        self
    }

    /// Set the signer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Placeholder options for a slot of `signature_length` bytes.
    pub fn placeholder_options(&self, signature_length: usize) -> PlaceholderOptions {
        PlaceholderOptions::default()
            .with_reason(self.reason.clone())
            .with_contact_info(self.contact_info.clone())
            .with_name(self.name.clone())
            .with_location(self.location.clone())
            .with_sub_filter(self.sub_filter)
            .with_signature_length(signature_length)
    }
}
