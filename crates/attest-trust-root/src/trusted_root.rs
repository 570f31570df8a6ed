//! Trusted root types and parsing
//!
//! Mirrors the JSON mapping of `dev.sigstore.trustroot.v1.TrustedRoot`. The
//! root is an immutable snapshot: it is replaced wholesale when refetched.

use crate::{Error, Result};
use attest_types::encoding::base64_bytes;
use attest_types::{HashAlgorithm, LogId, X509Certificate};
use chrono::{DateTime, Utc};
use rustls_pki_types::CertificateDer;
use serde::{Deserialize, Serialize};

/// Media type of trusted root documents this crate understands
pub const TRUSTED_ROOT_MEDIA_TYPE: &str = "application/vnd.dev.sigstore.trustedroot+json;version=0.1";

/// A snapshot of every trust anchor used during verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedRoot {
    #[serde(default)]
    pub media_type: String,
    /// Transparency logs (Rekor)
    #[serde(default)]
    pub tlogs: Vec<TransparencyLog>,
    /// Signing certificate authorities (Fulcio)
    #[serde(default)]
    pub certificate_authorities: Vec<CertificateAuthority>,
    /// Certificate transparency logs
    #[serde(default)]
    pub ctlogs: Vec<TransparencyLog>,
    /// RFC 3161 timestamp authorities
    #[serde(default)]
    pub timestamp_authorities: Vec<CertificateAuthority>,
}

/// A transparency log instance and its verification key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyLog {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
    pub public_key: PublicKey,
    pub log_id: LogId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    /// DER-encoded SubjectPublicKeyInfo
    #[serde(with = "base64_bytes")]
    pub raw_bytes: Vec<u8>,
    #[serde(default)]
    pub key_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_for: Option<ValidityPeriod>,
}

/// A certificate authority: a chain from its issuing certificate to a root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateAuthority {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<DistinguishedName>,
    #[serde(default)]
    pub uri: String,
    pub cert_chain: CertificateChain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_for: Option<ValidityPeriod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistinguishedName {
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub common_name: String,
}

/// Certificates ordered from the issuing certificate up to the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateChain {
    pub certificates: Vec<X509Certificate>,
}

/// Validity window; an absent end means "still valid"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityPeriod {
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl ValidityPeriod {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        time >= self.start && self.end.map_or(true, |end| time <= end)
    }
}

impl TransparencyLog {
    /// First four bytes of the log id, used as the checkpoint key hint
    pub fn key_hint(&self) -> Option<[u8; 4]> {
        self.log_id.key_id.get(..4)?.try_into().ok()
    }

    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.public_key
            .valid_for
            .map_or(true, |period| period.contains(time))
    }
}

impl CertificateAuthority {
    /// Chain certificates, issuing certificate first
    pub fn certificates(&self) -> impl Iterator<Item = CertificateDer<'_>> {
        self.cert_chain
            .certificates
            .iter()
            .map(|c| CertificateDer::from(c.raw_bytes.as_slice()))
    }

    pub fn is_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.valid_for.map_or(true, |period| period.contains(time))
    }
}

impl TrustedRoot {
    /// Parse a trusted root from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_slice(json.as_bytes())
    }

    /// Parse a trusted root from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let root: TrustedRoot = serde_json::from_slice(bytes)?;
        if !root.media_type.is_empty() && root.media_type != TRUSTED_ROOT_MEDIA_TYPE {
            tracing::warn!(media_type = %root.media_type, "unrecognised trusted root media type");
        }
        Ok(root)
    }

    /// Load a trusted root from a file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Io(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_slice(&bytes)
    }

    /// Find the transparency log whose id matches `key_id`
    pub fn tlog_by_key_id(&self, key_id: &[u8]) -> Option<&TransparencyLog> {
        self.tlogs.iter().find(|tlog| tlog.log_id.key_id == key_id)
    }

    /// Transparency logs whose key hint matches a checkpoint signature
    pub fn tlogs_by_key_hint(&self, hint: [u8; 4]) -> impl Iterator<Item = &TransparencyLog> {
        self.tlogs
            .iter()
            .filter(move |tlog| tlog.key_hint() == Some(hint))
    }
}
