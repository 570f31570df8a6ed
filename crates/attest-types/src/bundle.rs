//! Sigstore bundle format types
//!
//! The bundle carries the signed content (a DSSE envelope or a message
//! signature) together with the material needed to verify it offline: the
//! signing certificate, transparency log entries and RFC 3161 timestamps.
//!
//! Field names follow the protobuf JSON mapping of `dev.sigstore.bundle.v1`.

use crate::digest::HashAlgorithm;
use crate::dsse::DsseEnvelope;
use crate::encoding::{base64_bytes, base64_bytes_vec, string_i64};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Prefix shared by the artifact types of every bundle version
pub const BUNDLE_ARTIFACT_TYPE_PREFIX: &str = "application/vnd.dev.sigstore.bundle";

/// Sigstore bundle media types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Bundle format version 0.1
    Bundle0_1,
    /// Bundle format version 0.2
    Bundle0_2,
    /// Bundle format version 0.3
    Bundle0_3,
}

impl MediaType {
    /// Get the media type string
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Bundle0_1 => "application/vnd.dev.sigstore.bundle+json;version=0.1",
            MediaType::Bundle0_2 => "application/vnd.dev.sigstore.bundle+json;version=0.2",
            MediaType::Bundle0_3 => "application/vnd.dev.sigstore.bundle.v0.3+json",
        }
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "application/vnd.dev.sigstore.bundle+json;version=0.1" => Ok(MediaType::Bundle0_1),
            "application/vnd.dev.sigstore.bundle+json;version=0.2" => Ok(MediaType::Bundle0_2),
            "application/vnd.dev.sigstore.bundle.v0.3+json"
            | "application/vnd.dev.sigstore.bundle+json;version=0.3" => Ok(MediaType::Bundle0_3),
            _ => Err(Error::InvalidMediaType(s.to_string())),
        }
    }
}

/// A Sigstore bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub media_type: String,
    pub verification_material: VerificationMaterial,
    #[serde(flatten)]
    pub content: BundleContent,
}

/// The signed content of a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleContent {
    MessageSignature(MessageSignature),
    DsseEnvelope(DsseEnvelope),
}

/// Signature over an artifact digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSignature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_digest: Option<HashOutput>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashOutput {
    pub algorithm: HashAlgorithm,
    #[serde(with = "base64_bytes")]
    pub digest: Vec<u8>,
}

/// Material used to verify the bundle content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMaterial {
    #[serde(flatten)]
    pub content: VerificationMaterialContent,
    #[serde(default)]
    pub tlog_entries: Vec<TransparencyLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_verification_data: Option<TimestampVerificationData>,
}

/// How the signer's key is carried
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationMaterialContent {
    Certificate(X509Certificate),
    X509CertificateChain { certificates: Vec<X509Certificate> },
    PublicKey { hint: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X509Certificate {
    #[serde(with = "base64_bytes")]
    pub raw_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampVerificationData {
    #[serde(default)]
    pub rfc3161_timestamps: Vec<Rfc3161SignedTimestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rfc3161SignedTimestamp {
    /// DER-encoded `TimeStampResp` (or bare `TimeStampToken`)
    #[serde(with = "base64_bytes")]
    pub signed_timestamp: Vec<u8>,
}

/// A transparency log entry as recorded in the bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyLogEntry {
    #[serde(with = "string_i64")]
    pub log_index: i64,
    pub log_id: LogId,
    pub kind_version: KindVersion,
    #[serde(default, with = "string_i64")]
    pub integrated_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_promise: Option<InclusionPromise>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion_proof: Option<InclusionProof>,
    #[serde(with = "base64_bytes")]
    pub canonicalized_body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogId {
    #[serde(with = "base64_bytes")]
    pub key_id: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindVersion {
    pub kind: String,
    pub version: String,
}

/// Signed entry timestamp (SET)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionPromise {
    #[serde(with = "base64_bytes")]
    pub signed_entry_timestamp: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    #[serde(with = "string_i64")]
    pub log_index: i64,
    #[serde(with = "base64_bytes")]
    pub root_hash: Vec<u8>,
    #[serde(with = "string_i64")]
    pub tree_size: i64,
    #[serde(with = "base64_bytes_vec")]
    pub hashes: Vec<Vec<u8>>,
    pub checkpoint: Checkpoint,
}

/// Signed note committing to the tree the inclusion proof is against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub envelope: String,
}

impl Bundle {
    /// Parse a bundle from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse a bundle from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the bundle to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Get the bundle version from the media type
    pub fn version(&self) -> Result<MediaType> {
        MediaType::from_str(&self.media_type)
    }

    /// DER bytes of the signing (leaf) certificate, if the bundle carries one
    pub fn signing_certificate(&self) -> Option<&[u8]> {
        match &self.verification_material.content {
            VerificationMaterialContent::Certificate(cert) => Some(&cert.raw_bytes),
            VerificationMaterialContent::X509CertificateChain { certificates } => {
                certificates.first().map(|c| c.raw_bytes.as_slice())
            }
            VerificationMaterialContent::PublicKey { .. } => None,
        }
    }

    pub fn tlog_entries(&self) -> &[TransparencyLogEntry] {
        &self.verification_material.tlog_entries
    }

    pub fn rfc3161_timestamps(&self) -> &[Rfc3161SignedTimestamp] {
        self.verification_material
            .timestamp_verification_data
            .as_ref()
            .map(|data| data.rfc3161_timestamps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dsse_envelope(&self) -> Option<&DsseEnvelope> {
        match &self.content {
            BundleContent::DsseEnvelope(env) => Some(env),
            BundleContent::MessageSignature(_) => None,
        }
    }

    pub fn message_signature(&self) -> Option<&MessageSignature> {
        match &self.content {
            BundleContent::MessageSignature(sig) => Some(sig),
            BundleContent::DsseEnvelope(_) => None,
        }
    }

    /// Raw signature bytes, the input RFC 3161 timestamps are computed over
    pub fn signature_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            BundleContent::MessageSignature(sig) => Some(&sig.signature),
            BundleContent::DsseEnvelope(env) => env.first_signature().map(|s| s.sig.as_slice()),
        }
    }
}
