//! Dead Simple Signing Envelope (DSSE) types
//!
//! Specification: https://github.com/secure-systems-lab/dsse

use crate::encoding::base64_bytes;
use serde::{Deserialize, Serialize};

/// Envelope around an attestation payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsseEnvelope {
    /// Media type of the payload
    pub payload_type: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Signatures over the PAE of `payload_type` and `payload`
    pub signatures: Vec<DsseSignature>,
}

/// A signature in a DSSE envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseSignature {
    #[serde(with = "base64_bytes")]
    pub sig: Vec<u8>,
    #[serde(default)]
    pub keyid: String,
}

impl DsseEnvelope {
    /// The bytes that DSSE signatures are computed over
    pub fn pae(&self) -> Vec<u8> {
        pae(&self.payload_type, &self.payload)
    }

    /// First signature, the only one Sigstore bundles carry
    pub fn first_signature(&self) -> Option<&DsseSignature> {
        self.signatures.first()
    }
}

/// Pre-authentication encoding: `DSSEv1 <len(type)> <type> <len(body)> <body>`
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut encoded =
        format!("DSSEv1 {} {} {} ", payload_type.len(), payload_type, payload.len()).into_bytes();
    encoded.extend_from_slice(payload);
    encoded
}
