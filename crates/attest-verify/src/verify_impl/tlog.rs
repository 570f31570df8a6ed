//! Transparency log verification
//!
//! Each log entry must be backed by a signed entry timestamp (SET), an
//! inclusion proof against a signed checkpoint, or both. Only an integrated
//! time covered by a verified SET counts as an observed timestamp.

use super::crypto::VerificationKey;
use super::merkle;
use crate::error::{Error, Result};
use attest_trust_root::{TransparencyLog, TrustedRoot};
use attest_types::{InclusionProof, TransparencyLogEntry};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

const SIGNATURE_LINE_PREFIX: &str = "\u{2014} ";

/// What a verified log entry contributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlogVerification {
    /// `None` for entries that record no integrated time
    pub integrated_time: Option<DateTime<Utc>>,
    /// The integrated time is signed by the log
    pub promise_verified: bool,
    pub inclusion_verified: bool,
}

/// Verify a log entry and check its integrated time, when it has one
pub fn verify_tlog_entry(
    entry: &TransparencyLogEntry,
    trusted_root: &TrustedRoot,
    cert_validity: (DateTime<Utc>, DateTime<Utc>),
    now: DateTime<Utc>,
    clock_skew_seconds: i64,
) -> Result<TlogVerification> {
    if entry.inclusion_promise.is_none() && entry.inclusion_proof.is_none() {
        return Err(Error::Verification(format!(
            "log entry {} has neither an inclusion promise nor an inclusion proof",
            entry.log_index
        )));
    }

    // Rekor v2 entries carry no integrated time
    let integrated_time = match entry.integrated_time {
        0 => None,
        seconds => Some(DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
            Error::Verification(format!("invalid integrated time {}", seconds))
        })?),
    };
    if let Some(integrated_time) = integrated_time {
        check_integrated_time(integrated_time, cert_validity, now, clock_skew_seconds)?;
    }

    let log = trusted_root.tlog_by_key_id(&entry.log_id.key_id).ok_or_else(|| {
        Error::Verification(format!(
            "unknown transparency log {}",
            hex::encode(&entry.log_id.key_id)
        ))
    })?;
    if let Some(integrated_time) = integrated_time {
        if !log.is_valid_at(integrated_time) {
            return Err(Error::Verification(format!(
                "transparency log {} key was not valid at {}",
                log.base_url, integrated_time
            )));
        }
    }

    let promise_verified = if entry.inclusion_promise.is_some() {
        verify_set(entry, log)?;
        true
    } else {
        false
    };
    let inclusion_verified = match &entry.inclusion_proof {
        Some(proof) => {
            verify_inclusion_proof(&entry.canonicalized_body, proof, trusted_root)?;
            true
        }
        None => false,
    };

    tracing::debug!(
        log_index = entry.log_index,
        integrated_time = ?integrated_time,
        promise_verified,
        inclusion_verified,
        "verified transparency log entry"
    );
    Ok(TlogVerification {
        integrated_time,
        promise_verified,
        inclusion_verified,
    })
}

/// The integrated time must not be ahead of `now` by more than
/// `clock_skew_seconds` and must fall inside the signing certificate's
/// validity window.
fn check_integrated_time(
    integrated_time: DateTime<Utc>,
    (not_before, not_after): (DateTime<Utc>, DateTime<Utc>),
    now: DateTime<Utc>,
    clock_skew_seconds: i64,
) -> Result<()> {
    if integrated_time > now + chrono::Duration::seconds(clock_skew_seconds) {
        return Err(Error::Verification(format!(
            "integrated time {} is in the future (current time: {}, tolerance: {}s)",
            integrated_time, now, clock_skew_seconds
        )));
    }
    if integrated_time < not_before || integrated_time > not_after {
        return Err(Error::Verification(format!(
            "integrated time {} is outside certificate validity ({} to {})",
            integrated_time, not_before, not_after
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct RekorPayload {
    body: String,
    #[serde(rename = "integratedTime")]
    integrated_time: i64,
    #[serde(rename = "logIndex")]
    log_index: i64,
    #[serde(rename = "logID")]
    log_id: String,
}

/// Verify the signed entry timestamp over the canonical entry payload
pub fn verify_set(entry: &TransparencyLogEntry, log: &TransparencyLog) -> Result<()> {
    let promise = entry
        .inclusion_promise
        .as_ref()
        .ok_or_else(|| Error::Verification("missing inclusion promise".to_string()))?;

    let payload = RekorPayload {
        body: base64::engine::general_purpose::STANDARD.encode(&entry.canonicalized_body),
        integrated_time: entry.integrated_time,
        log_index: entry.log_index,
        log_id: hex::encode(&entry.log_id.key_id),
    };
    let canonical_json = serde_json_canonicalizer::to_vec(&payload)
        .map_err(|e| Error::Verification(format!("canonicalization failed: {}", e)))?;

    VerificationKey::from_spki_der(&log.public_key.raw_bytes)?
        .verify_default(&canonical_json, &promise.signed_entry_timestamp)
        .map_err(|e| Error::Verification(format!("SET verification failed: {}", e)))
}

/// One signature line of a signed note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSignature {
    pub name: String,
    pub key_hint: [u8; 4],
    pub signature: Vec<u8>,
}

/// A parsed checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCheckpoint {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: Vec<u8>,
    /// Note text covered by the signatures, trailing newline included
    pub signed_text: String,
    pub signatures: Vec<NoteSignature>,
}

impl SignedCheckpoint {
    pub fn parse(envelope: &str) -> Result<Self> {
        let invalid = |msg: &str| Error::Verification(format!("invalid checkpoint: {}", msg));

        let (body, sigs) = envelope
            .split_once("\n\n")
            .ok_or_else(|| invalid("missing signature block"))?;
        let signed_text = format!("{}\n", body);

        let mut lines = body.lines();
        let origin = lines.next().ok_or_else(|| invalid("missing origin"))?;
        let tree_size = lines
            .next()
            .and_then(|l| l.parse::<u64>().ok())
            .ok_or_else(|| invalid("missing or malformed tree size"))?;
        let root_hash = lines
            .next()
            .and_then(|l| base64::engine::general_purpose::STANDARD.decode(l).ok())
            .ok_or_else(|| invalid("missing or malformed root hash"))?;

        let mut signatures = Vec::new();
        for line in sigs.lines().filter(|l| !l.is_empty()) {
            let rest = line
                .strip_prefix(SIGNATURE_LINE_PREFIX)
                .ok_or_else(|| invalid("malformed signature line"))?;
            let (name, encoded) = rest
                .rsplit_once(' ')
                .ok_or_else(|| invalid("malformed signature line"))?;
            let raw = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|_| invalid("signature is not base64"))?;
            if raw.len() <= 4 {
                return Err(invalid("signature too short"));
            }
            let mut key_hint = [0u8; 4];
            key_hint.copy_from_slice(&raw[..4]);
            signatures.push(NoteSignature {
                name: name.to_string(),
                key_hint,
                signature: raw[4..].to_vec(),
            });
        }
        if signatures.is_empty() {
            return Err(invalid("no signatures"));
        }

        Ok(Self {
            origin: origin.to_string(),
            tree_size,
            root_hash,
            signed_text,
            signatures,
        })
    }
}

/// Verify a checkpoint signature with a log key from the trusted root
pub fn verify_checkpoint(checkpoint: &SignedCheckpoint, trusted_root: &TrustedRoot) -> Result<()> {
    for sig in &checkpoint.signatures {
        for log in trusted_root.tlogs_by_key_hint(sig.key_hint) {
            let key = VerificationKey::from_spki_der(&log.public_key.raw_bytes)?;
            if key
                .verify_default(checkpoint.signed_text.as_bytes(), &sig.signature)
                .is_ok()
            {
                return Ok(());
            }
        }
    }
    Err(Error::Verification(format!(
        "no trusted log key verifies the checkpoint for {}",
        checkpoint.origin
    )))
}

/// Verify an inclusion proof and the checkpoint it is anchored to
pub fn verify_inclusion_proof(
    body: &[u8],
    proof: &InclusionProof,
    trusted_root: &TrustedRoot,
) -> Result<()> {
    let checkpoint = SignedCheckpoint::parse(&proof.checkpoint.envelope)?;
    verify_checkpoint(&checkpoint, trusted_root)?;

    let index = u64::try_from(proof.log_index)
        .map_err(|_| Error::Verification(format!("invalid proof index {}", proof.log_index)))?;
    let tree_size = u64::try_from(proof.tree_size)
        .map_err(|_| Error::Verification(format!("invalid tree size {}", proof.tree_size)))?;
    if checkpoint.tree_size != tree_size {
        return Err(Error::Verification(format!(
            "checkpoint tree size {} does not match proof tree size {}",
            checkpoint.tree_size, tree_size
        )));
    }
    if checkpoint.root_hash != proof.root_hash {
        return Err(Error::Verification(format!(
            "checkpoint root hash {} does not match proof root hash {}",
            hex::encode(&checkpoint.root_hash),
            hex::encode(&proof.root_hash)
        )));
    }

    merkle::verify_inclusion(index, tree_size, body, &proof.hashes, &proof.root_hash)
}
