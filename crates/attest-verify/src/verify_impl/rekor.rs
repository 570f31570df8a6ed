//! Rekor entry body validation
//!
//! A log entry only vouches for a bundle if its canonicalized body describes
//! the same signature, signer and content. The body shape depends on the
//! entry kind and version.

use super::crypto::sha256;
use crate::error::{Error, Result};
use attest_types::{Bundle, DsseEnvelope, HashAlgorithm, MessageSignature, TransparencyLogEntry};
use base64::Engine;
use serde::Deserialize;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

/// Hex digest as recorded in Rekor bodies
#[derive(Debug, Clone, Deserialize)]
pub struct HashValue {
    pub algorithm: String,
    pub value: String,
}

/// `dsse` v0.0.1
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsseV001Spec {
    pub payload_hash: HashValue,
    #[serde(default)]
    pub envelope_hash: Option<HashValue>,
    pub signatures: Vec<DsseV001Signature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DsseV001Signature {
    /// Base64 signature
    pub signature: String,
    /// Base64 of the PEM signing certificate
    pub verifier: String,
}

/// `intoto` v0.0.2
#[derive(Debug, Clone, Deserialize)]
pub struct IntotoV002Spec {
    pub content: IntotoV002Content,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntotoV002Content {
    pub envelope: IntotoV002Envelope,
}

/// Envelope whose payload and signatures are base64 of base64
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV002Envelope {
    pub payload: String,
    pub payload_type: String,
    pub signatures: Vec<IntotoV002Signature>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV002Signature {
    pub sig: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

/// `hashedrekord` v0.0.1
#[derive(Debug, Clone, Deserialize)]
pub struct HashedRekordV001Spec {
    pub data: HashedRekordData,
    pub signature: HashedRekordSignature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashedRekordData {
    pub hash: HashValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedRekordSignature {
    pub content: String,
    pub public_key: HashedRekordPublicKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashedRekordPublicKey {
    pub content: String,
}

/// Base64 digest as recorded in Rekor v2 bodies
#[derive(Debug, Clone, Deserialize)]
pub struct DigestValue {
    pub algorithm: String,
    pub digest: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBytes {
    pub raw_bytes: String,
}

/// Either a DER certificate or a public key
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V002Verifier {
    #[serde(default)]
    pub x509_certificate: Option<RawBytes>,
    #[serde(default)]
    pub public_key: Option<RawBytes>,
}

impl V002Verifier {
    fn matches_certificate(&self, cert_der: &[u8]) -> Result<bool> {
        match &self.x509_certificate {
            Some(cert) => Ok(decode_b64(&cert.raw_bytes, "certificate")? == cert_der),
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct V002Signature {
    /// Base64 signature
    pub content: String,
    pub verifier: V002Verifier,
}

/// `dsse` v0.0.2
#[derive(Debug, Clone, Deserialize)]
pub struct DsseV002Spec {
    #[serde(rename = "dsseV002")]
    pub dsse: DsseV002,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsseV002 {
    pub payload_hash: DigestValue,
    pub signatures: Vec<V002Signature>,
}

/// `hashedrekord` v0.0.2
#[derive(Debug, Clone, Deserialize)]
pub struct HashedRekordV002Spec {
    #[serde(rename = "hashedRekordV002")]
    pub hashed_rekord: HashedRekordV002,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashedRekordV002 {
    pub data: DigestValue,
    pub signature: V002Signature,
}

#[derive(Deserialize)]
struct Envelope<T> {
    spec: T,
}

/// Entry bodies understood by the verifier
#[derive(Debug, Clone)]
pub enum RekorEntryBody {
    DsseV001(DsseV001Spec),
    DsseV002(DsseV002Spec),
    IntotoV002(IntotoV002Spec),
    HashedRekordV001(HashedRekordV001Spec),
    HashedRekordV002(HashedRekordV002Spec),
}

impl RekorEntryBody {
    pub fn parse(body: &[u8], kind: &str, version: &str) -> Result<Self> {
        fn spec<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T> {
            serde_json::from_slice::<Envelope<T>>(body)
                .map(|e| e.spec)
                .map_err(|e| Error::Verification(format!("failed to parse Rekor body: {}", e)))
        }

        match (kind, version) {
            ("dsse", "0.0.1") => Ok(RekorEntryBody::DsseV001(spec(body)?)),
            ("dsse", "0.0.2") => Ok(RekorEntryBody::DsseV002(spec(body)?)),
            ("intoto", "0.0.2") => Ok(RekorEntryBody::IntotoV002(spec(body)?)),
            ("hashedrekord", "0.0.1") => Ok(RekorEntryBody::HashedRekordV001(spec(body)?)),
            ("hashedrekord", "0.0.2") => Ok(RekorEntryBody::HashedRekordV002(spec(body)?)),
            _ => Err(Error::Unsupported(format!(
                "Rekor entry kind {} version {}",
                kind, version
            ))),
        }
    }
}

/// Check that a log entry describes this bundle and signing certificate
pub fn verify_entry_body(
    entry: &TransparencyLogEntry,
    bundle: &Bundle,
    cert_der: &[u8],
) -> Result<()> {
    let body = RekorEntryBody::parse(
        &entry.canonicalized_body,
        &entry.kind_version.kind,
        &entry.kind_version.version,
    )?;

    let dsse_envelope = || {
        bundle.dsse_envelope().ok_or_else(|| {
            Error::Verification("dsse log entry for a bundle without an envelope".to_string())
        })
    };
    let message_signature = || {
        bundle.message_signature().ok_or_else(|| {
            Error::Verification(
                "hashedrekord log entry for a bundle without a message signature".to_string(),
            )
        })
    };

    match body {
        RekorEntryBody::DsseV001(spec) => verify_dsse_v001(&spec, dsse_envelope()?, cert_der),
        RekorEntryBody::DsseV002(spec) => verify_dsse_v002(&spec.dsse, dsse_envelope()?, cert_der),
        RekorEntryBody::IntotoV002(spec) => {
            let envelope = bundle.dsse_envelope().ok_or_else(|| {
                Error::Verification("intoto log entry for a bundle without an envelope".to_string())
            })?;
            verify_intoto_v002(&spec, envelope)
        }
        RekorEntryBody::HashedRekordV001(spec) => {
            verify_hashedrekord_v001(&spec, message_signature()?, cert_der)
        }
        RekorEntryBody::HashedRekordV002(spec) => {
            verify_hashedrekord_v002(&spec.hashed_rekord, message_signature()?, cert_der)
        }
    }
}

/// The envelope hash is not compared: it covers the JSON submitted to the
/// log, which cannot be reproduced byte for byte.
fn verify_dsse_v001(spec: &DsseV001Spec, envelope: &DsseEnvelope, cert_der: &[u8]) -> Result<()> {
    let payload_hash = hex::encode(sha256(&envelope.payload));
    if !payload_hash.eq_ignore_ascii_case(&spec.payload_hash.value) {
        return Err(Error::Verification(format!(
            "DSSE payload hash mismatch: computed {}, log entry has {}",
            payload_hash, spec.payload_hash.value
        )));
    }

    if envelope.signatures.len() != spec.signatures.len() {
        return Err(Error::Verification(format!(
            "DSSE signature count mismatch: bundle has {}, log entry has {}",
            envelope.signatures.len(),
            spec.signatures.len()
        )));
    }

    for bundle_sig in &envelope.signatures {
        let mut found = false;
        for entry_sig in &spec.signatures {
            let signature = decode_b64(&entry_sig.signature, "signature")?;
            let verifier = pem_certificate_der(&decode_b64(&entry_sig.verifier, "verifier")?)?;
            if bundle_sig.sig == signature && verifier == cert_der {
                found = true;
                break;
            }
        }
        if !found {
            return Err(Error::Verification(
                "DSSE signature in bundle does not match the log entry (signature or verifier mismatch)"
                    .to_string(),
            ));
        }
    }
    Ok(())
}

fn verify_dsse_v002(spec: &DsseV002, envelope: &DsseEnvelope, cert_der: &[u8]) -> Result<()> {
    let expected = decode_b64(&spec.payload_hash.digest, "payload hash")?;
    let payload_hash = sha256(&envelope.payload);
    if spec.payload_hash.algorithm.parse::<HashAlgorithm>()? != HashAlgorithm::Sha256
        || payload_hash.as_slice() != expected.as_slice()
    {
        return Err(Error::Verification(format!(
            "DSSE payload hash mismatch: computed {}, log entry has {}",
            hex::encode(payload_hash),
            hex::encode(&expected)
        )));
    }

    if envelope.signatures.len() != spec.signatures.len() {
        return Err(Error::Verification(format!(
            "DSSE signature count mismatch: bundle has {}, log entry has {}",
            envelope.signatures.len(),
            spec.signatures.len()
        )));
    }

    for bundle_sig in &envelope.signatures {
        let mut found = false;
        for entry_sig in &spec.signatures {
            if decode_b64(&entry_sig.content, "signature")? == bundle_sig.sig
                && entry_sig.verifier.matches_certificate(cert_der)?
            {
                found = true;
                break;
            }
        }
        if !found {
            return Err(Error::Verification(
                "DSSE signature in bundle does not match the log entry (signature or verifier mismatch)"
                    .to_string(),
            ));
        }
    }
    Ok(())
}

fn verify_intoto_v002(spec: &IntotoV002Spec, envelope: &DsseEnvelope) -> Result<()> {
    let entry_envelope = &spec.content.envelope;
    let payload = decode_b64_twice(&entry_envelope.payload, "payload")?;
    if payload != envelope.payload {
        return Err(Error::Verification(
            "DSSE payload in bundle does not match intoto log entry".to_string(),
        ));
    }

    for bundle_sig in &envelope.signatures {
        for entry_sig in &entry_envelope.signatures {
            if decode_b64_twice(&entry_sig.sig, "signature")? == bundle_sig.sig {
                return Ok(());
            }
        }
    }
    Err(Error::Verification(
        "DSSE signature in bundle does not match intoto log entry".to_string(),
    ))
}

fn verify_hashedrekord_v001(
    spec: &HashedRekordV001Spec,
    signature: &MessageSignature,
    cert_der: &[u8],
) -> Result<()> {
    let digest = signature.message_digest.as_ref().ok_or_else(|| {
        Error::Verification("message signature carries no digest".to_string())
    })?;
    let algorithm: HashAlgorithm = spec.data.hash.algorithm.parse()?;
    if algorithm != digest.algorithm
        || !hex::encode(&digest.digest).eq_ignore_ascii_case(&spec.data.hash.value)
    {
        return Err(Error::Verification(format!(
            "artifact hash mismatch for hashedrekord entry: bundle has {}:{}, log entry has {}:{}",
            digest.algorithm,
            hex::encode(&digest.digest),
            spec.data.hash.algorithm,
            spec.data.hash.value
        )));
    }

    if decode_b64(&spec.signature.content, "signature")? != signature.signature {
        return Err(Error::Verification(
            "signature in bundle does not match hashedrekord log entry".to_string(),
        ));
    }

    let public_key = decode_b64(&spec.signature.public_key.content, "public key")?;
    if pem_certificate_der(&public_key)? != cert_der {
        return Err(Error::Verification(
            "certificate in bundle does not match hashedrekord log entry".to_string(),
        ));
    }
    Ok(())
}

fn verify_hashedrekord_v002(
    spec: &HashedRekordV002,
    signature: &MessageSignature,
    cert_der: &[u8],
) -> Result<()> {
    let digest = signature.message_digest.as_ref().ok_or_else(|| {
        Error::Verification("message signature carries no digest".to_string())
    })?;
    let algorithm: HashAlgorithm = spec.data.algorithm.parse()?;
    let expected = decode_b64(&spec.data.digest, "digest")?;
    if algorithm != digest.algorithm || expected != digest.digest {
        return Err(Error::Verification(format!(
            "artifact hash mismatch for hashedrekord entry: bundle has {}:{}, log entry has {}:{}",
            digest.algorithm,
            hex::encode(&digest.digest),
            spec.data.algorithm,
            hex::encode(&expected)
        )));
    }

    if decode_b64(&spec.signature.content, "signature")? != signature.signature {
        return Err(Error::Verification(
            "signature in bundle does not match hashedrekord log entry".to_string(),
        ));
    }
    if !spec.signature.verifier.matches_certificate(cert_der)? {
        return Err(Error::Verification(
            "certificate in bundle does not match hashedrekord log entry".to_string(),
        ));
    }
    Ok(())
}

fn decode_b64(value: &str, what: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| Error::Verification(format!("failed to decode log entry {}: {}", what, e)))
}

fn decode_b64_twice(value: &str, what: &str) -> Result<Vec<u8>> {
    let inner = decode_b64(value, what)?;
    let inner = std::str::from_utf8(&inner)
        .map_err(|_| Error::Verification(format!("log entry {} is not base64 text", what)))?;
    decode_b64(inner, what)
}

fn pem_certificate_der(pem: &[u8]) -> Result<Vec<u8>> {
    let cert = Certificate::from_pem(pem).map_err(|e| {
        Error::Verification(format!("failed to parse log entry certificate: {}", e))
    })?;
    Ok(cert.to_der()?)
}
