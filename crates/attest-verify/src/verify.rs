//! Bundle verification against a trusted root and a policy

use crate::error::{Error, Result};
use crate::policy::VerificationPolicy;
use crate::verify_impl::helpers::{
    extract_identity, validate_certificate_time, verify_certificate_chain, verify_x509_profile,
    ParsedCertificate, SignerIdentity,
};
use crate::verify_impl::{rekor, tlog, tsa};
use attest_trust_root::TrustedRoot;
use attest_types::{
    AttestationBundle, Bundle, BundleContent, Descriptor, Statement, INTOTO_PAYLOAD_TYPE,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Tolerance for integrated times ahead of the local clock
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 60;

/// Thresholds a bundle's timestamp evidence must meet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierOptions {
    /// Minimum number of verified RFC 3161 timestamps
    pub signed_timestamps: usize,
    /// Minimum number of verified transparency log entries
    pub transparency_log_entries: usize,
    /// Minimum number of verified times from either source
    pub observer_timestamps: usize,
    /// Fall back to the current time when no timestamp verifies
    pub use_current_time: bool,
    pub clock_skew_seconds: i64,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            signed_timestamps: 1,
            transparency_log_entries: 0,
            observer_timestamps: 0,
            use_current_time: false,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
        }
    }
}

impl VerifierOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signed_timestamps(mut self, count: usize) -> Self {
        self.signed_timestamps = count;
        self
    }

    pub fn with_transparency_log_entries(mut self, count: usize) -> Self {
        self.transparency_log_entries = count;
        self
    }

    pub fn with_observer_timestamps(mut self, count: usize) -> Self {
        self.observer_timestamps = count;
        self
    }

    pub fn with_current_time(mut self, enabled: bool) -> Self {
        self.use_current_time = enabled;
        self
    }

    pub fn with_clock_skew(mut self, seconds: i64) -> Self {
        self.clock_skew_seconds = seconds;
        self
    }
}

/// Where a verified time came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampSource {
    SignedTimestamp,
    TransparencyLog,
    CurrentTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifiedTimestamp {
    pub source: TimestampSource,
    pub time: DateTime<Utc>,
}

/// What a successfully verified bundle attests
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedStatement {
    /// Statement parsed from the verified payload, `None` for message
    /// signatures
    pub statement: Option<Statement>,
    pub signer: SignerIdentity,
    pub timestamps: Vec<VerifiedTimestamp>,
}

/// Outcome of one bundle in a batch
#[derive(Debug)]
pub struct VerificationResult {
    pub bundle: AttestationBundle,
    /// The image manifest the bundle was checked against
    pub descriptor: Descriptor,
    pub outcome: Result<VerifiedStatement>,
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Verifies bundles against one trusted root snapshot
#[derive(Debug, Clone)]
pub struct Verifier<'a> {
    trusted_root: &'a TrustedRoot,
    options: VerifierOptions,
}

impl<'a> Verifier<'a> {
    pub fn new(trusted_root: &'a TrustedRoot, options: VerifierOptions) -> Self {
        Self {
            trusted_root,
            options,
        }
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Verify every bundle independently
    ///
    /// A failing bundle never prevents the others from being checked.
    pub fn verify_bundles(
        &self,
        bundles: Vec<AttestationBundle>,
        descriptor: &Descriptor,
        policy: &VerificationPolicy,
    ) -> Vec<VerificationResult> {
        bundles
            .into_iter()
            .enumerate()
            .map(|(index, bundle)| {
                let outcome = self.verify(&bundle.bundle, policy);
                match &outcome {
                    Ok(_) => tracing::info!(index, "bundle verified"),
                    Err(e) => tracing::warn!(index, error = %e, "bundle failed verification"),
                }
                VerificationResult {
                    bundle,
                    descriptor: descriptor.clone(),
                    outcome,
                }
            })
            .collect()
    }

    /// Verify one bundle
    pub fn verify(&self, bundle: &Bundle, policy: &VerificationPolicy) -> Result<VerifiedStatement> {
        self.verify_at(bundle, policy, Utc::now())
    }

    fn verify_at(
        &self,
        bundle: &Bundle,
        policy: &VerificationPolicy,
        now: DateTime<Utc>,
    ) -> Result<VerifiedStatement> {
        let media_type = bundle
            .version()
            .map_err(|e| Error::Verification(format!("unsupported bundle: {}", e)))?;
        tracing::debug!(media_type = media_type.as_str(), "verifying bundle");

        let cert_der = bundle.signing_certificate().ok_or_else(|| {
            Error::Unsupported("bundles verified by a bare public key".to_string())
        })?;
        let leaf = ParsedCertificate::parse(cert_der)?;
        let key = leaf.public_key()?;

        // signature over the content
        match &bundle.content {
            BundleContent::DsseEnvelope(envelope) => {
                if envelope.signatures.len() != 1 {
                    return Err(Error::Verification(format!(
                        "DSSE envelope must carry exactly one signature, found {}",
                        envelope.signatures.len()
                    )));
                }
                key.verify_default(&envelope.pae(), &envelope.signatures[0].sig)
                    .map_err(|e| Error::Verification(format!("DSSE signature: {}", e)))?;
            }
            BundleContent::MessageSignature(signature) => {
                let digest = signature.message_digest.as_ref().ok_or_else(|| {
                    Error::Verification("message signature carries no digest".to_string())
                })?;
                key.verify_prehashed(digest.algorithm, &digest.digest, &signature.signature)
                    .map_err(|e| Error::Verification(format!("message signature: {}", e)))?;
            }
        }

        let timestamps = self.verify_timestamps(bundle, &leaf, now)?;
        let times: Vec<DateTime<Utc>> = timestamps.iter().map(|t| t.time).collect();

        verify_certificate_chain(&leaf, &times, self.trusted_root)?;
        for time in &times {
            validate_certificate_time(*time, &leaf)?;
        }
        verify_x509_profile(&leaf)?;

        let statement = check_artifact(bundle, policy)?;
        let signer = extract_identity(&leaf)?;
        policy
            .identity
            .check(signer.issuer.as_deref(), &signer.sans)?;

        Ok(VerifiedStatement {
            statement,
            signer,
            timestamps,
        })
    }

    fn verify_timestamps(
        &self,
        bundle: &Bundle,
        leaf: &ParsedCertificate,
        now: DateTime<Utc>,
    ) -> Result<Vec<VerifiedTimestamp>> {
        let signature = bundle
            .signature_bytes()
            .ok_or_else(|| Error::Verification("bundle carries no signature".to_string()))?;

        let mut timestamps = Vec::new();
        for timestamp in bundle.rfc3161_timestamps() {
            let time = tsa::verify_timestamp(&timestamp.signed_timestamp, signature, self.trusted_root)?;
            timestamps.push(VerifiedTimestamp {
                source: TimestampSource::SignedTimestamp,
                time,
            });
        }
        let signed = timestamps.len();

        let validity = (leaf.not_before()?, leaf.not_after()?);
        let mut tlog_entries = 0;
        for entry in bundle.tlog_entries() {
            rekor::verify_entry_body(entry, bundle, &leaf.der)?;
            let verified = tlog::verify_tlog_entry(
                entry,
                self.trusted_root,
                validity,
                now,
                self.options.clock_skew_seconds,
            )?;
            tlog_entries += 1;
            if let (true, Some(time)) = (verified.promise_verified, verified.integrated_time) {
                timestamps.push(VerifiedTimestamp {
                    source: TimestampSource::TransparencyLog,
                    time,
                });
            }
        }

        if signed < self.options.signed_timestamps {
            return Err(Error::Verification(format!(
                "{} verified signed timestamps, {} required",
                signed, self.options.signed_timestamps
            )));
        }
        if tlog_entries < self.options.transparency_log_entries {
            return Err(Error::Verification(format!(
                "{} verified transparency log entries, {} required",
                tlog_entries, self.options.transparency_log_entries
            )));
        }
        if timestamps.len() < self.options.observer_timestamps {
            return Err(Error::Verification(format!(
                "{} verified observer timestamps, {} required",
                timestamps.len(),
                self.options.observer_timestamps
            )));
        }

        if timestamps.is_empty() {
            if !self.options.use_current_time {
                return Err(Error::Verification(
                    "no verified timestamps and current time is not allowed".to_string(),
                ));
            }
            timestamps.push(VerifiedTimestamp {
                source: TimestampSource::CurrentTime,
                time: now,
            });
        }
        Ok(timestamps)
    }
}

/// Check the bundle is about the policy's artifact
fn check_artifact(bundle: &Bundle, policy: &VerificationPolicy) -> Result<Option<Statement>> {
    let artifact = &policy.artifact;
    match &bundle.content {
        BundleContent::DsseEnvelope(envelope) => {
            if envelope.payload_type != INTOTO_PAYLOAD_TYPE {
                return Err(Error::Verification(format!(
                    "unsupported DSSE payload type {}",
                    envelope.payload_type
                )));
            }
            let statement = Statement::from_payload(&envelope.payload)
                .map_err(|e| Error::Verification(format!("invalid statement: {}", e)))?;
            if !statement.has_subject_digest(artifact.algorithm, &artifact.bytes) {
                return Err(Error::Verification(format!(
                    "statement has no subject with digest {}",
                    artifact
                )));
            }
            Ok(Some(statement))
        }
        BundleContent::MessageSignature(signature) => {
            let matches = signature
                .message_digest
                .as_ref()
                .is_some_and(|d| d.algorithm == artifact.algorithm && d.digest == artifact.bytes);
            if !matches {
                return Err(Error::Verification(format!(
                    "message digest does not match {}",
                    artifact
                )));
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{build_policy, PolicyOptions};
    use attest_types::{Descriptor, Digest};

    const ISSUER: &str = "https://token.actions.githubusercontent.com";
    const BUILD: &str = "https://github.com/org/demo/.github/workflows/build.yaml@refs/heads/main";
    const IMAGE_DIGEST: &str =
        "sha256:b22c7289dd3b4785a3795c90e15d16bd66bd29b444b8974fe29ed0443ce50405";

    fn fixtures() -> (Bundle, TrustedRoot, VerificationPolicy) {
        let bundle = Bundle::from_slice(include_bytes!("../tests/data/bundle.sigstore.json")).unwrap();
        let root = TrustedRoot::from_slice(include_bytes!("../tests/data/trusted_root.json")).unwrap();
        let descriptor = Descriptor::new(
            "application/vnd.oci.image.manifest.v1+json",
            IMAGE_DIGEST.parse::<Digest>().unwrap(),
            0,
        );
        let policy = build_policy(&descriptor, &PolicyOptions::new(ISSUER, BUILD)).unwrap();
        (bundle, root, policy)
    }

    fn integrated_time(bundle: &Bundle) -> DateTime<Utc> {
        DateTime::from_timestamp(bundle.tlog_entries()[0].integrated_time, 0).unwrap()
    }

    #[test]
    fn test_default_thresholds() {
        let options = VerifierOptions::default();
        assert_eq!(options.signed_timestamps, 1);
        assert_eq!(options.transparency_log_entries, 0);
        assert_eq!(options.observer_timestamps, 0);
        assert!(!options.use_current_time);
    }

    #[test]
    fn test_timestamps_collected_from_both_sources() {
        let (bundle, root, policy) = fixtures();
        let now = integrated_time(&bundle) + chrono::Duration::seconds(30);
        let verifier = Verifier::new(&root, VerifierOptions::default().with_observer_timestamps(2));
        let verified = verifier.verify_at(&bundle, &policy, now).unwrap();
        let sources: Vec<_> = verified.timestamps.iter().map(|t| t.source).collect();
        assert_eq!(
            sources,
            vec![TimestampSource::SignedTimestamp, TimestampSource::TransparencyLog]
        );
    }

    #[test]
    fn test_thresholds_enforced() {
        let (bundle, root, policy) = fixtures();
        let now = integrated_time(&bundle) + chrono::Duration::seconds(30);

        let verifier = Verifier::new(&root, VerifierOptions::default().with_signed_timestamps(2));
        assert!(verifier.verify_at(&bundle, &policy, now).is_err());

        let verifier = Verifier::new(&root, VerifierOptions::default().with_transparency_log_entries(2));
        assert!(verifier.verify_at(&bundle, &policy, now).is_err());

        let verifier = Verifier::new(&root, VerifierOptions::default().with_observer_timestamps(3));
        assert!(verifier.verify_at(&bundle, &policy, now).is_err());
    }

    #[test]
    fn test_integrated_time_in_future_rejected() {
        let (bundle, root, policy) = fixtures();
        let now = integrated_time(&bundle) - chrono::Duration::seconds(DEFAULT_CLOCK_SKEW_SECONDS + 5);
        let verifier = Verifier::new(&root, VerifierOptions::default());
        assert!(verifier.verify_at(&bundle, &policy, now).is_err());
    }

    #[test]
    fn test_no_timestamps_needs_current_time() {
        let (mut bundle, root, policy) = fixtures();
        bundle.verification_material.tlog_entries.clear();
        bundle.verification_material.timestamp_verification_data = None;
        let now = integrated_time_or_leaf(&bundle);

        let options = VerifierOptions::default().with_signed_timestamps(0);
        let verifier = Verifier::new(&root, options.clone());
        assert!(verifier.verify_at(&bundle, &policy, now).is_err());

        let verifier = Verifier::new(&root, options.with_current_time(true));
        let verified = verifier.verify_at(&bundle, &policy, now).unwrap();
        assert_eq!(verified.timestamps[0].source, TimestampSource::CurrentTime);
    }

    // a time inside the leaf validity window
    fn integrated_time_or_leaf(bundle: &Bundle) -> DateTime<Utc> {
        let leaf = ParsedCertificate::parse(bundle.signing_certificate().unwrap()).unwrap();
        leaf.not_before().unwrap() + chrono::Duration::seconds(60)
    }
}
