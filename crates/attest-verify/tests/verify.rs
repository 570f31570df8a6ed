//! End-to-end verification against the checked-in fixtures
//!
//! `tests/data/generate.py` produces a private PKI (certificate authority,
//! timestamp authority, transparency log) and bundles signed under it.

use attest_trust_root::TrustedRoot;
use attest_types::{AttestationBundle, Bundle, Descriptor, Digest};
use attest_verify::{
    build_policy, filter_by_predicate_type, Error, PolicyOptions, TimestampSource,
    VerificationPolicy, Verifier, VerifierOptions,
};
use pretty_assertions::assert_eq;

const ISSUER: &str = "https://token.actions.githubusercontent.com";
const BUILD_IDENTITY: &str =
    "https://github.com/org/demo/.github/workflows/build.yaml@refs/heads/main";
const RELEASE_IDENTITY: &str =
    "https://github.com/org/demo/.github/workflows/release.yaml@refs/tags/v1.0.0";
const PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v1";
const IMAGE_DIGEST: &str =
    "sha256:b22c7289dd3b4785a3795c90e15d16bd66bd29b444b8974fe29ed0443ce50405";
const ARTIFACT_DIGEST: &str =
    "sha256:b8fcaf267de0f3b28c44df1861acc317875e236555f2d2c497e107abfa5e8b37";

fn trusted_root() -> TrustedRoot {
    TrustedRoot::from_slice(include_bytes!("data/trusted_root.json")).unwrap()
}

fn build_bundle() -> Bundle {
    Bundle::from_slice(include_bytes!("data/bundle.sigstore.json")).unwrap()
}

fn release_bundle() -> Bundle {
    Bundle::from_slice(include_bytes!("data/bundle_release.sigstore.json")).unwrap()
}

fn message_bundle() -> Bundle {
    Bundle::from_slice(include_bytes!("data/bundle_message.sigstore.json")).unwrap()
}

fn descriptor(digest: &str) -> Descriptor {
    Descriptor::new(
        "application/vnd.oci.image.manifest.v1+json",
        digest.parse::<Digest>().unwrap(),
        0,
    )
}

fn policy(digest: &str, subject: &str) -> VerificationPolicy {
    build_policy(&descriptor(digest), &PolicyOptions::new(ISSUER, subject)).unwrap()
}

#[test]
fn test_build_bundle_verifies() {
    let root = trusted_root();
    let verifier = Verifier::new(&root, VerifierOptions::default());
    let verified = verifier
        .verify(&build_bundle(), &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .unwrap();

    let statement = verified.statement.unwrap();
    assert_eq!(statement.predicate_type, PREDICATE_TYPE);
    assert_eq!(verified.signer.issuer.as_deref(), Some(ISSUER));
    assert_eq!(verified.signer.sans, vec![BUILD_IDENTITY.to_string()]);
    assert!(verified
        .timestamps
        .iter()
        .any(|t| t.source == TimestampSource::SignedTimestamp));
}

#[test]
fn test_identity_must_match_exactly_unless_pattern() {
    let root = trusted_root();
    let verifier = Verifier::new(&root, VerifierOptions::default());

    let err = verifier
        .verify(&release_bundle(), &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .unwrap_err();
    assert!(matches!(err, Error::Verification(_)));

    let verified = verifier
        .verify(
            &release_bundle(),
            &policy(IMAGE_DIGEST, "https://github.com/org/demo/.*"),
        )
        .unwrap();
    assert_eq!(verified.signer.sans, vec![RELEASE_IDENTITY.to_string()]);

    assert!(verifier
        .verify(
            &release_bundle(),
            &policy(IMAGE_DIGEST, "https://github.com/other/.*"),
        )
        .is_err());
}

#[test]
fn test_wrong_artifact_digest_rejected() {
    let root = trusted_root();
    let verifier = Verifier::new(&root, VerifierOptions::default());
    let err = verifier
        .verify(&build_bundle(), &policy(ARTIFACT_DIGEST, BUILD_IDENTITY))
        .unwrap_err();
    assert!(err.to_string().contains("subject"), "{err}");
}

#[test]
fn test_tampered_payload_rejected() {
    let root = trusted_root();
    let mut bundle = build_bundle();
    if let attest_types::BundleContent::DsseEnvelope(envelope) = &mut bundle.content {
        envelope.payload.push(b' ');
    }
    let verifier = Verifier::new(&root, VerifierOptions::default());
    assert!(verifier
        .verify(&bundle, &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .is_err());
}

#[test]
fn test_timestamp_from_other_bundle_rejected() {
    let root = trusted_root();
    let mut bundle = build_bundle();
    bundle.verification_material.timestamp_verification_data = release_bundle()
        .verification_material
        .timestamp_verification_data;

    let verifier = Verifier::new(&root, VerifierOptions::default());
    let err = verifier
        .verify(&bundle, &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .unwrap_err();
    assert!(err.to_string().contains("imprint"), "{err}");
}

#[test]
fn test_log_entry_from_other_bundle_rejected() {
    let root = trusted_root();
    let mut bundle = build_bundle();
    bundle.verification_material.tlog_entries =
        release_bundle().verification_material.tlog_entries;

    let verifier = Verifier::new(&root, VerifierOptions::default());
    assert!(verifier
        .verify(&bundle, &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .is_err());
}

#[test]
fn test_log_only_evidence() {
    let mut root = trusted_root();
    root.timestamp_authorities.clear();
    let mut bundle = build_bundle();
    bundle.verification_material.timestamp_verification_data = None;
    let policy = policy(IMAGE_DIGEST, BUILD_IDENTITY);

    // one signed timestamp is required by default
    let verifier = Verifier::new(&root, VerifierOptions::default());
    assert!(verifier.verify(&bundle, &policy).is_err());

    let options = VerifierOptions::default()
        .with_signed_timestamps(0)
        .with_transparency_log_entries(1)
        .with_observer_timestamps(1);
    let verifier = Verifier::new(&root, options);
    let verified = verifier.verify(&bundle, &policy).unwrap();
    assert_eq!(verified.timestamps.len(), 1);
    assert_eq!(verified.timestamps[0].source, TimestampSource::TransparencyLog);
}

#[test]
fn test_entry_without_integrated_time_relies_on_signed_timestamp() {
    let root = trusted_root();
    let mut bundle = build_bundle();
    let entry = &mut bundle.verification_material.tlog_entries[0];
    entry.integrated_time = 0;
    entry.inclusion_promise = None;

    let verifier = Verifier::new(&root, VerifierOptions::default());
    let verified = verifier
        .verify(&bundle, &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .unwrap();
    let sources: Vec<_> = verified.timestamps.iter().map(|t| t.source).collect();
    assert_eq!(sources, vec![TimestampSource::SignedTimestamp]);
}

#[test]
fn test_message_signature_bundle() {
    let root = trusted_root();
    let options = VerifierOptions::default()
        .with_signed_timestamps(0)
        .with_transparency_log_entries(1);
    let verifier = Verifier::new(&root, options);

    let verified = verifier
        .verify(&message_bundle(), &policy(ARTIFACT_DIGEST, BUILD_IDENTITY))
        .unwrap();
    assert!(verified.statement.is_none());

    assert!(verifier
        .verify(&message_bundle(), &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .is_err());
}

#[test]
fn test_untrusted_root_rejected() {
    let mut root = trusted_root();
    root.certificate_authorities = root.timestamp_authorities.clone();
    let verifier = Verifier::new(&root, VerifierOptions::default());
    let err = verifier
        .verify(&build_bundle(), &policy(IMAGE_DIGEST, BUILD_IDENTITY))
        .unwrap_err();
    assert!(err.to_string().contains("chain"), "{err}");
}

#[test]
fn test_outcomes_are_per_bundle() {
    let root = trusted_root();
    let bundles: Vec<AttestationBundle> = vec![
        release_bundle().into(),
        message_bundle().into(),
        build_bundle().into(),
    ];
    let bundles = filter_by_predicate_type(bundles, PREDICATE_TYPE);
    assert_eq!(bundles.len(), 2);

    let verifier = Verifier::new(&root, VerifierOptions::default());
    let results = verifier.verify_bundles(
        bundles,
        &descriptor(IMAGE_DIGEST),
        &policy(IMAGE_DIGEST, BUILD_IDENTITY),
    );
    let verified: Vec<bool> = results.iter().map(|r| r.is_verified()).collect();
    assert_eq!(verified, vec![false, true]);
    assert!(results[1].bundle.statement.is_some());
    assert_eq!(results[1].descriptor.digest.to_string(), IMAGE_DIGEST);
}
