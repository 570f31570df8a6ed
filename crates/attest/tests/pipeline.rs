//! Full runs against a mock registry serving the signed fixtures

use attest::{Error, Pipeline, VerificationOptions};
use attest_registry::{compute_digest, OciRegistry, RegistryConfig};
use attest_trust_root::{StaticTrustRoot, TrustedRoot};
use attest_types::{Digest, HashAlgorithm};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
const INDEX: &str = "application/vnd.oci.image.index.v1+json";
const BUNDLE_V3: &str = "application/vnd.dev.sigstore.bundle.v0.3+json";
const IMAGE_DIGEST: &str =
    "sha256:b22c7289dd3b4785a3795c90e15d16bd66bd29b444b8974fe29ed0443ce50405";
const BUILD_IDENTITY: &str =
    "https://github.com/org/demo/.github/workflows/build.yaml@refs/heads/main";

const BUILD_BUNDLE: &[u8] = include_bytes!("../../attest-verify/tests/data/bundle.sigstore.json");
const RELEASE_BUNDLE: &[u8] =
    include_bytes!("../../attest-verify/tests/data/bundle_release.sigstore.json");

fn trust_root() -> StaticTrustRoot {
    TrustedRoot::from_slice(include_bytes!(
        "../../attest-verify/tests/data/trusted_root.json"
    ))
    .unwrap()
    .into()
}

/// Mount the image and one referrer per bundle, in order
async fn mount_image(server: &MockServer, bundles: &[&[u8]]) {
    let image_digest: Digest = IMAGE_DIGEST.parse().unwrap();
    Mock::given(method("HEAD"))
        .and(path("/v2/org/demo/manifests/latest"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Docker-Content-Digest", IMAGE_DIGEST)
                .insert_header("Content-Type", MANIFEST),
        )
        .mount(server)
        .await;

    let mut referrers = Vec::new();
    for blob in bundles {
        let blob_digest = compute_digest(HashAlgorithm::Sha256, blob);
        let manifest = serde_json::to_vec(&json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST,
            "artifactType": BUNDLE_V3,
            "config": {
                "mediaType": "application/vnd.oci.empty.v1+json",
                "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
                "size": 2
            },
            "layers": [{
                "mediaType": BUNDLE_V3,
                "digest": blob_digest.to_string(),
                "size": blob.len()
            }],
            "subject": {
                "mediaType": MANIFEST,
                "digest": image_digest.to_string(),
                "size": 512
            }
        }))
        .unwrap();
        let manifest_digest = compute_digest(HashAlgorithm::Sha256, &manifest);

        Mock::given(method("GET"))
            .and(path(format!("/v2/org/demo/manifests/{}", manifest_digest)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", MANIFEST)
                    .set_body_bytes(manifest.clone()),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v2/org/demo/blobs/{}", blob_digest)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(blob.to_vec()))
            .mount(server)
            .await;

        referrers.push(json!({
            "mediaType": MANIFEST,
            "digest": manifest_digest.to_string(),
            "size": manifest.len(),
            "artifactType": BUNDLE_V3
        }));
    }

    Mock::given(method("GET"))
        .and(path(format!("/v2/org/demo/referrers/{}", image_digest)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schemaVersion": 2,
            "mediaType": INDEX,
            "manifests": referrers
        })))
        .mount(server)
        .await;
}

fn pipeline(
    server: &MockServer,
    options: VerificationOptions,
) -> Pipeline<OciRegistry, StaticTrustRoot> {
    let config = RegistryConfig::default().with_insecure_registry(server.address().to_string());
    Pipeline::new(OciRegistry::new(config).unwrap(), trust_root(), options)
}

fn image(server: &MockServer) -> String {
    format!("{}/org/demo:latest", server.address())
}

#[tokio::test]
async fn test_run_verifies_matching_bundle() {
    let server = MockServer::start().await;
    mount_image(&server, &[RELEASE_BUNDLE, BUILD_BUNDLE]).await;

    let report = pipeline(&server, VerificationOptions::new(BUILD_IDENTITY))
        .run(&image(&server))
        .await
        .unwrap();

    assert_eq!(report.descriptor.digest.to_string(), IMAGE_DIGEST);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.results[0].is_verified());

    let verified = report.first_verified().unwrap();
    assert_eq!(verified.signer.sans, vec![BUILD_IDENTITY.to_string()]);
    let statement = verified.statement.as_ref().unwrap();
    assert_eq!(statement.predicate_type, "https://slsa.dev/provenance/v1");
}

#[tokio::test]
async fn test_single_bundle_yields_one_result() {
    let server = MockServer::start().await;
    mount_image(&server, &[BUILD_BUNDLE]).await;

    let report = pipeline(&server, VerificationOptions::new(BUILD_IDENTITY))
        .run(&image(&server))
        .await
        .unwrap();
    assert_eq!(report.results.len(), 1);

    let result = &report.results[0];
    assert_eq!(result.descriptor.digest.to_string(), IMAGE_DIGEST);
    let statement = result.outcome.as_ref().unwrap().statement.as_ref().unwrap();
    assert_eq!(statement.predicate_type, "https://slsa.dev/provenance/v1");
}

#[tokio::test]
async fn test_pattern_subject_verifies_every_bundle() {
    let server = MockServer::start().await;
    mount_image(&server, &[RELEASE_BUNDLE, BUILD_BUNDLE]).await;

    let options = VerificationOptions::new("https://github.com/org/demo/.github/workflows/.*");
    let report = pipeline(&server, options).run(&image(&server)).await.unwrap();
    assert_eq!(report.verified().count(), 2);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn test_run_fails_when_nothing_verifies() {
    let server = MockServer::start().await;
    mount_image(&server, &[RELEASE_BUNDLE, BUILD_BUNDLE]).await;

    let options = VerificationOptions::new("https://github.com/org/other/.*");
    let err = pipeline(&server, options).run(&image(&server)).await.unwrap_err();
    assert!(matches!(err, Error::Verification { checked: 2, .. }), "{err}");
    assert_eq!(err.exit_code(), 16);
}

#[tokio::test]
async fn test_unknown_predicate_type_has_no_bundles() {
    let server = MockServer::start().await;
    mount_image(&server, &[BUILD_BUNDLE]).await;

    let options =
        VerificationOptions::new(BUILD_IDENTITY).with_predicate_type("https://spdx.dev/Document");
    let err = pipeline(&server, options).run(&image(&server)).await.unwrap_err();
    assert!(matches!(err, Error::NoBundles { .. }), "{err}");
}

#[tokio::test]
async fn test_limit_is_fatal() {
    let server = MockServer::start().await;
    mount_image(&server, &[RELEASE_BUNDLE, BUILD_BUNDLE]).await;

    let options = VerificationOptions::new(BUILD_IDENTITY).with_limit(1);
    let err = pipeline(&server, options).run(&image(&server)).await.unwrap_err();
    assert!(matches!(err, Error::TooManyReferrers { found: 2, limit: 1 }), "{err}");
}

#[tokio::test]
async fn test_trusted_root_file_is_read() {
    let server = MockServer::start().await;
    mount_image(&server, &[BUILD_BUNDLE]).await;

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("trusted_root.json");
    let config = RegistryConfig::default().with_insecure_registry(server.address().to_string());
    let err = Pipeline::new(
        OciRegistry::new(config).unwrap(),
        StaticTrustRoot::from_file(&missing),
        VerificationOptions::new(BUILD_IDENTITY),
    )
    .run(&image(&server))
    .await
    .unwrap_err();
    assert!(matches!(err, Error::TrustRootAcquisition(_)), "{err}");
}
