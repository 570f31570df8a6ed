//! Attestation bundle discovery

use crate::client::RegistryClient;
use crate::error::{Error, Result};
use attest_types::{AttestationBundle, Bundle, Descriptor, BUNDLE_ARTIFACT_TYPE_PREFIX};
use oci_client::Reference;

/// Default cap on the number of referrers examined for one image
pub const DEFAULT_REFERRER_LIMIT: usize = 100;

/// Bundles discovered for one image
#[derive(Debug, Clone)]
pub struct FetchedBundles {
    /// The reference as parsed, with registry defaults applied
    pub reference: Reference,
    /// Descriptor of the image manifest the reference resolved to
    pub descriptor: Descriptor,
    pub bundles: Vec<AttestationBundle>,
}

/// Resolves an image and downloads the Sigstore bundles that refer to it
pub struct BundleFetcher<C> {
    client: C,
    limit: usize,
}

impl<C: RegistryClient> BundleFetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            limit: DEFAULT_REFERRER_LIMIT,
        }
    }

    /// Set the referrer limit; indexes larger than this are refused outright
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Discover and decode every bundle attached to `image`
    pub async fn fetch(&self, image: &str) -> Result<FetchedBundles> {
        let reference: Reference = image.parse().map_err(|e| Error::InvalidReference {
            reference: image.to_string(),
            message: format!("{}", e),
        })?;

        let descriptor = self.client.resolve(&reference).await?;
        tracing::debug!(image, digest = %descriptor.digest, "resolved image");

        let index = self.client.referrers(&reference, &descriptor.digest).await?;
        let found = index.manifests.len();
        tracing::debug!(digest = %descriptor.digest, referrers = found, "listed referrers");
        if found > self.limit {
            return Err(Error::TooManyReferrers {
                found,
                limit: self.limit,
            });
        }

        let mut bundles = Vec::new();
        for entry in &index.manifests {
            if !is_bundle_artifact(entry) {
                tracing::debug!(
                    digest = %entry.digest,
                    artifact_type = entry.artifact_type.as_deref().unwrap_or(""),
                    "skipping non-bundle referrer"
                );
                continue;
            }
            bundles.push(self.fetch_bundle(&reference, entry).await?);
        }

        Ok(FetchedBundles {
            reference,
            descriptor,
            bundles,
        })
    }

    async fn fetch_bundle(&self, reference: &Reference, entry: &Descriptor) -> Result<AttestationBundle> {
        let manifest = self.client.manifest(reference, entry).await?;
        let layer = manifest.layers.first().ok_or_else(|| Error::BundleDecode {
            digest: entry.digest.to_string(),
            message: "manifest has no layers".to_string(),
        })?;
        if manifest.layers.len() > 1 {
            tracing::warn!(digest = %entry.digest, layers = manifest.layers.len(), "bundle manifest has extra layers, using the first");
        }

        let blob = self.client.blob(reference, layer).await?;
        let bundle = Bundle::from_slice(&blob).map_err(|e| Error::BundleDecode {
            digest: layer.digest.to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!(digest = %layer.digest, media_type = %bundle.media_type, "decoded bundle");
        Ok(AttestationBundle::new(bundle))
    }
}

/// Whether a referrer's artifact type names the Sigstore bundle family
pub fn is_bundle_artifact(entry: &Descriptor) -> bool {
    entry
        .artifact_type
        .as_deref()
        .is_some_and(|t| t.starts_with(BUNDLE_ARTIFACT_TYPE_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageIndex, ImageManifest};
    use async_trait::async_trait;
    use attest_types::Digest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IMAGE_DIGEST: &str =
        "sha256:6af79ae5de407283dcea8b00d5c37ace95441fd58a8b1d2aa1ed93f5511bb18c";

    /// Client serving a fixed referrers index and counting downloads
    struct FakeRegistry {
        index: ImageIndex,
        downloads: AtomicUsize,
    }

    impl FakeRegistry {
        fn with_referrers(count: usize) -> Self {
            let manifests = (0..count)
                .map(|i| {
                    let digest = Digest::from_bytes(attest_types::HashAlgorithm::Sha256, &[i as u8; 32]);
                    let mut d = Descriptor::new(crate::models::OCI_IMAGE_MANIFEST, digest, 100);
                    d.artifact_type = Some("application/vnd.dev.sigstore.bundle.v0.3+json".into());
                    d
                })
                .collect();
            Self {
                index: ImageIndex {
                    manifests,
                    ..Default::default()
                },
                downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn resolve(&self, _reference: &Reference) -> Result<Descriptor> {
            Ok(Descriptor::new(
                crate::models::OCI_IMAGE_MANIFEST,
                IMAGE_DIGEST.parse().unwrap(),
                1024,
            ))
        }

        async fn referrers(&self, _reference: &Reference, _subject: &Digest) -> Result<ImageIndex> {
            Ok(self.index.clone())
        }

        async fn manifest(&self, _reference: &Reference, descriptor: &Descriptor) -> Result<ImageManifest> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Err(Error::Status {
                url: descriptor.digest.to_string(),
                status: 404,
            })
        }

        async fn blob(&self, _reference: &Reference, _descriptor: &Descriptor) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_invalid_reference() {
        let fetcher = BundleFetcher::new(FakeRegistry::with_referrers(0));
        let err = fetcher.fetch("ghcr.io/Org/Demo:latest").await.unwrap_err();
        assert!(matches!(err, Error::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_too_many_referrers_downloads_nothing() {
        let fetcher = BundleFetcher::new(FakeRegistry::with_referrers(3)).with_limit(2);
        let err = fetcher.fetch("ghcr.io/org/demo:latest").await.unwrap_err();
        assert!(matches!(err, Error::TooManyReferrers { found: 3, limit: 2 }));
        assert_eq!(fetcher.client().downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_referrers_at_limit_proceed() {
        let fetcher = BundleFetcher::new(FakeRegistry::with_referrers(2)).with_limit(2);
        let err = fetcher.fetch("ghcr.io/org/demo:latest").await.unwrap_err();
        // the fake registry has no manifests, so the run stops at the first download
        assert!(err.is_not_found(), "{err}");
        assert_eq!(fetcher.client().downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_referrers() {
        let fetcher = BundleFetcher::new(FakeRegistry::with_referrers(0));
        let fetched = fetcher.fetch("docker.io/library/nginx:latest").await.unwrap();
        assert!(fetched.bundles.is_empty());
        assert_eq!(fetched.descriptor.digest.to_string(), IMAGE_DIGEST);
        assert_eq!(fetched.reference.repository(), "library/nginx");
    }

    #[test]
    fn test_is_bundle_artifact() {
        let digest: Digest = IMAGE_DIGEST.parse().unwrap();
        let mut entry = Descriptor::new(crate::models::OCI_IMAGE_MANIFEST, digest, 10);
        assert!(!is_bundle_artifact(&entry));

        entry.artifact_type = Some("application/vnd.dev.cosign.artifact.sig.v1+json".into());
        assert!(!is_bundle_artifact(&entry));

        entry.artifact_type = Some("application/vnd.dev.sigstore.bundle.v0.3+json".into());
        assert!(is_bundle_artifact(&entry));
    }
}
