//! Fetch, filter, policy, trust root, verify

use crate::config::VerificationOptions;
use crate::error::{Error, Result};
use attest_registry::{BundleFetcher, RegistryClient};
use attest_trust_root::TrustRootProvider;
use attest_types::Descriptor;
use attest_verify::{
    build_policy, filter_by_predicate_type, VerificationResult, VerifiedStatement, Verifier,
};

/// Per-bundle outcomes of one run over an image
#[derive(Debug)]
pub struct VerificationReport {
    pub image: String,
    /// The manifest every verified statement was checked against
    pub descriptor: Descriptor,
    pub results: Vec<VerificationResult>,
}

impl VerificationReport {
    /// Statement of the first bundle that verified, in referrer order
    pub fn first_verified(&self) -> Option<&VerifiedStatement> {
        self.verified().next()
    }

    pub fn verified(&self) -> impl Iterator<Item = &VerifiedStatement> {
        self.results.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.is_verified()).count()
    }
}

/// Runs verification for images against one registry and trust root source
pub struct Pipeline<C, T> {
    fetcher: BundleFetcher<C>,
    trust_root: T,
    options: VerificationOptions,
}

impl<C: RegistryClient, T: TrustRootProvider> Pipeline<C, T> {
    pub fn new(client: C, trust_root: T, options: VerificationOptions) -> Self {
        Self {
            fetcher: BundleFetcher::new(client).with_limit(options.limit),
            trust_root,
            options,
        }
    }

    pub fn options(&self) -> &VerificationOptions {
        &self.options
    }

    /// Verify the attestations attached to `image`
    ///
    /// Stage failures abort the run. Individual bundles that fail are kept in
    /// the report; the run only fails when none of them verifies.
    pub async fn run(&self, image: &str) -> Result<VerificationReport> {
        let fetched = self.fetcher.fetch(image).await?;
        let found = fetched.bundles.len();

        let bundles = filter_by_predicate_type(fetched.bundles, &self.options.predicate_type);
        tracing::info!(
            image,
            digest = %fetched.descriptor.digest,
            found,
            matching = bundles.len(),
            predicate_type = %self.options.predicate_type,
            "discovered attestations"
        );
        if bundles.is_empty() {
            return Err(Error::NoBundles {
                image: image.to_string(),
                predicate_type: self.options.predicate_type.clone(),
            });
        }

        let policy =
            build_policy(&fetched.descriptor, &self.options.policy).map_err(Error::PolicyConstruction)?;
        let trusted_root = self.trust_root.trusted_root().await?;

        let verifier = Verifier::new(&trusted_root, self.options.verifier.clone());
        let results = verifier.verify_bundles(bundles, &fetched.descriptor, &policy);

        let report = VerificationReport {
            image: image.to_string(),
            descriptor: fetched.descriptor,
            results,
        };
        if report.first_verified().is_none() {
            let reason = report
                .results
                .iter()
                .find_map(|r| r.outcome.as_ref().err())
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(Error::Verification {
                checked: report.results.len(),
                reason,
            });
        }
        Ok(report)
    }
}
