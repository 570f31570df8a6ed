//! Run configuration

use attest_registry::DEFAULT_REFERRER_LIMIT;
use attest_verify::{PolicyOptions, VerifierOptions};

/// OIDC issuer of GitHub Actions workflow identities
pub const GITHUB_ACTIONS_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Options for one verification run
#[derive(Debug, Clone)]
pub struct VerificationOptions {
    /// Predicate type bundles must carry; empty keeps every bundle
    pub predicate_type: String,
    /// Referrers examined before the run is refused
    pub limit: usize,
    pub policy: PolicyOptions,
    pub verifier: VerifierOptions,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            predicate_type: String::new(),
            limit: DEFAULT_REFERRER_LIMIT,
            policy: PolicyOptions::new(GITHUB_ACTIONS_ISSUER, String::new()),
            verifier: VerifierOptions::default(),
        }
    }
}

impl VerificationOptions {
    /// Options expecting `subject` under the default issuer
    pub fn new(subject: impl Into<String>) -> Self {
        let mut options = Self::default();
        options.policy.subject = subject.into();
        options
    }

    pub fn with_predicate_type(mut self, predicate_type: impl Into<String>) -> Self {
        self.predicate_type = predicate_type.into();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.policy.issuer = issuer.into();
        self
    }

    pub fn with_verifier_options(mut self, verifier: VerifierOptions) -> Self {
        self.verifier = verifier;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = VerificationOptions::new("https://github.com/org/demo/*");
        assert_eq!(options.limit, 100);
        assert!(options.predicate_type.is_empty());
        assert_eq!(options.policy.issuer, GITHUB_ACTIONS_ISSUER);
        assert_eq!(options.policy.subject, "https://github.com/org/demo/*");
        assert_eq!(options.verifier.signed_timestamps, 1);
    }

    #[test]
    fn test_builder() {
        let options = VerificationOptions::new("user@example.com")
            .with_predicate_type("https://slsa.dev/provenance/v1")
            .with_limit(5)
            .with_issuer("https://accounts.google.com")
            .with_verifier_options(VerifierOptions::default().with_signed_timestamps(0));
        assert_eq!(options.predicate_type, "https://slsa.dev/provenance/v1");
        assert_eq!(options.limit, 5);
        assert_eq!(options.policy.issuer, "https://accounts.google.com");
        assert_eq!(options.verifier.signed_timestamps, 0);
    }
}
