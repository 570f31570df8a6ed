//! Error types for the attestation pipeline

use thiserror::Error;

/// Whole-run failures, one variant per stage that can abort a run
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid image reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    #[error("registry error: {0}")]
    Registry(#[source] attest_registry::Error),

    #[error("image has {found} referrers, limit is {limit}")]
    TooManyReferrers { found: usize, limit: usize },

    #[error("failed to decode bundle {digest}: {message}")]
    BundleDecode { digest: String, message: String },

    #[error("failed to build verification policy: {0}")]
    PolicyConstruction(#[source] attest_verify::Error),

    #[error("failed to acquire trusted root: {0}")]
    TrustRootAcquisition(#[from] attest_trust_root::Error),

    #[error("none of {checked} bundles verified: {reason}")]
    Verification { checked: usize, reason: String },

    #[error("no attestations with predicate type {predicate_type:?} found for {image}")]
    NoBundles {
        image: String,
        predicate_type: String,
    },
}

impl Error {
    /// Process exit code for this failure
    ///
    /// Codes start at 10 so they never collide with clap's usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidReference { .. } => 10,
            Error::Registry(_) => 11,
            Error::TooManyReferrers { .. } => 12,
            Error::BundleDecode { .. } => 13,
            Error::PolicyConstruction(_) => 14,
            Error::TrustRootAcquisition(_) => 15,
            Error::Verification { .. } => 16,
            Error::NoBundles { .. } => 17,
        }
    }
}

impl From<attest_registry::Error> for Error {
    fn from(err: attest_registry::Error) -> Self {
        match err {
            attest_registry::Error::InvalidReference { reference, message } => {
                Error::InvalidReference { reference, message }
            }
            attest_registry::Error::TooManyReferrers { found, limit } => {
                Error::TooManyReferrers { found, limit }
            }
            attest_registry::Error::BundleDecode { digest, message } => {
                Error::BundleDecode { digest, message }
            }
            other => Error::Registry(other),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_keep_their_category() {
        let err: Error = attest_registry::Error::TooManyReferrers { found: 3, limit: 2 }.into();
        assert!(matches!(err, Error::TooManyReferrers { found: 3, limit: 2 }));

        let err: Error = attest_registry::Error::InvalidReference {
            reference: "ghcr.io/Org".into(),
            message: "repository name must be lowercase".into(),
        }
        .into();
        assert_eq!(err.exit_code(), 10);

        let err: Error = attest_registry::Error::Status {
            url: "https://ghcr.io/v2/org/demo/manifests/latest".into(),
            status: 500,
        }
        .into();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::InvalidReference {
                reference: String::new(),
                message: String::new(),
            },
            Error::Registry(attest_registry::Error::InvalidResponse(String::new())),
            Error::TooManyReferrers { found: 0, limit: 0 },
            Error::BundleDecode {
                digest: String::new(),
                message: String::new(),
            },
            Error::PolicyConstruction(attest_verify::Error::Policy(String::new())),
            Error::TrustRootAcquisition(attest_trust_root::Error::Tuf(String::new())),
            Error::Verification {
                checked: 0,
                reason: String::new(),
            },
            Error::NoBundles {
                image: String::new(),
                predicate_type: String::new(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(Error::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|&c| c >= 10));
    }
}
