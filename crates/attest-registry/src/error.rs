//! Error types for attest-registry

use oci_client::errors::{DigestError, OciDistributionError, OciErrorCode};
use thiserror::Error;

/// Errors raised while discovering and downloading attestation bundles
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid image reference {reference:?}: {message}")]
    InvalidReference { reference: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry error: {0}")]
    Oci(#[source] OciDistributionError),

    #[error("registry returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("{content} exceeds {limit} bytes (at least {size} bytes)")]
    TooLarge {
        content: String,
        size: u64,
        limit: u64,
    },

    #[error("image has {found} referrers, limit is {limit}")]
    TooManyReferrers { found: usize, limit: usize },

    #[error("failed to decode bundle {digest}: {message}")]
    BundleDecode { digest: String, message: String },
}

impl Error {
    pub(crate) fn status(url: &str, status: reqwest::StatusCode) -> Self {
        Error::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    }

    pub(crate) fn too_large(content: impl ToString, size: u64, limit: u64) -> Self {
        Error::TooLarge {
            content: content.to_string(),
            size,
            limit,
        }
    }

    /// Whether the registry reported the content as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Status { status: 404, .. })
    }
}

impl From<DigestError> for Error {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::VerificationError { expected, actual } => {
                Error::DigestMismatch { expected, actual }
            }
            other => Error::Oci(other.into()),
        }
    }
}

impl From<OciDistributionError> for Error {
    fn from(err: OciDistributionError) -> Self {
        match err {
            OciDistributionError::ServerError { code, url, .. } => Error::Status { url, status: code },
            OciDistributionError::UnauthorizedError { url } => Error::Status { url, status: 401 },
            OciDistributionError::RegistryError { envelope, url }
                if envelope.errors.iter().any(|e| {
                    matches!(
                        e.code,
                        OciErrorCode::ManifestUnknown
                            | OciErrorCode::BlobUnknown
                            | OciErrorCode::NameUnknown
                            | OciErrorCode::NotFound
                    )
                }) =>
            {
                Error::Status { url, status: 404 }
            }
            OciDistributionError::DigestError(err) => err.into(),
            OciDistributionError::RequestError(err) => match err.status() {
                Some(status) => Error::Status {
                    url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                    status: status.as_u16(),
                },
                None => Error::Http(err),
            },
            other => Error::Oci(other),
        }
    }
}

/// Result type for attest-registry operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_statuses_are_kept() {
        let err: Error = OciDistributionError::ServerError {
            code: 404,
            url: "http://localhost/v2/org/demo/manifests/latest".into(),
            message: String::new(),
        }
        .into();
        assert!(err.is_not_found());

        let err: Error = OciDistributionError::UnauthorizedError {
            url: "http://localhost/v2/org/demo/manifests/latest".into(),
        }
        .into();
        assert!(matches!(err, Error::Status { status: 401, .. }));

        let envelope = serde_json::from_str(
            r#"{"errors":[{"code":"MANIFEST_UNKNOWN","message":"manifest unknown"}]}"#,
        )
        .unwrap();
        let err: Error = OciDistributionError::RegistryError {
            envelope,
            url: "http://localhost/v2/org/demo/manifests/latest".into(),
        }
        .into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_digest_errors_become_mismatches() {
        let err: Error = OciDistributionError::DigestError(DigestError::VerificationError {
            expected: "sha256:aa".into(),
            actual: "sha256:bb".into(),
        })
        .into();
        assert!(matches!(err, Error::DigestMismatch { ref expected, .. } if expected == "sha256:aa"));

        let err: Error = OciDistributionError::GenericError(None).into();
        assert!(matches!(err, Error::Oci(_)));
    }
}
