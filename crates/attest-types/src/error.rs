//! Error types for attest-types

use thiserror::Error;

/// Errors raised while decoding or interpreting attestation documents
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid statement: {0}")]
    InvalidStatement(String),
}

/// Result type for attest-types operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
