//! Error types for attest-verify

use thiserror::Error;

/// Errors raised while building policies and verifying bundles
#[derive(Error, Debug)]
pub enum Error {
    #[error("policy construction failed: {0}")]
    Policy(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("bundle error: {0}")]
    Bundle(#[from] attest_types::Error),

    #[error("ASN.1 error: {0}")]
    Der(#[from] der::Error),
}

/// Result type for attest-verify operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
