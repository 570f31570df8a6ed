//! Error types for attest-trust-root

use thiserror::Error;

/// Errors raised while acquiring or parsing trust material
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("TUF error: {0}")]
    Tuf(String),

    #[error("trust root acquisition timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Result type for attest-trust-root operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
