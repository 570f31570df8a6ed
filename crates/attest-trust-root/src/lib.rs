//! Trusted root parsing and acquisition
//!
//! The trusted root holds every trust anchor needed for verification:
//! - certificate authorities that issue signing certificates (Fulcio)
//! - transparency log public keys (Rekor)
//! - certificate transparency log public keys
//! - timestamp authority certificates (RFC 3161)
//!
//! Each anchor carries a validity window. A root is an immutable snapshot:
//! picking up key rotation means fetching a new one.
//!
//! # Features
//!
//! - `tuf` (default) - Fetch the trusted root from a TUF repository,
//!   authenticated against a bootstrap `root.json` compiled into the crate.
//!
//! # Example
//!
//! ```no_run
//! use attest_trust_root::{StaticTrustRoot, TrustRootProvider};
//!
//! # async fn example() -> Result<(), attest_trust_root::Error> {
//! let provider = StaticTrustRoot::from_file("trusted_root.json");
//! let root = provider.trusted_root().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod provider;
pub mod trusted_root;

#[cfg(feature = "tuf")]
pub mod tuf;

pub use error::{Error, Result};
pub use provider::{StaticTrustRoot, TrustRootProvider};
pub use trusted_root::{
    CertificateAuthority, CertificateChain, DistinguishedName, PublicKey, TransparencyLog,
    TrustedRoot, ValidityPeriod, TRUSTED_ROOT_MEDIA_TYPE,
};

#[cfg(feature = "tuf")]
pub use tuf::{
    TufConfig, TufTrustRoot, DEFAULT_TUF_TIMEOUT, DEFAULT_TUF_URL, GITHUB_TUF_ROOT,
    TRUSTED_ROOT_TARGET,
};
