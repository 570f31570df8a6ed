//! Verification of Sigstore attestations attached to container images
//!
//! A run resolves an image reference, downloads the bundles that refer to
//! it, keeps those carrying the requested predicate type, and verifies each
//! against a trusted root and an identity policy.
//!
//! ```no_run
//! use attest::{Pipeline, VerificationOptions};
//! use attest_registry::{OciRegistry, RegistryConfig};
//! use attest_trust_root::{TufConfig, TufTrustRoot};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = OciRegistry::new(RegistryConfig::default())?;
//! let trust_root = TufTrustRoot::new(TufConfig::github());
//! let options = VerificationOptions::new("https://github.com/org/demo/.github/workflows/*");
//!
//! let report = Pipeline::new(registry, trust_root, options)
//!     .run("ghcr.io/org/demo:latest")
//!     .await?;
//! if let Some(verified) = report.first_verified() {
//!     println!("{}", serde_json::to_string_pretty(&verified.statement)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::{VerificationOptions, GITHUB_ACTIONS_ISSUER};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, VerificationReport};
