//! Discovery of Sigstore attestation bundles attached to OCI images
//!
//! Bundles are found through the OCI referrers API, falling back to the
//! referrers tag schema for registries that do not implement it. Every
//! manifest and blob is checked against the digest it was requested by, and
//! no download is read past its size cap.
//!
//! # Example
//!
//! ```no_run
//! use attest_registry::{BundleFetcher, OciRegistry, RegistryConfig};
//!
//! # async fn example() -> Result<(), attest_registry::Error> {
//! let registry = OciRegistry::new(RegistryConfig::default())?;
//! let fetched = BundleFetcher::new(registry)
//!     .with_limit(100)
//!     .fetch("ghcr.io/org/demo:latest")
//!     .await?;
//! println!("{} bundles for {}", fetched.bundles.len(), fetched.descriptor.digest);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod fetch;
pub mod models;

pub use client::{
    compute_digest, verify_digest, OciRegistry, RegistryClient, RegistryConfig,
    DEFAULT_MAX_BLOB_SIZE,
};
pub use error::{Error, Result};
pub use fetch::{is_bundle_artifact, BundleFetcher, FetchedBundles, DEFAULT_REFERRER_LIMIT};
pub use models::{ImageIndex, ImageManifest};
pub use oci_client::secrets::RegistryAuth;
pub use oci_client::Reference;
