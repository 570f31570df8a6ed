//! Attestation filtering, policy construction and bundle verification
//!
//! Verification checks, per bundle:
//! - the signature over the DSSE envelope (or the message digest)
//! - RFC 3161 timestamps and transparency log entries, against the
//!   configured thresholds
//! - that the signing certificate chains to a trusted certificate authority
//!   at every verified time
//! - that the statement is about the expected artifact and the certificate
//!   carries the expected identity
//!
//! # Example
//!
//! ```no_run
//! use attest_trust_root::TrustedRoot;
//! use attest_types::{AttestationBundle, Descriptor};
//! use attest_verify::{build_policy, filter_by_predicate_type, PolicyOptions, Verifier, VerifierOptions};
//!
//! # fn example(descriptor: Descriptor, bundles: Vec<AttestationBundle>) -> Result<(), Box<dyn std::error::Error>> {
//! let root = TrustedRoot::from_file("trusted_root.json")?;
//! let bundles = filter_by_predicate_type(bundles, "https://slsa.dev/provenance/v1");
//! let policy = build_policy(
//!     &descriptor,
//!     &PolicyOptions::new(
//!         "https://token.actions.githubusercontent.com",
//!         "https://github.com/org/demo/.github/workflows/*",
//!     ),
//! )?;
//!
//! let verifier = Verifier::new(&root, VerifierOptions::default());
//! for result in verifier.verify_bundles(bundles, &descriptor, &policy) {
//!     println!("verified: {}", result.is_verified());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod filter;
pub mod policy;
mod verify;

mod verify_impl;

pub use error::{Error, Result};
pub use filter::filter_by_predicate_type;
pub use policy::{
    build_policy, ArtifactDigest, CertificateIdentity, PolicyOptions, SubjectMatcher,
    VerificationPolicy,
};
pub use verify::{
    TimestampSource, VerificationResult, VerifiedStatement, VerifiedTimestamp, Verifier,
    VerifierOptions, DEFAULT_CLOCK_SKEW_SECONDS,
};
pub use verify_impl::helpers::SignerIdentity;
