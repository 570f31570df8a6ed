//! Core types for container attestation verification
//!
//! This crate holds the data structures shared by the fetch, filter and
//! verification stages: Sigstore bundle documents, DSSE envelopes, in-toto
//! statements and OCI content descriptors.
//!
//! All wire formats are JSON. Byte fields use standard base64 and 64-bit
//! integers accept both the protobuf-JSON string form and plain numbers.

pub mod attestation;
pub mod bundle;
pub mod digest;
pub mod dsse;
pub mod encoding;
pub mod error;
pub mod intoto;

pub use attestation::AttestationBundle;
pub use bundle::{
    Bundle, BundleContent, Checkpoint, HashOutput, InclusionPromise, InclusionProof, KindVersion,
    LogId, MediaType, MessageSignature, Rfc3161SignedTimestamp, TimestampVerificationData,
    TransparencyLogEntry, VerificationMaterial, VerificationMaterialContent, X509Certificate,
    BUNDLE_ARTIFACT_TYPE_PREFIX,
};
pub use digest::{Descriptor, Digest, HashAlgorithm};
pub use dsse::{pae, DsseEnvelope, DsseSignature};
pub use error::{Error, Result};
pub use intoto::{Statement, Subject, INTOTO_PAYLOAD_TYPE, INTOTO_STATEMENT_V1};
