//! Verification policy construction
//!
//! A policy is the conjunction of two requirements: the bundle must attest
//! to the resolved image digest, and its signing certificate must carry the
//! expected identity. Subjects containing `*` are treated as regular
//! expressions; everything else must match exactly.
//!
//! The issuer is always matched exactly. There is no issuer pattern because a
//! wildcard in the subject alone cannot say whether the issuer was meant to
//! vary too.

use crate::error::{Error, Result};
use attest_types::{Descriptor, HashAlgorithm};
use regex::Regex;

/// Character that switches a subject into pattern mode
pub const WILDCARD: char = '*';

/// Identity expectations supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOptions {
    /// OIDC issuer recorded in the signing certificate
    pub issuer: String,
    /// Certificate SAN, literal or pattern
    pub subject: String,
}

impl PolicyOptions {
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
        }
    }
}

/// How the certificate subject is compared
#[derive(Debug, Clone)]
pub enum SubjectMatcher {
    Exact(String),
    Pattern(Regex),
}

impl SubjectMatcher {
    /// Pick the matching mode from the subject string
    pub fn new(subject: &str) -> Result<Self> {
        if subject.is_empty() {
            return Err(Error::Policy("subject must not be empty".to_string()));
        }
        if subject.contains(WILDCARD) {
            let regex = Regex::new(subject)
                .map_err(|e| Error::Policy(format!("invalid subject pattern {:?}: {}", subject, e)))?;
            Ok(SubjectMatcher::Pattern(regex))
        } else {
            Ok(SubjectMatcher::Exact(subject.to_string()))
        }
    }

    pub fn matches(&self, san: &str) -> bool {
        match self {
            SubjectMatcher::Exact(expected) => san == expected,
            SubjectMatcher::Pattern(regex) => regex.is_match(san),
        }
    }

    /// The literal subject, when not in pattern mode
    pub fn exact(&self) -> Option<&str> {
        match self {
            SubjectMatcher::Exact(s) => Some(s),
            SubjectMatcher::Pattern(_) => None,
        }
    }

    /// The subject pattern, when not in literal mode
    pub fn pattern(&self) -> Option<&Regex> {
        match self {
            SubjectMatcher::Exact(_) => None,
            SubjectMatcher::Pattern(regex) => Some(regex),
        }
    }
}

impl std::fmt::Display for SubjectMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectMatcher::Exact(s) => write!(f, "{}", s),
            SubjectMatcher::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// Expected signer identity
#[derive(Debug, Clone)]
pub struct CertificateIdentity {
    pub issuer: String,
    pub subject: SubjectMatcher,
}

impl CertificateIdentity {
    /// Check a certificate's issuer and subject alternative names
    pub fn check(&self, issuer: Option<&str>, sans: &[String]) -> Result<()> {
        let issuer = issuer.ok_or_else(|| {
            Error::Verification("certificate carries no OIDC issuer extension".to_string())
        })?;
        if issuer != self.issuer {
            return Err(Error::Verification(format!(
                "certificate issuer {:?} does not match expected {:?}",
                issuer, self.issuer
            )));
        }
        if !sans.iter().any(|san| self.subject.matches(san)) {
            return Err(Error::Verification(format!(
                "certificate subject {:?} does not match expected {}",
                sans, self.subject
            )));
        }
        Ok(())
    }
}

/// The artifact a bundle must attest to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDigest {
    pub algorithm: HashAlgorithm,
    pub bytes: Vec<u8>,
}

impl std::fmt::Display for ArtifactDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm.oci_name(), hex::encode(&self.bytes))
    }
}

/// Requirements every accepted bundle must meet, all of them
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub artifact: ArtifactDigest,
    pub identity: CertificateIdentity,
}

/// Build the policy for an image descriptor
pub fn build_policy(descriptor: &Descriptor, options: &PolicyOptions) -> Result<VerificationPolicy> {
    let (algorithm, bytes) = descriptor
        .digest
        .decode()
        .map_err(|e| Error::Policy(format!("invalid artifact digest: {}", e)))?;

    if options.issuer.is_empty() {
        return Err(Error::Policy("issuer must not be empty".to_string()));
    }
    let subject = SubjectMatcher::new(&options.subject)?;
    tracing::debug!(
        digest = %descriptor.digest,
        issuer = %options.issuer,
        subject = %subject,
        "built verification policy"
    );

    Ok(VerificationPolicy {
        artifact: ArtifactDigest { algorithm, bytes },
        identity: CertificateIdentity {
            issuer: options.issuer.clone(),
            subject,
        },
    })
}
