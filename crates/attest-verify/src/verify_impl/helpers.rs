//! Certificate helpers for verification
//!
//! Parsing, chain building against the trusted root, the code-signing
//! profile checks and extraction of the signer identity recorded by the
//! certificate authority.

use super::crypto::{hash_from_signature_oid, VerificationKey};
use crate::error::{Error, Result};
use attest_trust_root::{CertificateAuthority, TrustedRoot};
use chrono::{DateTime, Utc};
use const_oid::db::rfc5280::{ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_CE_SUBJECT_ALT_NAME};
use const_oid::db::rfc5912::{ID_KP_CODE_SIGNING, ID_KP_TIME_STAMPING};
use const_oid::ObjectIdentifier;
use serde::Serialize;
use x509_cert::der::asn1::Utf8StringRef;
use x509_cert::der::{Decode, Encode, Reader, SliceReader};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages, SubjectAltName};
use x509_cert::time::Time;
use x509_cert::Certificate;

/// OIDC issuer, DER UTF8String (v2 extension)
pub const OIDC_ISSUER_V2_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.8");

/// OIDC issuer, raw UTF-8 bytes (deprecated v1 extension)
pub const OIDC_ISSUER_V1_OID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.57264.1.1");

/// A certificate together with the DER it was parsed from
///
/// Signatures cover the original TBS bytes, so the encoding is kept rather
/// than re-serialized.
#[derive(Debug, Clone)]
pub struct ParsedCertificate {
    pub der: Vec<u8>,
    pub cert: Certificate,
}

impl ParsedCertificate {
    pub fn parse(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Verification(format!("failed to parse certificate: {}", e)))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    pub fn not_before(&self) -> Result<DateTime<Utc>> {
        to_datetime(&self.cert.tbs_certificate.validity.not_before)
    }

    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        to_datetime(&self.cert.tbs_certificate.validity.not_after)
    }

    pub fn public_key(&self) -> Result<VerificationKey> {
        VerificationKey::from_certificate(&self.cert)
    }

    /// Check that `self` was signed by `issuer`'s key
    pub fn verify_issued_by(&self, issuer: &ParsedCertificate) -> Result<()> {
        if self.cert.tbs_certificate.issuer != issuer.cert.tbs_certificate.subject {
            return Err(Error::Verification(format!(
                "certificate issuer {} does not match {}",
                self.cert.tbs_certificate.issuer, issuer.cert.tbs_certificate.subject
            )));
        }

        let signature = self.cert.signature.as_bytes().ok_or_else(|| {
            Error::Verification("certificate signature has unused bits".to_string())
        })?;
        let tbs_der = extract_tbs_der(&self.der)?;
        let key = issuer.public_key()?;
        let hash = hash_from_signature_oid(&self.cert.signature_algorithm.oid)?
            .unwrap_or_else(|| key.default_hash());

        key.verify(hash, &tbs_der, signature).map_err(|_| {
            Error::Verification(format!(
                "certificate signature by {} does not verify",
                issuer.cert.tbs_certificate.subject
            ))
        })
    }
}

/// Time check shared by every certificate in a chain
pub fn validate_certificate_time(time: DateTime<Utc>, cert: &ParsedCertificate) -> Result<()> {
    let not_before = cert.not_before()?;
    let not_after = cert.not_after()?;
    if time < not_before {
        return Err(Error::Verification(format!(
            "certificate not yet valid: {} is before not_before {}",
            time, not_before
        )));
    }
    if time > not_after {
        return Err(Error::Verification(format!(
            "certificate has expired: {} is after not_after {}",
            time, not_after
        )));
    }
    Ok(())
}

fn to_datetime(time: &Time) -> Result<DateTime<Utc>> {
    let secs = i64::try_from(time.to_unix_duration().as_secs())
        .map_err(|_| Error::Verification("certificate time out of range".to_string()))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::Verification("certificate time out of range".to_string()))
}

/// Parse the certificate chain of an authority from the trusted root
pub fn authority_chain(authority: &CertificateAuthority) -> Result<Vec<ParsedCertificate>> {
    let chain = authority
        .certificates()
        .map(|der| ParsedCertificate::parse(der.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    if chain.is_empty() {
        return Err(Error::Verification(format!(
            "certificate authority {} has an empty chain",
            authority.uri
        )));
    }
    Ok(chain)
}

/// Check that every link of `chain` is signed by its successor
///
/// A self-issued final certificate must also verify under its own key.
pub fn verify_chain_links(chain: &[ParsedCertificate]) -> Result<()> {
    for pair in chain.windows(2) {
        pair[0].verify_issued_by(&pair[1])?;
    }
    if let Some(root) = chain.last() {
        if root.cert.tbs_certificate.issuer == root.cert.tbs_certificate.subject {
            root.verify_issued_by(root)?;
        }
    }
    Ok(())
}

/// Verify the signing certificate chains to a certificate authority
///
/// Every time in `times` must fall inside the authority's validity window and
/// the validity of each chain certificate.
pub fn verify_certificate_chain(
    leaf: &ParsedCertificate,
    times: &[DateTime<Utc>],
    trusted_root: &TrustedRoot,
) -> Result<()> {
    if trusted_root.certificate_authorities.is_empty() {
        return Err(Error::Verification(
            "no certificate authorities in trusted root".to_string(),
        ));
    }

    let mut last_error = None;
    for authority in &trusted_root.certificate_authorities {
        match verify_against_authority(leaf, times, authority) {
            Ok(()) => {
                tracing::debug!(authority = %authority.uri, "signing certificate chains to authority");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(authority = %authority.uri, error = %e, "authority rejected");
                last_error = Some(e);
            }
        }
    }

    Err(Error::Verification(format!(
        "certificate does not chain to any trusted authority: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

fn verify_against_authority(
    leaf: &ParsedCertificate,
    times: &[DateTime<Utc>],
    authority: &CertificateAuthority,
) -> Result<()> {
    let chain = authority_chain(authority)?;
    leaf.verify_issued_by(&chain[0])?;
    verify_chain_links(&chain)?;

    for time in times {
        if !authority.is_valid_at(*time) {
            return Err(Error::Verification(format!(
                "{} is outside the validity of authority {}",
                time, authority.uri
            )));
        }
        for cert in &chain {
            validate_certificate_time(*time, cert)?;
        }
    }
    Ok(())
}

/// Check the signing certificate is fit for code signing
///
/// KeyUsage must contain digitalSignature and ExtendedKeyUsage must contain
/// codeSigning.
pub fn verify_x509_profile(cert: &ParsedCertificate) -> Result<()> {
    verify_key_usage(cert, ID_KP_CODE_SIGNING, "codeSigning")
}

/// Same as [`verify_x509_profile`] for timestamp authority certificates
pub fn verify_tsa_profile(cert: &ParsedCertificate) -> Result<()> {
    verify_key_usage(cert, ID_KP_TIME_STAMPING, "timeStamping")
}

fn verify_key_usage(
    cert: &ParsedCertificate,
    purpose: ObjectIdentifier,
    purpose_name: &str,
) -> Result<()> {
    let extensions = cert
        .cert
        .tbs_certificate
        .extensions
        .as_ref()
        .ok_or_else(|| Error::Verification("certificate has no extensions".to_string()))?;

    let key_usage_ext = extensions
        .iter()
        .find(|ext| ext.extn_id == ID_CE_KEY_USAGE)
        .ok_or_else(|| {
            Error::Verification("certificate is missing KeyUsage extension".to_string())
        })?;
    let key_usage = KeyUsage::from_der(key_usage_ext.extn_value.as_bytes())
        .map_err(|e| Error::Verification(format!("failed to parse KeyUsage extension: {}", e)))?;
    if !key_usage.0.contains(KeyUsages::DigitalSignature) {
        return Err(Error::Verification(
            "KeyUsage extension does not contain digitalSignature".to_string(),
        ));
    }

    let eku_ext = extensions
        .iter()
        .find(|ext| ext.extn_id == ID_CE_EXT_KEY_USAGE)
        .ok_or_else(|| {
            Error::Verification("certificate is missing ExtendedKeyUsage extension".to_string())
        })?;
    let eku = ExtendedKeyUsage::from_der(eku_ext.extn_value.as_bytes()).map_err(|e| {
        Error::Verification(format!("failed to parse ExtendedKeyUsage extension: {}", e))
    })?;
    if !eku.0.contains(&purpose) {
        return Err(Error::Verification(format!(
            "ExtendedKeyUsage extension does not contain {}",
            purpose_name
        )));
    }
    Ok(())
}

/// Identity claims a signing certificate carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignerIdentity {
    pub issuer: Option<String>,
    /// URI and email subject alternative names
    pub sans: Vec<String>,
}

pub fn extract_identity(cert: &ParsedCertificate) -> Result<SignerIdentity> {
    let mut identity = SignerIdentity {
        issuer: None,
        sans: Vec::new(),
    };
    let Some(extensions) = cert.cert.tbs_certificate.extensions.as_ref() else {
        return Ok(identity);
    };

    let mut legacy_issuer = None;
    for ext in extensions {
        if ext.extn_id == ID_CE_SUBJECT_ALT_NAME {
            let san = SubjectAltName::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                Error::Verification(format!("failed to parse SubjectAltName extension: {}", e))
            })?;
            for name in san.0 {
                match name {
                    GeneralName::UniformResourceIdentifier(uri) => {
                        identity.sans.push(uri.to_string())
                    }
                    GeneralName::Rfc822Name(email) => identity.sans.push(email.to_string()),
                    _ => {}
                }
            }
        } else if ext.extn_id == OIDC_ISSUER_V2_OID {
            let issuer = Utf8StringRef::from_der(ext.extn_value.as_bytes()).map_err(|e| {
                Error::Verification(format!("failed to parse OIDC issuer extension: {}", e))
            })?;
            identity.issuer = Some(issuer.as_str().to_string());
        } else if ext.extn_id == OIDC_ISSUER_V1_OID {
            legacy_issuer = std::str::from_utf8(ext.extn_value.as_bytes())
                .ok()
                .map(str::to_string);
        }
    }

    if identity.issuer.is_none() {
        identity.issuer = legacy_issuer;
    }
    Ok(identity)
}

/// Extract the original TBS certificate DER bytes from a certificate
fn extract_tbs_der(cert_der: &[u8]) -> Result<Vec<u8>> {
    let der_error = |e: x509_cert::der::Error| {
        Error::Verification(format!("failed to extract TBS certificate bytes: {}", e))
    };

    let mut reader = SliceReader::new(cert_der).map_err(der_error)?;
    let outer = x509_cert::der::Header::decode(&mut reader).map_err(der_error)?;
    let contents = reader.read_slice(outer.length).map_err(der_error)?;

    let mut tbs_reader = SliceReader::new(contents).map_err(der_error)?;
    let tbs_header = x509_cert::der::Header::decode(&mut tbs_reader).map_err(der_error)?;
    let header_len: usize = tbs_header
        .encoded_len()
        .map_err(der_error)?
        .try_into()
        .map_err(|_| Error::Verification("TBS header length too large".to_string()))?;
    let body_len: usize = tbs_header
        .length
        .try_into()
        .map_err(|_| Error::Verification("TBS body length too large".to_string()))?;
    let total = header_len
        .checked_add(body_len)
        .ok_or_else(|| Error::Verification("TBS length calculation overflow".to_string()))?;

    contents
        .get(..total)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::Verification("TBS length exceeds certificate contents".to_string()))
}
