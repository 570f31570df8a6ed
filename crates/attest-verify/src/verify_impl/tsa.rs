//! RFC 3161 signed timestamp verification
//!
//! A timestamp token is CMS `SignedData` over a `TSTInfo` whose message
//! imprint is the hash of the bundle signature. The token must be signed by
//! a timestamp authority from the trusted root, and the time it asserts must
//! fall inside that authority's validity.

use super::crypto::{digest, hash_from_digest_oid, hash_from_signature_oid};
use super::helpers::{
    authority_chain, validate_certificate_time, verify_chain_links, verify_tsa_profile,
};
use crate::error::{Error, Result};
use attest_trust_root::{CertificateAuthority, TrustedRoot};
use chrono::{DateTime, Utc};
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerInfo};
use const_oid::db::rfc5911::{ID_CONTENT_TYPE, ID_MESSAGE_DIGEST, ID_SIGNED_DATA};
use const_oid::ObjectIdentifier;
use der::asn1::{GeneralizedTime, OctetString};
use der::{Decode, Encode};
use x509_tsp::{TimeStampResp, TstInfo};

/// id-ct-TSTInfo
pub const ID_CT_TST_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.1.4");

/// `granted` and `grantedWithMods`; every other PKIStatus carries no token
const MAX_GRANTED_STATUS: u8 = 1;

fn gen_time_utc(time: &GeneralizedTime) -> Result<DateTime<Utc>> {
    let since_epoch = time.to_unix_duration();
    i64::try_from(since_epoch.as_secs())
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, since_epoch.subsec_nanos()))
        .ok_or_else(|| Error::Verification(format!("TSTInfo genTime {:?} is out of range", time)))
}

/// Accept either a full `TimeStampResp` or a bare token
fn parse_token(bytes: &[u8]) -> Result<ContentInfo> {
    match TimeStampResp::from_der(bytes) {
        Ok(resp) => {
            let status = resp.status.status as u8;
            if status > MAX_GRANTED_STATUS {
                return Err(Error::Verification(format!(
                    "timestamp response has status {}",
                    status
                )));
            }
            resp.time_stamp_token.ok_or_else(|| {
                Error::Verification("timestamp response carries no token".to_string())
            })
        }
        Err(_) => ContentInfo::from_der(bytes).map_err(|e| {
            Error::Verification(format!("failed to parse timestamp token: {}", e))
        }),
    }
}

/// Verify a signed timestamp over `signature` and return the time it asserts
pub fn verify_timestamp(
    timestamp: &[u8],
    signature: &[u8],
    trusted_root: &TrustedRoot,
) -> Result<DateTime<Utc>> {
    let token = parse_token(timestamp)?;
    if token.content_type != ID_SIGNED_DATA {
        return Err(Error::Verification(format!(
            "timestamp token has content type {}",
            token.content_type
        )));
    }
    let signed_data: SignedData = token.content.decode_as()?;

    let encap = &signed_data.encap_content_info;
    if encap.econtent_type != ID_CT_TST_INFO {
        return Err(Error::Verification(format!(
            "timestamp token encapsulates {}",
            encap.econtent_type
        )));
    }
    let econtent = encap
        .econtent
        .as_ref()
        .ok_or_else(|| Error::Verification("timestamp token has no content".to_string()))?
        .decode_as::<OctetString>()?;
    let tst_info = TstInfo::from_der(econtent.as_bytes())?;
    let gen_time = gen_time_utc(&tst_info.gen_time)?;

    let imprint = &tst_info.message_imprint;
    let imprint_hash = hash_from_digest_oid(&imprint.hash_algorithm.oid)?;
    if digest(imprint_hash, signature) != imprint.hashed_message.as_bytes() {
        return Err(Error::Verification(
            "timestamp message imprint does not match the bundle signature".to_string(),
        ));
    }

    let signer = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| Error::Verification("timestamp token has no signer".to_string()))?;
    let signed_attrs = check_signed_attributes(signer, econtent.as_bytes())?;

    if trusted_root.timestamp_authorities.is_empty() {
        return Err(Error::Verification(
            "no timestamp authorities in trusted root".to_string(),
        ));
    }
    let mut last_error = None;
    for authority in &trusted_root.timestamp_authorities {
        match verify_with_authority(authority, signer, &signed_attrs, gen_time) {
            Ok(()) => {
                tracing::debug!(authority = %authority.uri, %gen_time, policy = %tst_info.policy, "verified signed timestamp");
                return Ok(gen_time);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(Error::Verification(format!(
        "no trusted timestamp authority verifies the token: {}",
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Check content type and message digest attributes, returning the DER the
/// signature covers
fn check_signed_attributes(signer: &SignerInfo, econtent: &[u8]) -> Result<Vec<u8>> {
    let attrs = signer.signed_attrs.as_ref().ok_or_else(|| {
        Error::Verification("timestamp signer has no signed attributes".to_string())
    })?;

    let mut content_type_ok = false;
    let mut message_digest = None;
    for attr in attrs.iter() {
        let Some(value) = attr.values.iter().next() else {
            continue;
        };
        if attr.oid == ID_CONTENT_TYPE {
            content_type_ok = value.decode_as::<ObjectIdentifier>()? == ID_CT_TST_INFO;
        } else if attr.oid == ID_MESSAGE_DIGEST {
            message_digest = Some(value.decode_as::<OctetString>()?);
        }
    }
    if !content_type_ok {
        return Err(Error::Verification(
            "timestamp content type attribute is missing or wrong".to_string(),
        ));
    }

    let message_digest = message_digest.ok_or_else(|| {
        Error::Verification("timestamp message digest attribute is missing".to_string())
    })?;
    let hash = hash_from_digest_oid(&signer.digest_alg.oid)?;
    if digest(hash, econtent) != message_digest.as_bytes() {
        return Err(Error::Verification(
            "timestamp message digest does not match TSTInfo".to_string(),
        ));
    }

    Ok(attrs.to_der()?)
}

fn verify_with_authority(
    authority: &CertificateAuthority,
    signer: &SignerInfo,
    signed_attrs: &[u8],
    gen_time: DateTime<Utc>,
) -> Result<()> {
    let chain = authority_chain(authority)?;
    let leaf = &chain[0];

    let key = leaf.public_key()?;
    let digest_hash = hash_from_digest_oid(&signer.digest_alg.oid)?;
    // some authorities name the key algorithm instead of a signature algorithm
    let hash = hash_from_signature_oid(&signer.signature_algorithm.oid)
        .ok()
        .flatten()
        .unwrap_or(digest_hash);
    key.verify(hash, signed_attrs, signer.signature.as_bytes())?;

    verify_tsa_profile(leaf)?;
    verify_chain_links(&chain)?;

    if !authority.is_valid_at(gen_time) {
        return Err(Error::Verification(format!(
            "timestamp {} is outside the validity of authority {}",
            gen_time, authority.uri
        )));
    }
    for cert in &chain {
        validate_certificate_time(gen_time, cert)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_types::Bundle;

    fn fixture() -> (Bundle, TrustedRoot) {
        (
            Bundle::from_slice(include_bytes!("../../tests/data/bundle.sigstore.json")).unwrap(),
            TrustedRoot::from_slice(include_bytes!("../../tests/data/trusted_root.json")).unwrap(),
        )
    }

    #[test]
    fn test_fixture_timestamp_verifies() {
        let (bundle, root) = fixture();
        let token = &bundle.rfc3161_timestamps()[0].signed_timestamp;
        let time = verify_timestamp(token, bundle.signature_bytes().unwrap(), &root).unwrap();
        let leaf = super::super::helpers::ParsedCertificate::parse(
            bundle.signing_certificate().unwrap(),
        )
        .unwrap();
        assert!(time >= leaf.not_before().unwrap());
        assert!(time <= leaf.not_after().unwrap());
    }

    #[test]
    fn test_timestamp_over_other_signature_rejected() {
        let (bundle, root) = fixture();
        let token = &bundle.rfc3161_timestamps()[0].signed_timestamp;
        assert!(verify_timestamp(token, b"some other signature", &root).is_err());
    }

    #[test]
    fn test_untrusted_authority_rejected() {
        let (bundle, mut root) = fixture();
        root.timestamp_authorities = root.certificate_authorities.clone();
        let token = &bundle.rfc3161_timestamps()[0].signed_timestamp;
        assert!(verify_timestamp(token, bundle.signature_bytes().unwrap(), &root).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let (bundle, root) = fixture();
        let err = verify_timestamp(b"\x30\x03\x02\x01\x00", bundle.signature_bytes().unwrap(), &root)
            .unwrap_err();
        assert!(matches!(err, Error::Verification(_)));
    }

    #[test]
    fn test_gen_time_conversion() {
        let time = GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(1792195151))
            .unwrap();
        let parsed = gen_time_utc(&time).unwrap();
        assert_eq!(parsed.timestamp(), 1792195151);
        assert_eq!(parsed.to_rfc3339(), "2026-10-16T23:59:11+00:00");
    }

    #[test]
    fn test_rejected_response_has_no_token() {
        // TimeStampResp { status: { status: rejection(2) } }
        let err = parse_token(b"\x30\x05\x30\x03\x02\x01\x02").unwrap_err();
        assert!(err.to_string().contains("status 2"), "{err}");
    }
}
