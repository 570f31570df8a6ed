//! Public keys, signature checks and digests
//!
//! Keys arrive as X.509 SubjectPublicKeyInfo, either inside a certificate or
//! as raw bytes from the trusted root. Message-signature bundles only carry
//! the artifact digest, so those signatures are checked over the imported
//! digest rather than the message.

use crate::error::{Error, Result};
use attest_types::HashAlgorithm;
use aws_lc_rs::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, ECDSA_WITH_SHA_512, ID_EC_PUBLIC_KEY, ID_SHA_256,
    ID_SHA_384, ID_SHA_512, RSA_ENCRYPTION, SECP_256_R_1, SECP_384_R_1,
    SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::db::rfc8410::ID_ED_25519;
use const_oid::ObjectIdentifier;
use x509_cert::der::Decode;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::Certificate;

/// Key types accepted for signing certificates, logs and timestamp authorities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    EcdsaP256,
    EcdsaP384,
    Ed25519,
    Rsa,
}

/// A public key ready for signature verification
#[derive(Debug, Clone)]
pub struct VerificationKey {
    algorithm: KeyAlgorithm,
    /// Contents of the SPKI bit string
    key: Vec<u8>,
}

impl VerificationKey {
    /// Parse a DER-encoded SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        let spki = SubjectPublicKeyInfoOwned::from_der(der)
            .map_err(|e| Error::Verification(format!("failed to parse public key: {}", e)))?;
        Self::from_spki(&spki)
    }

    pub fn from_spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let oid = spki.algorithm.oid;
        let algorithm = if oid == ID_EC_PUBLIC_KEY {
            let params = spki.algorithm.parameters.as_ref().ok_or_else(|| {
                Error::Verification("EC public key missing curve parameters".to_string())
            })?;
            let curve = ObjectIdentifier::from_bytes(params.value())
                .map_err(|e| Error::Verification(format!("failed to parse EC curve OID: {}", e)))?;
            if curve == SECP_256_R_1 {
                KeyAlgorithm::EcdsaP256
            } else if curve == SECP_384_R_1 {
                KeyAlgorithm::EcdsaP384
            } else {
                return Err(Error::Unsupported(format!("EC curve {}", curve)));
            }
        } else if oid == ID_ED_25519 {
            KeyAlgorithm::Ed25519
        } else if oid == RSA_ENCRYPTION {
            KeyAlgorithm::Rsa
        } else {
            return Err(Error::Unsupported(format!("public key algorithm {}", oid)));
        };

        let key = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| Error::Verification("public key has unused bits".to_string()))?
            .to_vec();
        Ok(Self { algorithm, key })
    }

    /// Key of a certificate's subject
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        Self::from_spki(&cert.tbs_certificate.subject_public_key_info)
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Hash conventionally paired with this key
    pub fn default_hash(&self) -> HashAlgorithm {
        match self.algorithm {
            KeyAlgorithm::EcdsaP384 => HashAlgorithm::Sha384,
            _ => HashAlgorithm::Sha256,
        }
    }

    fn verification_algorithm(&self, hash: HashAlgorithm) -> &'static dyn VerificationAlgorithm {
        match (self.algorithm, hash) {
            (KeyAlgorithm::EcdsaP256, HashAlgorithm::Sha256) => &signature::ECDSA_P256_SHA256_ASN1,
            (KeyAlgorithm::EcdsaP256, HashAlgorithm::Sha384) => &signature::ECDSA_P256_SHA384_ASN1,
            (KeyAlgorithm::EcdsaP256, HashAlgorithm::Sha512) => &signature::ECDSA_P256_SHA512_ASN1,
            (KeyAlgorithm::EcdsaP384, HashAlgorithm::Sha256) => &signature::ECDSA_P384_SHA256_ASN1,
            (KeyAlgorithm::EcdsaP384, HashAlgorithm::Sha384) => &signature::ECDSA_P384_SHA384_ASN1,
            (KeyAlgorithm::EcdsaP384, HashAlgorithm::Sha512) => &signature::ECDSA_P384_SHA512_ASN1,
            (KeyAlgorithm::Ed25519, _) => &signature::ED25519,
            (KeyAlgorithm::Rsa, HashAlgorithm::Sha256) => &signature::RSA_PKCS1_2048_8192_SHA256,
            (KeyAlgorithm::Rsa, HashAlgorithm::Sha384) => &signature::RSA_PKCS1_2048_8192_SHA384,
            (KeyAlgorithm::Rsa, HashAlgorithm::Sha512) => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }

    /// Verify `signature` over `message` hashed with `hash`
    ///
    /// Ed25519 ignores `hash`: the scheme fixes its own.
    pub fn verify(&self, hash: HashAlgorithm, message: &[u8], signature: &[u8]) -> Result<()> {
        UnparsedPublicKey::new(self.verification_algorithm(hash), &self.key)
            .verify(message, signature)
            .map_err(|_| Error::Verification("signature does not verify".to_string()))
    }

    /// Verify with the key's conventional hash
    pub fn verify_default(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        self.verify(self.default_hash(), message, signature)
    }

    /// Verify a signature over an already computed `hash` digest
    pub fn verify_prehashed(&self, hash: HashAlgorithm, digest: &[u8], signature: &[u8]) -> Result<()> {
        if self.algorithm == KeyAlgorithm::Ed25519 {
            return Err(Error::Unsupported(
                "prehashed verification with Ed25519 keys".to_string(),
            ));
        }
        let digest = aws_lc_rs::digest::Digest::import_less_safe(digest, digest_algorithm(hash))
            .map_err(|_| {
                Error::Verification(format!("{:?} digest has {} bytes", hash, digest.len()))
            })?;
        UnparsedPublicKey::new(self.verification_algorithm(hash), &self.key)
            .verify_digest(&digest, signature)
            .map_err(|_| Error::Verification("signature does not verify".to_string()))
    }
}

fn digest_algorithm(hash: HashAlgorithm) -> &'static aws_lc_rs::digest::Algorithm {
    match hash {
        HashAlgorithm::Sha256 => &aws_lc_rs::digest::SHA256,
        HashAlgorithm::Sha384 => &aws_lc_rs::digest::SHA384,
        HashAlgorithm::Sha512 => &aws_lc_rs::digest::SHA512,
    }
}

/// Digest of `data`
pub fn digest(hash: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    aws_lc_rs::digest::digest(digest_algorithm(hash), data).as_ref().to_vec()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(aws_lc_rs::digest::digest(&aws_lc_rs::digest::SHA256, data).as_ref());
    out
}

/// Hash named by a digest algorithm identifier
pub fn hash_from_digest_oid(oid: &ObjectIdentifier) -> Result<HashAlgorithm> {
    if *oid == ID_SHA_256 {
        Ok(HashAlgorithm::Sha256)
    } else if *oid == ID_SHA_384 {
        Ok(HashAlgorithm::Sha384)
    } else if *oid == ID_SHA_512 {
        Ok(HashAlgorithm::Sha512)
    } else {
        Err(Error::Unsupported(format!("digest algorithm {}", oid)))
    }
}

/// Hash named by a signature algorithm identifier, `None` for Ed25519
pub fn hash_from_signature_oid(oid: &ObjectIdentifier) -> Result<Option<HashAlgorithm>> {
    if *oid == ECDSA_WITH_SHA_256 || *oid == SHA_256_WITH_RSA_ENCRYPTION {
        Ok(Some(HashAlgorithm::Sha256))
    } else if *oid == ECDSA_WITH_SHA_384 || *oid == SHA_384_WITH_RSA_ENCRYPTION {
        Ok(Some(HashAlgorithm::Sha384))
    } else if *oid == ECDSA_WITH_SHA_512 || *oid == SHA_512_WITH_RSA_ENCRYPTION {
        Ok(Some(HashAlgorithm::Sha512))
    } else if *oid == ID_ED_25519 {
        Ok(None)
    } else {
        Err(Error::Unsupported(format!("signature algorithm {}", oid)))
    }
}
