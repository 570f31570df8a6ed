//! Content digests and OCI content descriptors

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Hash algorithms that may identify content or sign it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA2_256")]
    Sha256,
    #[serde(rename = "SHA2_384")]
    Sha384,
    #[serde(rename = "SHA2_512")]
    Sha512,
}

impl HashAlgorithm {
    /// Name used in OCI digests and in-toto digest sets
    pub fn oci_name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Output length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" | "SHA2_256" => Ok(HashAlgorithm::Sha256),
            "sha384" | "SHA2_384" => Ok(HashAlgorithm::Sha384),
            "sha512" | "SHA2_512" => Ok(HashAlgorithm::Sha512),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.oci_name())
    }
}

/// An OCI content digest, `<algorithm>:<encoded>`
///
/// Parsing only checks the grammar of the digest string. Registries may carry
/// algorithms this crate cannot compute, so the encoded value is validated
/// separately by [`Digest::decode`] when raw bytes are needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    /// Build a digest from an algorithm and raw hash bytes
    pub fn from_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm: algorithm.oci_name().to_string(),
            encoded: hex::encode(bytes),
        }
    }

    /// Algorithm component as written
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Encoded component as written
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// Resolve the algorithm component to a supported hash algorithm
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm> {
        self.algorithm.parse()
    }

    /// Decode the encoded component into raw bytes keyed to its algorithm
    pub fn decode(&self) -> Result<(HashAlgorithm, Vec<u8>)> {
        let algorithm = self.hash_algorithm()?;
        let bytes = hex::decode(&self.encoded)
            .map_err(|e| Error::InvalidDigest(format!("{}: {}", self, e)))?;
        if bytes.len() != algorithm.digest_len() {
            return Err(Error::InvalidDigest(format!(
                "{}: expected {} bytes for {}, got {}",
                self,
                algorithm.digest_len(),
                algorithm,
                bytes.len()
            )));
        }
        Ok((algorithm, bytes))
    }

    /// Tag used by the OCI referrers tag schema, `<algorithm>-<encoded>`
    pub fn referrers_tag(&self) -> String {
        format!("{}-{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidDigest(format!("missing ':' in {:?}", s)))?;

        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c));
        let encoded_ok = !encoded.is_empty()
            && encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "=_-".contains(c));
        if !algorithm_ok || !encoded_ok {
            return Err(Error::InvalidDigest(s.to_string()));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            encoded: encoded.to_string(),
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An OCI content descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: i64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            artifact_type: None,
            annotations: None,
        }
    }
}
