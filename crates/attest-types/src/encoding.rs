//! Serde helpers for the protobuf-JSON encodings used by Sigstore documents

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

/// Standard base64 for `Vec<u8>` fields
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Standard base64 for `Vec<Vec<u8>>` fields such as Merkle proof hashes
pub mod base64_bytes_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(deserializer)?;
        items
            .iter()
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Protobuf int64 values: written as strings, read from strings or numbers
pub mod string_i64 {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
            StringOrNumber::Number(n) => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(with = "super::string_i64")]
        index: i64,
        #[serde(with = "super::base64_bytes")]
        raw: Vec<u8>,
    }

    #[test]
    fn test_int64_accepts_string_and_number() {
        let a: Sample = serde_json::from_str(r#"{"index":"42","raw":"AQI="}"#).unwrap();
        let b: Sample = serde_json::from_str(r#"{"index":42,"raw":"AQI="}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.raw, vec![1, 2]);
    }

    #[test]
    fn test_int64_serializes_as_string() {
        let json = serde_json::to_string(&Sample {
            index: 7,
            raw: vec![],
        })
        .unwrap();
        assert_eq!(json, r#"{"index":"7","raw":""}"#);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(serde_json::from_str::<Sample>(r#"{"index":1,"raw":"!!"}"#).is_err());
    }
}
