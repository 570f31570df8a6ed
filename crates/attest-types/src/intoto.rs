//! In-toto attestation statements
//!
//! A statement binds a predicate (for example a SLSA provenance document) to
//! the artifacts it describes. Container attestations carry one statement per
//! DSSE envelope, with the image manifest digest as a subject.
//!
//! Specification: https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md

use crate::digest::HashAlgorithm;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// DSSE payload type of in-toto statements
pub const INTOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// Statement `_type` of the v1 statement layer
pub const INTOTO_STATEMENT_V1: &str = "https://in-toto.io/Statement/v1";

/// In-toto statement (v0.1 and v1 share this shape)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    #[serde(rename = "_type")]
    pub type_: String,
    pub subject: Vec<Subject>,
    pub predicate_type: String,
    #[serde(default)]
    pub predicate: serde_json::Value,
}

/// An artifact the statement is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub name: String,
    /// Digest set, algorithm name to lowercase hex
    pub digest: BTreeMap<String, String>,
}

impl Statement {
    /// Parse a statement from a DSSE payload
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let statement: Statement = serde_json::from_slice(payload)?;
        if statement.predicate_type.is_empty() {
            return Err(Error::InvalidStatement(
                "statement has an empty predicateType".to_string(),
            ));
        }
        Ok(statement)
    }

    /// Check if any subject carries the given digest
    pub fn has_subject_digest(&self, algorithm: HashAlgorithm, digest: &[u8]) -> bool {
        let expected = hex::encode(digest);
        self.subject.iter().any(|subject| {
            subject
                .digest
                .get(algorithm.oci_name())
                .is_some_and(|h| h.eq_ignore_ascii_case(&expected))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement_json(digest: &str) -> String {
        format!(
            r#"{{
                "_type": "https://in-toto.io/Statement/v1",
                "subject": [
                    {{"name": "ghcr.io/org/demo", "digest": {{"sha256": "{}"}}}}
                ],
                "predicateType": "https://slsa.dev/provenance/v1",
                "predicate": {{"buildDefinition": {{}}}}
            }}"#,
            digest
        )
    }

    #[test]
    fn test_statement_from_payload() {
        let json = statement_json(&"ab".repeat(32));
        let statement = Statement::from_payload(json.as_bytes()).unwrap();
        assert_eq!(statement.type_, INTOTO_STATEMENT_V1);
        assert_eq!(statement.predicate_type, "https://slsa.dev/provenance/v1");
        assert_eq!(statement.subject[0].name, "ghcr.io/org/demo");
    }

    #[test]
    fn test_statement_rejects_garbage() {
        assert!(Statement::from_payload(b"not json").is_err());
        assert!(Statement::from_payload(br#"{"_type":"x","subject":[],"predicateType":""}"#).is_err());
    }

    #[test]
    fn test_has_subject_digest() {
        let json = statement_json(&"AB".repeat(32));
        let statement = Statement::from_payload(json.as_bytes()).unwrap();

        assert!(statement.has_subject_digest(HashAlgorithm::Sha256, &[0xab; 32]));
        assert!(!statement.has_subject_digest(HashAlgorithm::Sha256, &[0xac; 32]));
        assert!(!statement.has_subject_digest(HashAlgorithm::Sha512, &[0xab; 32]));
    }
}
