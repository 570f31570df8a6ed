//! Narrowing bundles to one attestation kind

use attest_types::{AttestationBundle, Statement, INTOTO_PAYLOAD_TYPE};

/// Keep the bundles whose statement carries `predicate_type`
///
/// An empty `predicate_type` returns the input unchanged and leaves every
/// statement unparsed. Otherwise bundles without an in-toto DSSE payload, or
/// whose payload does not parse, are dropped; the survivors carry their
/// parsed statement. The comparison is exact and case-sensitive.
pub fn filter_by_predicate_type(
    bundles: Vec<AttestationBundle>,
    predicate_type: &str,
) -> Vec<AttestationBundle> {
    if predicate_type.is_empty() {
        return bundles;
    }

    bundles
        .into_iter()
        .filter_map(|mut candidate| {
            let envelope = candidate.bundle.dsse_envelope()?;
            if envelope.payload_type != INTOTO_PAYLOAD_TYPE {
                tracing::debug!(payload_type = %envelope.payload_type, "dropping bundle with non in-toto payload");
                return None;
            }

            let statement = match Statement::from_payload(&envelope.payload) {
                Ok(statement) => statement,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping bundle with unparseable statement");
                    return None;
                }
            };
            if statement.predicate_type != predicate_type {
                tracing::debug!(found = %statement.predicate_type, wanted = predicate_type, "predicate type mismatch");
                return None;
            }

            candidate.statement = Some(statement);
            Some(candidate)
        })
        .collect()
}
