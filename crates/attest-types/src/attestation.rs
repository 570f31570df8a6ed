//! Bundles as they move through a verification run

use crate::bundle::Bundle;
use crate::intoto::Statement;

/// A fetched bundle and, once parsed, the statement inside it
///
/// `statement` is `None` until a stage parses the DSSE payload. Bundles that
/// pass an empty predicate filter keep `None`; that is a distinct state, not
/// a parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationBundle {
    pub bundle: Bundle,
    pub statement: Option<Statement>,
}

impl AttestationBundle {
    pub fn new(bundle: Bundle) -> Self {
        Self {
            bundle,
            statement: None,
        }
    }
}

impl From<Bundle> for AttestationBundle {
    fn from(bundle: Bundle) -> Self {
        Self::new(bundle)
    }
}
