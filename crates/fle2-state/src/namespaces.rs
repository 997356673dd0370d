use serde::{Deserialize, Serialize};

const STATE_COLLECTION_PREFIX: &str = "enxcol_";

/// Names of the state collections that back one encrypted data collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateCollectionNamespaces {
    pub edc: String,
    pub esc: String,
    pub ecc: String,
    pub ecoc: String,
}

impl StateCollectionNamespaces {
    /// Default names: `enxcol_.<edc>.esc`, `.ecc`, `.ecoc`.
    #[must_use]
    pub fn for_edc(edc: &str) -> Self {
        let base = format!("{STATE_COLLECTION_PREFIX}.{edc}");
        Self {
            edc: edc.to_owned(),
            esc: format!("{base}.esc"),
            ecc: format!("{base}.ecc"),
            ecoc: format!("{base}.ecoc"),
        }
    }
}
