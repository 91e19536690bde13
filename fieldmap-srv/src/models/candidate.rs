//! Ephemeral address candidate
//!
//! Produced by the scan parser or the street lookup, consumed once by the
//! import reconciler. Never persisted as its own entity: a candidate either
//! becomes an address row or is discarded.

use serde::{Deserialize, Serialize};

/// A not-yet-persisted address fragment.
///
/// Every field is optional; the reconciler discards candidates whose
/// street and label are both empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AddressCandidate {
    pub civic_number: Option<String>,
    pub street: Option<String>,
    pub label: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}
