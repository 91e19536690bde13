//! Pipeline-internal data models

pub mod candidate;

pub use candidate::AddressCandidate;
