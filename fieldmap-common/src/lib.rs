//! # Fieldmap Common Library
//!
//! Shared code for the fieldmap territory service:
//! - Error types
//! - Configuration loading
//! - Place/street name normalization
//! - Geographic primitives (bounding box, GeoJSON)

pub mod config;
pub mod error;
pub mod geo;
pub mod normalize;

pub use error::{Error, Result};
pub use geo::BoundingBox;
