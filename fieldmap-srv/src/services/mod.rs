//! Pipeline services: parsing, geocoding, spatial lookup, reconciliation

pub mod geocoder;
pub mod overpass;
pub mod reconciler;
pub mod scan_parser;
pub mod street_cache;
