//! Geographic primitives: bounding boxes and the persisted GeoJSON shapes

use serde::{Deserialize, Serialize};

/// Axis-aligned latitude/longitude rectangle.
///
/// Always canonical: `min_lat <= max_lat` and `min_lng <= max_lng`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Build a bounding box from two corners given in arbitrary order,
    /// swapping each axis independently so min <= max.
    pub fn from_corners(a_lat: f64, a_lng: f64, b_lat: f64, b_lng: f64) -> Self {
        let (min_lat, max_lat) = if a_lat <= b_lat {
            (a_lat, b_lat)
        } else {
            (b_lat, a_lat)
        };
        let (min_lng, max_lng) = if a_lng <= b_lng {
            (a_lng, b_lng)
        } else {
            (b_lng, a_lng)
        };

        Self {
            min_lat,
            min_lng,
            max_lat,
            max_lng,
        }
    }

    /// Overpass bbox literal: `"minLat,minLng,maxLat,maxLng"`
    pub fn overpass_literal(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lat, self.min_lng, self.max_lat, self.max_lng
        )
    }
}

/// GeoJSON FeatureCollection as persisted for street geometry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub collection_type: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            collection_type: "FeatureCollection".to_string(),
            features,
        }
    }
}

/// GeoJSON Feature wrapping one street LineString
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub properties: FeatureProperties,
    pub geometry: LineString,
}

impl Feature {
    /// LineString feature with `coordinates` as `[lon, lat]` pairs
    /// (standard GeoJSON ordering).
    pub fn line_string(name: String, osm_id: Option<i64>, coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            feature_type: "Feature".to_string(),
            properties: FeatureProperties { name, osm_id },
            geometry: LineString {
                geometry_type: "LineString".to_string(),
                coordinates,
            },
        }
    }
}

/// Properties carried by each street feature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureProperties {
    pub name: String,
    pub osm_id: Option<i64>,
}

/// GeoJSON LineString geometry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineString {
    #[serde(rename = "type")]
    pub geometry_type: String,
    pub coordinates: Vec<[f64; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_swaps_each_axis_independently() {
        // Reversed lat, reversed lng
        let bbox = BoundingBox::from_corners(45.6, -73.5, 45.5, -73.6);
        assert_eq!(bbox, BoundingBox::from_corners(45.5, -73.6, 45.6, -73.5));
        assert_eq!(bbox.min_lat, 45.5);
        assert_eq!(bbox.max_lat, 45.6);
        assert_eq!(bbox.min_lng, -73.6);
        assert_eq!(bbox.max_lng, -73.5);
    }

    #[test]
    fn overpass_literal_is_min_lat_first() {
        let bbox = BoundingBox::from_corners(45.5, -73.6, 45.6, -73.5);
        assert_eq!(bbox.overpass_literal(), "45.5,-73.6,45.6,-73.5");
    }

    #[test]
    fn feature_collection_serializes_geojson_type_tags() {
        let collection = FeatureCollection::new(vec![Feature::line_string(
            "Oak Street".to_string(),
            Some(42),
            vec![[-73.6, 45.5], [-73.59, 45.51]],
        )]);

        let json = serde_json::to_value(&collection).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"][0]["type"], "Feature");
        assert_eq!(json["features"][0]["geometry"]["type"], "LineString");
        // [lon, lat] ordering
        assert_eq!(json["features"][0]["geometry"]["coordinates"][0][0], -73.6);
        assert_eq!(json["features"][0]["geometry"]["coordinates"][0][1], 45.5);
        assert_eq!(json["features"][0]["properties"]["osm_id"], 42);
    }
}
