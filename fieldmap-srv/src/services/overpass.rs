//! Overpass spatial-tag-query client
//!
//! Resolves all address points tagged with a street name inside a bounding
//! box, and fetches street-line geometry for caching. The public Overpass
//! mirrors are independently operated with no SLA, so every query walks a
//! fixed endpoint list in preference order and stops at the first success.
//! Total failure is surfaced as `OverpassError::Unavailable` so callers can
//! distinguish "service down" from "no matches".

use fieldmap_common::geo::{BoundingBox, Feature, FeatureCollection};
use fieldmap_common::normalize::normalize_place_name;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::AddressCandidate;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);
const RETRY_PAUSE: Duration = Duration::from_millis(200);
/// Result cap for one street lookup
pub const MAX_LOOKUP_RESULTS: usize = 500;
/// How much upstream body to carry back in failure detail
const FAILURE_BODY_LIMIT: usize = 500;

/// Overpass client errors
#[derive(Debug, Error)]
pub enum OverpassError {
    /// Every configured endpoint failed or timed out. Carries the last
    /// endpoint's HTTP status and truncated body when one responded at all.
    #[error("All Overpass endpoints failed")]
    Unavailable {
        status: Option<u16>,
        body: Option<String>,
    },
}

/// Caller-supplied fallbacks for tags absent on an element
#[derive(Debug, Default, Clone)]
pub struct LookupHints {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassPayload {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

/// One node/way/relation element from an Overpass response
#[derive(Debug, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<OverpassCenter>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub geometry: Vec<OverpassPoint>,
}

/// Representative center point for way/relation elements
#[derive(Debug, Deserialize)]
pub struct OverpassCenter {
    pub lat: f64,
    pub lon: f64,
}

/// One vertex of a way geometry
#[derive(Debug, Deserialize)]
pub struct OverpassPoint {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Escape regex metacharacters and query-string quoting characters so a
/// street name can be embedded in an Overpass tag-filter regex.
pub fn escape_overpass_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '.' | '\\' | '+' | '*' | '?' | '[' | '^' | ']' | '$' | '(' | ')' | '{' | '}'
            | '=' | '!' | '<' | '>' | '|' | ':' | '-' | '#' | '/' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '"' => {
                escaped.push('\\');
                escaped.push('"');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Map one Overpass element to an address candidate.
///
/// Elements without a house number are skipped outright; coordinates come
/// from the element itself or, for ways/relations, from its center point.
/// City/region/country fall back to the caller's hints when untagged.
pub fn candidate_from_element(
    element: &OverpassElement,
    query_street: &str,
    hints: &LookupHints,
) -> Option<AddressCandidate> {
    let house_number = element.tags.get("addr:housenumber")?;
    if house_number.is_empty() {
        return None;
    }

    let (lat, lng) = match (element.lat, element.lon) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => {
            let center = element.center.as_ref()?;
            (center.lat, center.lon)
        }
    };

    let street_name = element
        .tags
        .get("addr:street")
        .cloned()
        .unwrap_or_else(|| query_street.to_string());

    let city = element
        .tags
        .get("addr:city")
        .cloned()
        .or_else(|| hints.city.clone());
    let region = element
        .tags
        .get("addr:state")
        .or_else(|| element.tags.get("addr:province"))
        .or_else(|| element.tags.get("addr:region"))
        .cloned()
        .or_else(|| hints.region.clone());
    let country = element
        .tags
        .get("addr:country")
        .or_else(|| element.tags.get("addr:country_code"))
        .cloned()
        .or_else(|| hints.country.clone());

    Some(AddressCandidate {
        civic_number: Some(house_number.clone()),
        label: Some(format!("{} {}", house_number, street_name).trim().to_string()),
        street: Some(street_name),
        city,
        region,
        postal_code: element.tags.get("addr:postcode").cloned(),
        country,
        lat: Some(lat),
        lng: Some(lng),
    })
}

/// Street-lookup dedup key: `(civic_number, street, postal_code)`,
/// lowercased and trimmed. Deliberately different from the bulk-store key,
/// which uses the unit instead of the postal code.
fn lookup_dedup_key(candidate: &AddressCandidate) -> String {
    format!(
        "{}|{}|{}",
        candidate.civic_number.as_deref().unwrap_or(""),
        candidate.street.as_deref().unwrap_or(""),
        candidate.postal_code.as_deref().unwrap_or(""),
    )
    .trim()
    .to_lowercase()
}

/// Filter, dedup and cap raw elements into lookup results
pub fn reconcile_elements(
    elements: &[OverpassElement],
    query_street: &str,
    expected_city: Option<&str>,
    hints: &LookupHints,
) -> Vec<AddressCandidate> {
    let expected = expected_city.map(normalize_place_name).unwrap_or_default();
    let mut seen = std::collections::HashSet::new();
    let mut results = Vec::new();

    for element in elements {
        let Some(candidate) = candidate_from_element(element, query_street, hints) else {
            continue;
        };

        // Results with no city tag at all are kept: don't over-filter on
        // missing data.
        if !expected.is_empty() {
            if let Some(city) = candidate.city.as_deref().filter(|c| !c.is_empty()) {
                if normalize_place_name(city) != expected {
                    continue;
                }
            }
        }

        if !seen.insert(lookup_dedup_key(&candidate)) {
            continue;
        }

        results.push(candidate);
        if results.len() >= MAX_LOOKUP_RESULTS {
            break;
        }
    }

    results
}

/// Extract LineString features from `out geom` way elements.
///
/// Ways need at least 2 usable vertices; anything thinner is skipped.
pub fn features_from_elements(elements: &[OverpassElement], street: &str) -> Vec<Feature> {
    let mut features = Vec::new();

    for element in elements {
        if element.element_type != "way" {
            continue;
        }

        let coordinates: Vec<[f64; 2]> = element
            .geometry
            .iter()
            .filter_map(|point| match (point.lon, point.lat) {
                (Some(lon), Some(lat)) => Some([lon, lat]),
                _ => None,
            })
            .collect();

        if coordinates.len() < 2 {
            continue;
        }

        let name = element
            .tags
            .get("name")
            .cloned()
            .unwrap_or_else(|| street.to_string());

        features.push(Feature::line_string(name, element.id, coordinates));
    }

    features
}

/// Overpass API client with sequential endpoint fallback
pub struct OverpassClient {
    http_client: reqwest::Client,
    endpoints: Vec<String>,
}

impl OverpassClient {
    pub fn new(endpoints: Vec<String>, user_agent: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(LOOKUP_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            endpoints,
        })
    }

    /// Query all address points tagged with `street` inside `bbox`.
    ///
    /// `expected_city` post-filters results by normalized city name.
    pub async fn lookup_street(
        &self,
        street: &str,
        bbox: BoundingBox,
        expected_city: Option<&str>,
        hints: &LookupHints,
    ) -> Result<Vec<AddressCandidate>, OverpassError> {
        let street_regex = escape_overpass_regex(street);
        let bbox_literal = bbox.overpass_literal();

        let query = format!(
            "[out:json][timeout:25];\n\
             (\n\
               node[\"addr:street\"~\"^{re}\",i][\"addr:housenumber\"]({bbox});\n\
               way[\"addr:street\"~\"^{re}\",i][\"addr:housenumber\"]({bbox});\n\
               relation[\"addr:street\"~\"^{re}\",i][\"addr:housenumber\"]({bbox});\n\
             );\n\
             out center;",
            re = street_regex,
            bbox = bbox_literal,
        );

        let payload = self.run_query(&query).await?;
        Ok(reconcile_elements(
            &payload.elements,
            street,
            expected_city,
            hints,
        ))
    }

    /// Fetch street-line geometry for caching: `highway` ways whose name
    /// matches the street exactly (anchored, case-insensitive).
    ///
    /// Best-effort: total upstream failure and zero matching ways both
    /// yield `None`; geometry caching never fails a lookup.
    pub async fn fetch_street_geometry(
        &self,
        street: &str,
        bbox: BoundingBox,
    ) -> Option<FeatureCollection> {
        let street_regex = escape_overpass_regex(street);
        let query = format!(
            "[out:json][timeout:25];\n\
             (\n\
               way[\"highway\"][\"name\"~\"^{re}$\",i]({bbox});\n\
             );\n\
             out geom;",
            re = street_regex,
            bbox = bbox.overpass_literal(),
        );

        let payload = match self.run_query(&query).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(street = %street, error = %e, "Street geometry fetch failed");
                return None;
            }
        };

        let features = features_from_elements(&payload.elements, street);
        if features.is_empty() {
            return None;
        }

        Some(FeatureCollection::new(features))
    }

    /// POST the query to each endpoint in order, stopping at the first
    /// HTTP success. One transport retry per endpoint, no backoff state.
    async fn run_query(&self, query: &str) -> Result<OverpassPayload, OverpassError> {
        let mut last_status: Option<u16> = None;
        let mut last_body: Option<String> = None;

        for endpoint in &self.endpoints {
            for attempt in 0..2 {
                let response = self
                    .http_client
                    .post(endpoint)
                    .header("Content-Type", "text/plain")
                    .body(query.to_string())
                    .send()
                    .await;

                match response {
                    Ok(response) if response.status().is_success() => {
                        match response.json::<OverpassPayload>().await {
                            Ok(payload) => return Ok(payload),
                            Err(e) => {
                                tracing::debug!(
                                    endpoint = %endpoint,
                                    error = %e,
                                    "Overpass response was not valid JSON"
                                );
                                last_status = Some(200);
                                last_body = Some(format!("invalid JSON: {}", e));
                                break;
                            }
                        }
                    }
                    Ok(response) => {
                        let status = response.status().as_u16();
                        let body = response.text().await.unwrap_or_default();
                        tracing::debug!(
                            endpoint = %endpoint,
                            status,
                            "Overpass endpoint returned error status"
                        );
                        last_status = Some(status);
                        last_body = Some(truncate(&body, FAILURE_BODY_LIMIT));
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(
                            endpoint = %endpoint,
                            attempt,
                            error = %e,
                            "Overpass transport failure"
                        );
                        if attempt == 0 {
                            tokio::time::sleep(RETRY_PAUSE).await;
                        }
                    }
                }
            }
        }

        Err(OverpassError::Unavailable {
            status: last_status,
            body: last_body,
        })
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(json: serde_json::Value) -> OverpassElement {
        serde_json::from_value(json).expect("element fixture")
    }

    #[test]
    fn escape_handles_metacharacters_and_quotes() {
        assert_eq!(escape_overpass_regex("Main St."), "Main St\\.");
        assert_eq!(escape_overpass_regex("St-Jean"), "St\\-Jean");
        assert_eq!(escape_overpass_regex(r#"Oak "B" Row"#), "Oak \\\"B\\\" Row");
        assert_eq!(escape_overpass_regex("a(b)c"), "a\\(b\\)c");
    }

    #[test]
    fn node_element_maps_to_candidate() {
        let el = element(serde_json::json!({
            "type": "node",
            "id": 10,
            "lat": 45.5,
            "lon": -73.6,
            "tags": {
                "addr:housenumber": "123",
                "addr:street": "Oak Street",
                "addr:city": "Springfield",
                "addr:postcode": "H0H 0H0"
            }
        }));

        let candidate =
            candidate_from_element(&el, "Oak", &LookupHints::default()).expect("candidate");
        assert_eq!(candidate.civic_number.as_deref(), Some("123"));
        assert_eq!(candidate.street.as_deref(), Some("Oak Street"));
        assert_eq!(candidate.label.as_deref(), Some("123 Oak Street"));
        assert_eq!(candidate.city.as_deref(), Some("Springfield"));
        assert_eq!(candidate.postal_code.as_deref(), Some("H0H 0H0"));
        assert_eq!(candidate.lat, Some(45.5));
        assert_eq!(candidate.lng, Some(-73.6));
    }

    #[test]
    fn way_element_uses_center_point() {
        let el = element(serde_json::json!({
            "type": "way",
            "id": 11,
            "center": {"lat": 45.51, "lon": -73.61},
            "tags": {"addr:housenumber": "77"}
        }));

        let candidate =
            candidate_from_element(&el, "Oak Street", &LookupHints::default()).expect("candidate");
        // Street falls back to the query when untagged
        assert_eq!(candidate.street.as_deref(), Some("Oak Street"));
        assert_eq!(candidate.label.as_deref(), Some("77 Oak Street"));
        assert_eq!(candidate.lat, Some(45.51));
    }

    #[test]
    fn elements_without_housenumber_or_coordinates_are_skipped() {
        let no_number = element(serde_json::json!({
            "type": "node", "lat": 45.5, "lon": -73.6,
            "tags": {"addr:street": "Oak Street"}
        }));
        assert!(candidate_from_element(&no_number, "Oak", &LookupHints::default()).is_none());

        let no_coords = element(serde_json::json!({
            "type": "way",
            "tags": {"addr:housenumber": "5"}
        }));
        assert!(candidate_from_element(&no_coords, "Oak", &LookupHints::default()).is_none());
    }

    #[test]
    fn hints_fill_missing_tags() {
        let el = element(serde_json::json!({
            "type": "node", "lat": 45.5, "lon": -73.6,
            "tags": {"addr:housenumber": "9"}
        }));
        let hints = LookupHints {
            city: Some("Springfield".to_string()),
            region: Some("QC".to_string()),
            country: Some("CA".to_string()),
        };

        let candidate = candidate_from_element(&el, "Oak", &hints).expect("candidate");
        assert_eq!(candidate.city.as_deref(), Some("Springfield"));
        assert_eq!(candidate.region.as_deref(), Some("QC"));
        assert_eq!(candidate.country.as_deref(), Some("CA"));
    }

    #[test]
    fn city_filter_keeps_untagged_and_matching_results() {
        let elements = vec![
            element(serde_json::json!({
                "type": "node", "lat": 45.5, "lon": -73.6,
                "tags": {"addr:housenumber": "1", "addr:city": "Montréal"}
            })),
            element(serde_json::json!({
                "type": "node", "lat": 45.6, "lon": -73.5,
                "tags": {"addr:housenumber": "2", "addr:city": "Laval"}
            })),
            element(serde_json::json!({
                "type": "node", "lat": 45.7, "lon": -73.4,
                "tags": {"addr:housenumber": "3"}
            })),
        ];

        let results =
            reconcile_elements(&elements, "Oak", Some("montreal"), &LookupHints::default());
        let numbers: Vec<_> = results
            .iter()
            .map(|c| c.civic_number.as_deref().unwrap())
            .collect();
        assert_eq!(numbers, vec!["1", "3"]);
    }

    #[test]
    fn duplicate_civic_street_postal_collapse() {
        let make = |lat: f64| {
            element(serde_json::json!({
                "type": "node", "lat": lat, "lon": -73.6,
                "tags": {
                    "addr:housenumber": "12",
                    "addr:street": "Oak Street",
                    "addr:postcode": "H0H 0H0"
                }
            }))
        };
        let elements = vec![make(45.5), make(45.500001)];

        let results = reconcile_elements(&elements, "Oak", None, &LookupHints::default());
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn lookup_results_cap_at_500() {
        let elements: Vec<_> = (0..600)
            .map(|i| {
                element(serde_json::json!({
                    "type": "node", "lat": 45.5, "lon": -73.6,
                    "tags": {"addr:housenumber": i.to_string(), "addr:street": "Oak"}
                }))
            })
            .collect();

        let results = reconcile_elements(&elements, "Oak", None, &LookupHints::default());
        assert_eq!(results.len(), MAX_LOOKUP_RESULTS);
    }

    #[test]
    fn geometry_features_require_way_type_and_two_points() {
        let elements = vec![
            element(serde_json::json!({
                "type": "way",
                "id": 1,
                "tags": {"name": "Oak Street"},
                "geometry": [
                    {"lat": 45.5, "lon": -73.6},
                    {"lat": 45.51, "lon": -73.59}
                ]
            })),
            element(serde_json::json!({
                "type": "way",
                "id": 2,
                "geometry": [{"lat": 45.5, "lon": -73.6}]
            })),
            element(serde_json::json!({
                "type": "node", "id": 3, "lat": 45.5, "lon": -73.6
            })),
        ];

        let features = features_from_elements(&elements, "Oak Street");
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].properties.name, "Oak Street");
        assert_eq!(features[0].properties.osm_id, Some(1));
        // [lon, lat] ordering
        assert_eq!(features[0].geometry.coordinates[0], [-73.6, 45.5]);
    }

    #[test]
    fn geometry_vertices_missing_coordinates_are_dropped() {
        let elements = vec![element(serde_json::json!({
            "type": "way",
            "id": 1,
            "geometry": [
                {"lat": 45.5, "lon": -73.6},
                {"lat": 45.505},
                {"lat": 45.51, "lon": -73.59}
            ]
        }))];

        let features = features_from_elements(&elements, "Oak Street");
        assert_eq!(features[0].geometry.coordinates.len(), 2);
    }
}
