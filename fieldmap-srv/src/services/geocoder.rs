//! Forward-geocoding client (Nominatim-compatible search endpoint)
//!
//! Geocoding is an enrichment, never a gate: every failure mode collapses
//! to `None` and the record is persisted without coordinates. Only the
//! first search result is consumed; there is no ranking or disambiguation.

use serde::Deserialize;
use std::time::Duration;

const GEOCODE_TIMEOUT: Duration = Duration::from_secs(8);
const RETRY_PAUSE: Duration = Duration::from_millis(200);
/// Transport retries after the initial attempt
const TRANSPORT_RETRIES: u32 = 2;

/// A resolved coordinate pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Borrowed address parts fed into the search query
#[derive(Debug, Default, Clone, Copy)]
pub struct GeocodeParts<'a> {
    pub civic_number: Option<&'a str>,
    pub street: Option<&'a str>,
    pub street2: Option<&'a str>,
    pub city: Option<&'a str>,
    pub region: Option<&'a str>,
    pub postal_code: Option<&'a str>,
    pub country: Option<&'a str>,
}

/// Build the search string from non-empty parts, joined by `", "`.
///
/// Returns `None` when fewer than 2 parts are available: a single token is
/// too ambiguous to query, so the client fails closed without any HTTP.
pub fn build_query(parts: &GeocodeParts<'_>) -> Option<String> {
    let civic = parts.civic_number.map(str::trim).filter(|s| !s.is_empty());
    let street = parts.street.map(str::trim).filter(|s| !s.is_empty());

    let street_line = match (civic, street) {
        (Some(civic), Some(street)) => Some(format!("{} {}", civic, street)),
        (_, Some(street)) => Some(street.to_string()),
        _ => None,
    };

    let mut query_parts: Vec<String> = Vec::new();
    if let Some(line) = street_line {
        query_parts.push(line);
    }
    for part in [
        parts.street2,
        parts.city,
        parts.region,
        parts.postal_code,
        parts.country,
    ] {
        if let Some(value) = part.map(str::trim).filter(|s| !s.is_empty()) {
            query_parts.push(value.to_string());
        }
    }

    if query_parts.len() < 2 {
        return None;
    }

    Some(query_parts.join(", "))
}

/// First-result shape from the search endpoint; lat/lon arrive as
/// numeric strings.
#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: Option<String>,
    lon: Option<String>,
}

/// Forward-geocoding client
pub struct Geocoder {
    http_client: reqwest::Client,
    base_url: String,
}

impl Geocoder {
    pub fn new(base_url: &str, user_agent: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(GEOCODE_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve address parts to a single best-guess coordinate pair.
    ///
    /// Transport failures are retried twice with a short pause; HTTP error
    /// statuses, empty result arrays and unparsable coordinates all return
    /// `None` without retrying.
    pub async fn geocode(&self, parts: &GeocodeParts<'_>) -> Option<Coordinates> {
        let query = build_query(parts)?;

        for attempt in 0..=TRANSPORT_RETRIES {
            match self.search(&query).await {
                Ok(result) => return result,
                Err(e) => {
                    tracing::debug!(
                        query = %query,
                        attempt,
                        error = %e,
                        "Geocoding transport failure"
                    );
                    if attempt < TRANSPORT_RETRIES {
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }

        tracing::warn!(query = %query, "Geocoding gave up after transport retries");
        None
    }

    /// Single search request; `Err` only for transport-level failures
    async fn search(&self, query: &str) -> Result<Option<Coordinates>, reqwest::Error> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .header("Accept-Language", "en")
            .query(&[("format", "json"), ("limit", "1"), ("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Geocoding returned non-success status");
            return Ok(None);
        }

        let results: Vec<SearchResult> = match response.json().await {
            Ok(results) => results,
            Err(e) => {
                tracing::debug!(error = %e, "Geocoding response was not a result array");
                return Ok(None);
            }
        };

        let Some(first) = results.first() else {
            return Ok(None);
        };

        let (Some(lat), Some(lon)) = (first.lat.as_deref(), first.lon.as_deref()) else {
            return Ok(None);
        };

        match (lat.parse::<f64>(), lon.parse::<f64>()) {
            (Ok(lat), Ok(lng)) => Ok(Some(Coordinates { lat, lng })),
            _ => Ok(None),
        }
    }
}
