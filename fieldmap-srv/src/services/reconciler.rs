//! Import reconciler
//!
//! Turns address candidates from any ingestion path (manual entry, OCR
//! scan, bulk paste, street lookup) into deduplicated, territory-scoped
//! rows. Dedup happens only within one batch; separate import operations
//! may create look-alike rows, which operators reconcile manually.

use sqlx::SqlitePool;

use crate::db::addresses::{insert_addresses, NewAddress};
use crate::models::AddressCandidate;
use crate::services::geocoder::{Geocoder, GeocodeParts};
use crate::services::scan_parser::parse_scan_text;

pub const DEFAULT_STATUS: &str = "not_visited";
pub const DO_NOT_CALL_STATUS: &str = "do_not_call";

/// Import-time defaults attached uniformly to every scanned candidate
#[derive(Debug, Default, Clone)]
pub struct ScanDefaults {
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Resolve the effective status and do-not-call flag.
///
/// Status defaults to `not_visited`. A status of `do_not_call` forces the
/// flag true regardless of what the caller sent: the two must never
/// disagree in the do-not-call direction.
pub fn resolve_status(status: Option<&str>, do_not_call: Option<bool>) -> (String, bool) {
    let status = status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STATUS)
        .to_string();
    let mut do_not_call = do_not_call.unwrap_or(false);
    if status == DO_NOT_CALL_STATUS {
        do_not_call = true;
    }
    (status, do_not_call)
}

/// Bulk-store dedup key: `(civic_number, street, unit)`, lowercased and
/// trimmed. The street-lookup path deduplicates on postal code instead of
/// unit; the two keys are deliberately separate per-path behaviors.
pub fn bulk_dedup_key(row: &NewAddress) -> String {
    format!(
        "{}|{}|{}",
        row.civic_number.as_deref().unwrap_or(""),
        row.street.as_deref().unwrap_or(""),
        row.unit.as_deref().unwrap_or(""),
    )
    .trim()
    .to_lowercase()
}

fn has_street_or_label(row: &NewAddress) -> bool {
    let non_empty = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
    non_empty(&row.street) || non_empty(&row.label)
}

/// Drop rows with neither street nor label, then dedup within the batch,
/// preserving first-occurrence order.
pub fn dedup_batch(rows: Vec<NewAddress>) -> Vec<NewAddress> {
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(has_street_or_label)
        .filter(|row| seen.insert(bulk_dedup_key(row)))
        .collect()
}

/// Parse a scan block into candidates carrying the import defaults
pub fn scan_candidates(text: &str, defaults: &ScanDefaults) -> Vec<AddressCandidate> {
    parse_scan_text(text)
        .into_iter()
        .map(|line| AddressCandidate {
            civic_number: line.civic_number,
            street: line.street,
            label: line.label,
            city: defaults.city.clone(),
            region: defaults.region.clone(),
            postal_code: defaults.postal_code.clone(),
            country: defaults.country.clone(),
            lat: None,
            lng: None,
        })
        .collect()
}

/// Build the insert row for one candidate
pub fn candidate_into_row(
    candidate: AddressCandidate,
    organization_id: i64,
    territory_id: i64,
    status: &str,
    do_not_call: bool,
) -> NewAddress {
    NewAddress {
        organization_id,
        territory_id,
        civic_number: candidate.civic_number,
        label: candidate.label,
        street: candidate.street,
        city: candidate.city,
        region: candidate.region,
        postal_code: candidate.postal_code,
        country: candidate.country,
        lat: candidate.lat,
        lng: candidate.lng,
        status: status.to_string(),
        do_not_call,
        ..Default::default()
    }
}

/// Run the OCR scan import: parse, geocode candidates missing coordinates
/// (sequentially; batches are human-triggered and bounded), batch insert.
///
/// Returns the number of inserted rows; an empty batch is a no-op.
pub async fn import_scan(
    pool: &SqlitePool,
    geocoder: Option<&Geocoder>,
    organization_id: i64,
    territory_id: i64,
    text: &str,
    defaults: &ScanDefaults,
    status: Option<&str>,
) -> anyhow::Result<u64> {
    let (status, do_not_call) = resolve_status(status, None);

    let mut rows = Vec::new();
    for mut candidate in scan_candidates(text, defaults) {
        if candidate.lat.is_none() && candidate.lng.is_none() {
            if let Some(geocoder) = geocoder {
                let parts = GeocodeParts {
                    civic_number: candidate.civic_number.as_deref(),
                    street: candidate.street.as_deref(),
                    city: candidate.city.as_deref(),
                    region: candidate.region.as_deref(),
                    postal_code: candidate.postal_code.as_deref(),
                    country: candidate.country.as_deref(),
                    ..Default::default()
                };
                if let Some(coordinates) = geocoder.geocode(&parts).await {
                    candidate.lat = Some(coordinates.lat);
                    candidate.lng = Some(coordinates.lng);
                }
            }
        }

        rows.push(candidate_into_row(
            candidate,
            organization_id,
            territory_id,
            &status,
            do_not_call,
        ));
    }

    let inserted = insert_addresses(pool, &rows).await?;
    tracing::info!(territory_id, inserted, "Scan import completed");
    Ok(inserted)
}
