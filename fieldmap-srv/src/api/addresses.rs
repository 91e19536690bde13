//! Address ingestion and street lookup handlers
//!
//! Four ingestion paths share the reconciler rules: single create, OCR
//! scan import, structured bulk store, and Overpass street lookup. All are
//! request-scoped and synchronous; outbound calls block the handler for
//! their (bounded) duration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldmap_common::geo::BoundingBox;

use crate::api::OrgContext;
use crate::db::addresses::{self, Address, NewAddress};
use crate::db::{territories, visits};
use crate::error::{ApiError, ApiResult};
use crate::models::AddressCandidate;
use crate::services::geocoder::GeocodeParts;
use crate::services::overpass::{LookupHints, OverpassError};
use crate::services::reconciler::{self, ScanDefaults};
use crate::services::street_cache;
use crate::AppState;

/// Hard cap on one bulk-store batch
const MAX_BULK_ADDRESSES: usize = 500;
/// Hard cap on one scan import's input text
const MAX_SCAN_CHARS: usize = 50_000;

/// Editable address fields shared by single create, update and bulk items
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressInput {
    pub civic_number: Option<String>,
    pub unit: Option<String>,
    pub label: Option<String>,
    pub contact_name: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// POST /territories/:id/addresses request
#[derive(Debug, Deserialize)]
pub struct StoreAddressRequest {
    #[serde(flatten)]
    pub address: AddressInput,
    pub status: Option<String>,
    pub do_not_call: Option<bool>,
    pub next_visit_at: Option<DateTime<Utc>>,
}

/// PUT /addresses/:id request.
///
/// Edits merge: a field left out of the payload keeps its stored value.
/// `next_visit_at` distinguishes an absent key from an explicit null, so
/// it survives edits that don't mention it and clears when null is sent.
#[derive(Debug, Deserialize)]
pub struct UpdateAddressRequest {
    #[serde(flatten)]
    pub address: AddressInput,
    pub status: Option<String>,
    pub do_not_call: Option<bool>,
    #[serde(default, deserialize_with = "key_present")]
    pub next_visit_at: Option<Option<DateTime<Utc>>>,
}

/// Outer None = key absent, Some(None) = explicit null
fn key_present<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
}

/// POST /territories/:id/addresses/import-scan request
#[derive(Debug, Deserialize)]
pub struct ImportScanRequest {
    pub lines: String,
    pub default_city: Option<String>,
    pub default_region: Option<String>,
    pub default_postal_code: Option<String>,
    pub default_country: Option<String>,
    pub status: Option<String>,
}

/// POST /territories/:id/addresses/bulk request
#[derive(Debug, Deserialize)]
pub struct BulkStoreRequest {
    pub addresses: Vec<AddressInput>,
    pub status: Option<String>,
    pub do_not_call: Option<bool>,
}

/// Import responses report only the inserted row count
#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: u64,
}

/// GET /territories/:id/addresses/street-lookup query params
#[derive(Debug, Deserialize)]
pub struct StreetLookupParams {
    pub street: String,
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub store_street: Option<bool>,
}

/// GET street-lookup response
#[derive(Debug, Serialize)]
pub struct StreetLookupResponse {
    pub addresses: Vec<AddressCandidate>,
}

/// GET /addresses/:id response
#[derive(Debug, Serialize)]
pub struct AddressWithVisits {
    #[serde(flatten)]
    pub address: Address,
    pub visits: Vec<visits::Visit>,
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    if let Some(value) = value {
        if value.len() > max {
            return Err(ApiError::BadRequest(format!(
                "{} must be at most {} characters",
                field, max
            )));
        }
    }
    Ok(())
}

fn check_coordinates(lat: Option<f64>, lng: Option<f64>) -> Result<(), ApiError> {
    if let Some(lat) = lat {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ApiError::BadRequest(
                "lat must be between -90 and 90".to_string(),
            ));
        }
    }
    if let Some(lng) = lng {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(ApiError::BadRequest(
                "lng must be between -180 and 180".to_string(),
            ));
        }
    }
    Ok(())
}

/// Field-level validation, applied before any side effect
fn validate_address_input(input: &AddressInput) -> Result<(), ApiError> {
    check_len("civic_number", input.civic_number.as_deref(), 50)?;
    check_len("unit", input.unit.as_deref(), 50)?;
    check_len("label", input.label.as_deref(), 255)?;
    check_len("contact_name", input.contact_name.as_deref(), 255)?;
    check_len("street", input.street.as_deref(), 255)?;
    check_len("street2", input.street2.as_deref(), 255)?;
    check_len("city", input.city.as_deref(), 255)?;
    check_len("region", input.region.as_deref(), 255)?;
    check_len("postal_code", input.postal_code.as_deref(), 50)?;
    check_len("country", input.country.as_deref(), 255)?;
    check_len("phone", input.phone.as_deref(), 50)?;
    check_coordinates(input.lat, input.lng)?;
    Ok(())
}

async fn scoped_territory(
    state: &AppState,
    ctx: &OrgContext,
    territory_id: i64,
) -> Result<territories::Territory, ApiError> {
    let territory = territories::find_territory(&state.db, territory_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Territory not found: {}", territory_id)))?;
    ctx.ensure_organization(territory.organization_id)?;
    Ok(territory)
}

async fn scoped_address(
    state: &AppState,
    ctx: &OrgContext,
    address_id: i64,
) -> Result<Address, ApiError> {
    let address = addresses::find_address(&state.db, address_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Address not found: {}", address_id)))?;
    ctx.ensure_organization(address.organization_id)?;
    Ok(address)
}

/// POST /territories/:id/addresses
///
/// Single address create. Geocodes when both coordinates are absent;
/// geocoding failure still creates the row, just without lat/lng.
pub async fn store_address(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(territory_id): Path<i64>,
    Json(request): Json<StoreAddressRequest>,
) -> ApiResult<(StatusCode, Json<Address>)> {
    let territory = scoped_territory(&state, &ctx, territory_id).await?;
    validate_address_input(&request.address)?;

    let (status, do_not_call) =
        reconciler::resolve_status(request.status.as_deref(), request.do_not_call);

    let input = request.address;
    let mut row = NewAddress {
        organization_id: ctx.organization_id,
        territory_id: territory.id,
        civic_number: input.civic_number,
        unit: input.unit,
        label: input.label,
        contact_name: input.contact_name,
        phone: input.phone,
        notes: input.notes,
        street: input.street,
        street2: input.street2,
        city: input.city,
        region: input.region,
        postal_code: input.postal_code,
        country: input.country,
        lat: input.lat,
        lng: input.lng,
        status,
        do_not_call,
        next_visit_at: request.next_visit_at,
    };

    if row.lat.is_none() && row.lng.is_none() {
        let parts = GeocodeParts {
            civic_number: row.civic_number.as_deref(),
            street: row.street.as_deref(),
            street2: row.street2.as_deref(),
            city: row.city.as_deref(),
            region: row.region.as_deref(),
            postal_code: row.postal_code.as_deref(),
            country: row.country.as_deref(),
        };
        if let Some(coordinates) = state.geocoder.geocode(&parts).await {
            row.lat = Some(coordinates.lat);
            row.lng = Some(coordinates.lng);
        }
    }

    let address = addresses::insert_address(&state.db, &row).await?;
    tracing::info!(address_id = address.id, territory_id, "Address created");

    Ok((StatusCode::CREATED, Json(address)))
}

/// POST /territories/:id/addresses/import-scan
///
/// OCR-text batch import. Candidates missing coordinates are geocoded
/// sequentially; total latency scales with candidate count, accepted for
/// human-triggered, bounded batches.
pub async fn import_scan(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(territory_id): Path<i64>,
    Json(request): Json<ImportScanRequest>,
) -> ApiResult<Json<ImportResponse>> {
    let territory = scoped_territory(&state, &ctx, territory_id).await?;

    if request.lines.trim().is_empty() {
        return Err(ApiError::BadRequest("lines is required".to_string()));
    }
    if request.lines.len() > MAX_SCAN_CHARS {
        return Err(ApiError::BadRequest(format!(
            "lines must be at most {} characters",
            MAX_SCAN_CHARS
        )));
    }
    check_len("default_city", request.default_city.as_deref(), 255)?;
    check_len("default_region", request.default_region.as_deref(), 255)?;
    check_len(
        "default_postal_code",
        request.default_postal_code.as_deref(),
        50,
    )?;
    check_len("default_country", request.default_country.as_deref(), 255)?;

    let defaults = ScanDefaults {
        city: request.default_city,
        region: request.default_region,
        postal_code: request.default_postal_code,
        country: request.default_country,
    };

    let imported = reconciler::import_scan(
        &state.db,
        Some(&state.geocoder),
        ctx.organization_id,
        territory.id,
        &request.lines,
        &defaults,
        request.status.as_deref(),
    )
    .await?;

    Ok(Json(ImportResponse { imported }))
}

/// POST /territories/:id/addresses/bulk
///
/// Structured batch import. No geocoding: coordinates must already be
/// present when wanted. An over-cap batch is rejected wholesale.
pub async fn bulk_store(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(territory_id): Path<i64>,
    Json(request): Json<BulkStoreRequest>,
) -> ApiResult<Json<ImportResponse>> {
    let territory = scoped_territory(&state, &ctx, territory_id).await?;

    if request.addresses.is_empty() {
        return Err(ApiError::BadRequest("addresses must not be empty".to_string()));
    }
    if request.addresses.len() > MAX_BULK_ADDRESSES {
        return Err(ApiError::BadRequest(format!(
            "addresses must contain at most {} items",
            MAX_BULK_ADDRESSES
        )));
    }
    for input in &request.addresses {
        validate_address_input(input)?;
    }

    let (status, do_not_call) =
        reconciler::resolve_status(request.status.as_deref(), request.do_not_call);

    let rows: Vec<NewAddress> = request
        .addresses
        .into_iter()
        .map(|input| NewAddress {
            organization_id: ctx.organization_id,
            territory_id: territory.id,
            civic_number: input.civic_number,
            unit: input.unit,
            label: input.label,
            contact_name: input.contact_name,
            phone: input.phone,
            notes: input.notes,
            street: input.street,
            street2: input.street2,
            city: input.city,
            region: input.region,
            postal_code: input.postal_code,
            country: input.country,
            lat: input.lat,
            lng: input.lng,
            status: status.clone(),
            do_not_call,
            next_visit_at: None,
        })
        .collect();

    let rows = reconciler::dedup_batch(rows);
    let imported = addresses::insert_addresses(&state.db, &rows).await?;
    tracing::info!(territory_id, imported, "Bulk store completed");

    Ok(Json(ImportResponse { imported }))
}

/// GET /territories/:id/addresses/street-lookup
///
/// Queries Overpass for address points along a street. With
/// `store_street=true` the street's line geometry is cached first
/// (best-effort; a cache miss plus upstream failure does not fail the
/// lookup). Total upstream failure of the point query itself is a 502.
pub async fn street_lookup(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(territory_id): Path<i64>,
    Query(params): Query<StreetLookupParams>,
) -> ApiResult<Json<StreetLookupResponse>> {
    let territory = scoped_territory(&state, &ctx, territory_id).await?;

    check_len("street", Some(&params.street), 255)?;
    check_coordinates(Some(params.min_lat), Some(params.min_lng))?;
    check_coordinates(Some(params.max_lat), Some(params.max_lng))?;
    check_len("city", params.city.as_deref(), 255)?;
    check_len("region", params.region.as_deref(), 255)?;
    check_len("country", params.country.as_deref(), 255)?;

    let street = params.street.trim().to_string();
    if street.is_empty() {
        return Ok(Json(StreetLookupResponse { addresses: vec![] }));
    }

    // Corners may arrive in either order
    let bbox = BoundingBox::from_corners(
        params.min_lat,
        params.min_lng,
        params.max_lat,
        params.max_lng,
    );

    if params.store_street.unwrap_or(false) {
        street_cache::store_street_geometry(&state.db, territory.id, &street, || {
            state.overpass.fetch_street_geometry(&street, bbox)
        })
        .await?;
    }

    let hints = LookupHints {
        city: params.city.clone(),
        region: params.region.clone(),
        country: params.country.clone(),
    };

    let addresses = state
        .overpass
        .lookup_street(&street, bbox, params.city.as_deref(), &hints)
        .await
        .map_err(|OverpassError::Unavailable { status, body }| {
            ApiError::UpstreamUnavailable { status, body }
        })?;

    Ok(Json(StreetLookupResponse { addresses }))
}

/// GET /addresses/:id
pub async fn show_address(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(address_id): Path<i64>,
) -> ApiResult<Json<AddressWithVisits>> {
    let address = scoped_address(&state, &ctx, address_id).await?;
    let visits = visits::visits_for_address(&state.db, address.id).await?;

    Ok(Json(AddressWithVisits { address, visits }))
}

fn merge_field(field: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *field = value;
    }
}

/// PUT /addresses/:id
///
/// Provided fields are merged onto the stored row; omitted fields are
/// untouched. Status and do-not-call cohere in both directions on edits: a
/// do_not_call status forces the flag, and a set flag forces the status.
pub async fn update_address(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(address_id): Path<i64>,
    Json(request): Json<UpdateAddressRequest>,
) -> ApiResult<Json<Address>> {
    let mut address = scoped_address(&state, &ctx, address_id).await?;
    validate_address_input(&request.address)?;

    let mut status = request
        .status
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| address.status.clone());
    let mut do_not_call = request.do_not_call.unwrap_or(address.do_not_call);
    if status == reconciler::DO_NOT_CALL_STATUS {
        do_not_call = true;
    }
    if do_not_call {
        status = reconciler::DO_NOT_CALL_STATUS.to_string();
    }

    let input = request.address;
    merge_field(&mut address.civic_number, input.civic_number);
    merge_field(&mut address.unit, input.unit);
    merge_field(&mut address.label, input.label);
    merge_field(&mut address.contact_name, input.contact_name);
    merge_field(&mut address.phone, input.phone);
    merge_field(&mut address.notes, input.notes);
    merge_field(&mut address.street, input.street);
    merge_field(&mut address.street2, input.street2);
    merge_field(&mut address.city, input.city);
    merge_field(&mut address.region, input.region);
    merge_field(&mut address.postal_code, input.postal_code);
    merge_field(&mut address.country, input.country);
    if input.lat.is_some() {
        address.lat = input.lat;
    }
    if input.lng.is_some() {
        address.lng = input.lng;
    }
    address.status = status;
    address.do_not_call = do_not_call;
    if let Some(next_visit_at) = request.next_visit_at {
        address.next_visit_at = next_visit_at;
    }

    if address.lat.is_none() && address.lng.is_none() {
        let parts = GeocodeParts {
            civic_number: address.civic_number.as_deref(),
            street: address.street.as_deref(),
            street2: address.street2.as_deref(),
            city: address.city.as_deref(),
            region: address.region.as_deref(),
            postal_code: address.postal_code.as_deref(),
            country: address.country.as_deref(),
        };
        if let Some(coordinates) = state.geocoder.geocode(&parts).await {
            address.lat = Some(coordinates.lat);
            address.lng = Some(coordinates.lng);
        }
    }

    addresses::update_address(&state.db, &address).await?;
    let address = addresses::find_address(&state.db, address_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Address not found: {}", address_id)))?;

    Ok(Json(address))
}

/// DELETE /addresses/:id
pub async fn destroy_address(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(address_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let address = scoped_address(&state, &ctx, address_id).await?;
    addresses::delete_address(&state.db, address.id).await?;
    tracing::info!(address_id, "Address deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Build address routes
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/territories/:territory_id/addresses", post(store_address))
        .route(
            "/territories/:territory_id/addresses/import-scan",
            post(import_scan),
        )
        .route(
            "/territories/:territory_id/addresses/bulk",
            post(bulk_store),
        )
        .route(
            "/territories/:territory_id/addresses/street-lookup",
            get(street_lookup),
        )
        .route("/addresses/:address_id", get(show_address))
        .route("/addresses/:address_id", put(update_address))
        .route("/addresses/:address_id", delete(destroy_address))
}
