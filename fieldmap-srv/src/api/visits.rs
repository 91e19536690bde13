//! Visit logging handlers
//!
//! Each visit create/update/delete recomputes the owning address's
//! status/do_not_call/last_visit_at projection from the most recent
//! visit ("most recent visit wins").

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::api::OrgContext;
use crate::db::addresses::{self, Address};
use crate::db::visits::{self, Visit, VisitFields};
use crate::error::{ApiError, ApiResult};
use crate::services::reconciler::{DEFAULT_STATUS, DO_NOT_CALL_STATUS};
use crate::AppState;

/// Visit create/update request
#[derive(Debug, Deserialize)]
pub struct VisitRequest {
    pub visited_at: DateTime<Utc>,
    pub result: String,
    pub action: Option<String>,
    pub openness: Option<String>,
    pub observed_language: Option<String>,
    pub notes: Option<String>,
    pub person_name: Option<String>,
    pub do_not_call: Option<bool>,
    pub next_visit_at: Option<DateTime<Utc>>,
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

/// Validate and resolve the visit fields; `result == "do_not_call"`
/// forces the visit's do-not-call flag.
fn visit_fields(request: &VisitRequest) -> Result<VisitFields, ApiError> {
    if request.result.trim().is_empty() {
        return Err(ApiError::BadRequest("result is required".to_string()));
    }
    check_len("result", Some(&request.result), 100)?;
    check_len("action", request.action.as_deref(), 100)?;
    check_len("openness", request.openness.as_deref(), 100)?;
    check_len(
        "observed_language",
        request.observed_language.as_deref(),
        100,
    )?;
    check_len("person_name", request.person_name.as_deref(), 255)?;

    let mut do_not_call = request.do_not_call.unwrap_or(false);
    if request.result == DO_NOT_CALL_STATUS {
        do_not_call = true;
    }

    Ok(VisitFields {
        visited_at: request.visited_at,
        result: request.result.clone(),
        action: request.action.clone(),
        openness: request.openness.clone(),
        observed_language: request.observed_language.clone(),
        notes: request.notes.clone(),
        person_name: request.person_name.clone(),
        do_not_call,
    })
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

async fn scoped_visit(
    state: &AppState,
    address: &Address,
    visit_id: i64,
) -> Result<Visit, ApiError> {
    let visit = visits::find_visit(&state.db, visit_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Visit not found: {}", visit_id)))?;
    if visit.address_id != address.id {
        return Err(ApiError::NotFound(format!("Visit not found: {}", visit_id)));
    }
    Ok(visit)
}

/// Project the latest visit onto the address, or reset the projection
/// when no visits remain.
async fn sync_address_from_latest_visit(
    pool: &SqlitePool,
    address_id: i64,
    latest: Option<&Visit>,
    next_visit_at: Option<DateTime<Utc>>,
    update_next_visit: bool,
) -> anyhow::Result<()> {
    match latest {
        Some(visit) => {
            let status = if visit.do_not_call {
                DO_NOT_CALL_STATUS
            } else {
                visit.result.as_str()
            };
            addresses::sync_visit_projection(
                pool,
                address_id,
                status,
                visit.do_not_call,
                Some(visit.visited_at),
                next_visit_at,
                update_next_visit,
            )
            .await
        }
        None => {
            addresses::sync_visit_projection(
                pool,
                address_id,
                DEFAULT_STATUS,
                false,
                None,
                None,
                true,
            )
            .await
        }
    }
}

/// POST /addresses/:id/visits
///
/// The new visit always wins the projection: it is the edit the user just
/// made, so status/last_visit_at/next_visit_at roll forward from it.
pub async fn store_visit(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path(address_id): Path<i64>,
    Json(request): Json<VisitRequest>,
) -> ApiResult<(StatusCode, Json<Visit>)> {
    let address = scoped_address(&state, &ctx, address_id).await?;
    let fields = visit_fields(&request)?;

    let visit = visits::insert_visit(
        &state.db,
        ctx.organization_id,
        address.id,
        ctx.user_id,
        &fields,
    )
    .await?;

    let status = if fields.do_not_call {
        DO_NOT_CALL_STATUS
    } else {
        fields.result.as_str()
    };
    addresses::sync_visit_projection(
        &state.db,
        address.id,
        status,
        fields.do_not_call,
        Some(fields.visited_at),
        request.next_visit_at,
        true,
    )
    .await?;

    tracing::info!(address_id, visit_id = visit.id, "Visit recorded");
    Ok((StatusCode::CREATED, Json(visit)))
}

/// PUT /addresses/:id/visits/:visit_id
///
/// Re-dating a visit can change which visit is latest, so the projection
/// is recomputed afterwards. next_visit_at only moves when the edited
/// visit is (still) the latest; it resets when the edit demoted it.
pub async fn update_visit(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path((address_id, visit_id)): Path<(i64, i64)>,
    Json(request): Json<VisitRequest>,
) -> ApiResult<Json<Visit>> {
    let address = scoped_address(&state, &ctx, address_id).await?;
    let visit = scoped_visit(&state, &address, visit_id).await?;
    let fields = visit_fields(&request)?;

    let was_latest = visits::latest_visit(&state.db, address.id)
        .await?
        .map(|latest| latest.id == visit.id)
        .unwrap_or(false);

    visits::update_visit(&state.db, visit.id, &fields).await?;

    let latest = visits::latest_visit(&state.db, address.id).await?;
    let is_latest = latest
        .as_ref()
        .map(|latest| latest.id == visit.id)
        .unwrap_or(false);
    let reset_next_visit = was_latest && !is_latest;

    sync_address_from_latest_visit(
        &state.db,
        address.id,
        latest.as_ref(),
        if is_latest { request.next_visit_at } else { None },
        is_latest || reset_next_visit,
    )
    .await?;

    let visit = visits::find_visit(&state.db, visit_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Visit not found: {}", visit_id)))?;
    Ok(Json(visit))
}

/// DELETE /addresses/:id/visits/:visit_id
pub async fn destroy_visit(
    State(state): State<AppState>,
    ctx: OrgContext,
    Path((address_id, visit_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let address = scoped_address(&state, &ctx, address_id).await?;
    let visit = scoped_visit(&state, &address, visit_id).await?;

    let was_latest = visits::latest_visit(&state.db, address.id)
        .await?
        .map(|latest| latest.id == visit.id)
        .unwrap_or(false);

    visits::delete_visit(&state.db, visit.id).await?;

    let latest = visits::latest_visit(&state.db, address.id).await?;
    sync_address_from_latest_visit(&state.db, address.id, latest.as_ref(), None, was_latest)
        .await?;

    tracing::info!(address_id, visit_id, "Visit deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Build visit routes
pub fn visit_routes() -> Router<AppState> {
    Router::new()
        .route("/addresses/:address_id/visits", post(store_visit))
        .route("/addresses/:address_id/visits/:visit_id", put(update_visit))
        .route(
            "/addresses/:address_id/visits/:visit_id",
            delete(destroy_visit),
        )
}
