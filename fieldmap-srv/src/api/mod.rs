//! HTTP API handlers for fieldmap-srv

pub mod addresses;
pub mod health;
pub mod visits;

pub use addresses::address_routes;
pub use health::health_routes;
pub use visits::visit_routes;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Identity of the caller, resolved upstream of this service.
///
/// Authentication is an external collaborator; the gateway injects the
/// caller's organization and user ids as headers and this service only
/// enforces "is this record in my organization" (404 on mismatch).
#[derive(Debug, Clone, Copy)]
pub struct OrgContext {
    pub organization_id: i64,
    pub user_id: i64,
}

impl OrgContext {
    /// 404 when a record belongs to a different organization; existence is
    /// not revealed across tenants.
    pub fn ensure_organization(&self, organization_id: i64) -> Result<(), ApiError> {
        if self.organization_id != organization_id {
            return Err(ApiError::NotFound("Resource not found".to_string()));
        }
        Ok(())
    }
}

fn header_id(parts: &Parts, name: &str) -> Result<i64, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing or invalid {} header", name)))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for OrgContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OrgContext {
            organization_id: header_id(parts, "X-Organization-Id")?,
            user_id: header_id(parts, "X-User-Id")?,
        })
    }
}
