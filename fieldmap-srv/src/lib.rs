//! fieldmap-srv - Territory address import service
//!
//! Address-normalization and street-geometry-import pipeline for
//! field-canvassing territories: OCR scan parsing, forward geocoding,
//! Overpass street lookup with geometry caching, and batch import
//! reconciliation, over a SQLite store.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use fieldmap_common::config::AppConfig;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::geocoder::Geocoder;
use crate::services::overpass::OverpassClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Forward-geocoding client
    pub geocoder: Arc<Geocoder>,
    /// Overpass spatial-query client
    pub overpass: Arc<OverpassClient>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: &AppConfig) -> anyhow::Result<Self> {
        let user_agent = config.user_agent();
        let geocoder = Geocoder::new(&config.geocoder_url, &user_agent)?;
        let overpass = OverpassClient::new(config.overpass_endpoints.clone(), &user_agent)?;

        Ok(Self {
            db,
            geocoder: Arc::new(geocoder),
            overpass: Arc::new(overpass),
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::address_routes())
        .merge(api::visit_routes())
        .merge(api::health_routes())
        .with_state(state)
}
