//! fieldmap-srv - Territory address import service
//!
//! Single synchronous HTTP service: every import/geocode/lookup operation
//! runs to completion within one request handler. No background jobs.

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use fieldmap_common::config::AppConfig;
use fieldmap_srv::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting fieldmap-srv");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!("Database: {}", config.database_path.display());

    let db_pool = fieldmap_srv::db::init_database_pool(&config.database_path).await?;
    info!("Database connection established");

    let state = AppState::new(db_pool, &config)?;
    let app = fieldmap_srv::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
