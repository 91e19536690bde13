//! Database access for fieldmap-srv
//!
//! SQLite via sqlx. Tables are created on startup with
//! `CREATE TABLE IF NOT EXISTS`; the unique index on
//! `territory_streets(territory_id, name_normalized)` is the sole
//! concurrency guard against duplicate-geometry races.

pub mod addresses;
pub mod streets;
pub mod territories;
pub mod visits;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool, creating the file and schema as
/// needed.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if they don't exist.
///
/// Public so tests can initialize `sqlite::memory:` pools.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS territories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id INTEGER NOT NULL,
            parent_id INTEGER REFERENCES territories(id) ON DELETE SET NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            territory_type TEXT,
            dominant_language TEXT,
            notes TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(organization_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS addresses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id INTEGER NOT NULL,
            territory_id INTEGER NOT NULL REFERENCES territories(id) ON DELETE CASCADE,
            civic_number TEXT,
            unit TEXT,
            label TEXT,
            contact_name TEXT,
            phone TEXT,
            notes TEXT,
            street TEXT,
            street2 TEXT,
            city TEXT,
            region TEXT,
            postal_code TEXT,
            country TEXT,
            lat REAL,
            lng REAL,
            status TEXT NOT NULL DEFAULT 'not_visited',
            do_not_call INTEGER NOT NULL DEFAULT 0,
            last_visit_at TEXT,
            next_visit_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_addresses_org_territory
         ON addresses(organization_id, territory_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS visits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            organization_id INTEGER NOT NULL,
            address_id INTEGER NOT NULL REFERENCES addresses(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL,
            visited_at TEXT NOT NULL,
            result TEXT NOT NULL,
            action TEXT,
            openness TEXT,
            observed_language TEXT,
            notes TEXT,
            person_name TEXT,
            do_not_call INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_visits_org_address
         ON visits(organization_id, address_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS territory_streets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            territory_id INTEGER NOT NULL REFERENCES territories(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            name_normalized TEXT NOT NULL,
            geojson TEXT,
            source TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(territory_id, name_normalized)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (territories, addresses, visits, territory_streets)");

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // One connection: each in-memory SQLite connection is its own database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    init_tables(&pool).await.expect("Failed to init tables");
    pool
}
