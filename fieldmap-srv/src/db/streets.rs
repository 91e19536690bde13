//! Territory street geometry cache
//!
//! One row per `(territory_id, name_normalized)`, holding the GeoJSON
//! FeatureCollection fetched from Overpass. A street's geometry is fetched
//! at most once per territory: once a non-empty row exists, later lookups
//! short-circuit without touching upstream. The unique index resolves
//! concurrent-insert races; both writers fetched the same geometry, so the
//! upsert outcome is identical either way.

use anyhow::Result;
use fieldmap_common::geo::FeatureCollection;
use sqlx::{Row, SqlitePool};

/// Where a cached geometry came from
pub const SOURCE_OVERPASS: &str = "overpass";

/// Cached street geometry row
#[derive(Debug, Clone)]
pub struct TerritoryStreet {
    pub id: i64,
    pub territory_id: i64,
    pub name: String,
    pub name_normalized: String,
    pub geojson: Option<FeatureCollection>,
    pub source: Option<String>,
}

/// True when a non-empty geometry already exists for this street in this
/// territory; callers skip the upstream fetch entirely in that case.
pub async fn has_street_geometry(
    pool: &SqlitePool,
    territory_id: i64,
    name_normalized: &str,
) -> Result<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM territory_streets
         WHERE territory_id = ? AND name_normalized = ?
           AND geojson IS NOT NULL AND geojson != ''",
    )
    .bind(territory_id)
    .bind(name_normalized)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Insert or refresh the cached geometry for `(territory_id, name_normalized)`
pub async fn upsert_street_geometry(
    pool: &SqlitePool,
    territory_id: i64,
    name: &str,
    name_normalized: &str,
    geojson: &FeatureCollection,
    source: &str,
) -> Result<()> {
    let geojson_text = serde_json::to_string(geojson)?;

    sqlx::query(
        r#"
        INSERT INTO territory_streets (territory_id, name, name_normalized, geojson, source)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(territory_id, name_normalized) DO UPDATE SET
            name = excluded.name,
            geojson = excluded.geojson,
            source = excluded.source,
            updated_at = datetime('now')
        "#,
    )
    .bind(territory_id)
    .bind(name)
    .bind(name_normalized)
    .bind(geojson_text)
    .bind(source)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a cached street by normalized name
pub async fn find_street(
    pool: &SqlitePool,
    territory_id: i64,
    name_normalized: &str,
) -> Result<Option<TerritoryStreet>> {
    let row = sqlx::query(
        "SELECT id, territory_id, name, name_normalized, geojson, source
         FROM territory_streets
         WHERE territory_id = ? AND name_normalized = ?",
    )
    .bind(territory_id)
    .bind(name_normalized)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let geojson_text: Option<String> = row.get("geojson");
    let geojson = match geojson_text.as_deref() {
        Some(text) if !text.is_empty() => Some(serde_json::from_str(text)?),
        _ => None,
    };

    Ok(Some(TerritoryStreet {
        id: row.get("id"),
        territory_id: row.get("territory_id"),
        name: row.get("name"),
        name_normalized: row.get("name_normalized"),
        geojson,
        source: row.get("source"),
    }))
}

/// Count cached street rows for a territory
pub async fn count_streets(pool: &SqlitePool, territory_id: i64) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM territory_streets WHERE territory_id = ?")
        .bind(territory_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{territories, test_pool};
    use fieldmap_common::geo::Feature;

    fn geometry() -> FeatureCollection {
        FeatureCollection::new(vec![Feature::line_string(
            "Oak Street".to_string(),
            Some(99),
            vec![[-73.6, 45.5], [-73.59, 45.51]],
        )])
    }

    #[tokio::test]
    async fn upsert_then_lookup_round_trips_geometry() {
        let pool = test_pool().await;
        let territory = territories::create_territory(&pool, 1, "T-01", "Test")
            .await
            .unwrap();

        assert!(!has_street_geometry(&pool, territory.id, "oak street")
            .await
            .unwrap());

        upsert_street_geometry(
            &pool,
            territory.id,
            "Oak Street",
            "oak street",
            &geometry(),
            SOURCE_OVERPASS,
        )
        .await
        .unwrap();

        assert!(has_street_geometry(&pool, territory.id, "oak street")
            .await
            .unwrap());

        let street = find_street(&pool, territory.id, "oak street")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(street.name, "Oak Street");
        assert_eq!(street.source.as_deref(), Some(SOURCE_OVERPASS));
        assert_eq!(street.geojson.unwrap(), geometry());
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_territory_and_normalized_name() {
        let pool = test_pool().await;
        let territory = territories::create_territory(&pool, 1, "T-01", "Test")
            .await
            .unwrap();

        upsert_street_geometry(
            &pool,
            territory.id,
            "Oak Street",
            "oak street",
            &geometry(),
            SOURCE_OVERPASS,
        )
        .await
        .unwrap();
        // Second upsert for the same key replaces rather than duplicates
        upsert_street_geometry(
            &pool,
            territory.id,
            "OAK STREET",
            "oak street",
            &geometry(),
            SOURCE_OVERPASS,
        )
        .await
        .unwrap();

        assert_eq!(count_streets(&pool, territory.id).await.unwrap(), 1);
        let street = find_street(&pool, territory.id, "oak street")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(street.name, "OAK STREET");
    }
}
