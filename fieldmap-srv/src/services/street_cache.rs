//! Street geometry caching
//!
//! At most one successful geometry fetch is persisted per street per
//! territory. The fetch itself is injected so the caching rule stays
//! independent of the Overpass client (and testable without a network).

use std::future::Future;

use fieldmap_common::geo::FeatureCollection;
use fieldmap_common::normalize::normalize_place_name;
use sqlx::SqlitePool;

use crate::db::streets;

/// Cache the street's line geometry unless a non-empty entry already
/// exists. `fetch` runs only on a cache miss; returning `None` from it
/// (no geometry found, or upstream down) writes nothing and is not an
/// error. Returns true when a row was written.
pub async fn store_street_geometry<F, Fut>(
    pool: &SqlitePool,
    territory_id: i64,
    street: &str,
    fetch: F,
) -> anyhow::Result<bool>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Option<FeatureCollection>>,
{
    let street = street.trim();
    if street.is_empty() {
        return Ok(false);
    }

    let normalized = normalize_place_name(street);
    if normalized.is_empty() {
        return Ok(false);
    }

    if streets::has_street_geometry(pool, territory_id, &normalized).await? {
        return Ok(false);
    }

    let Some(geojson) = fetch().await else {
        return Ok(false);
    };

    streets::upsert_street_geometry(
        pool,
        territory_id,
        street,
        &normalized,
        &geojson,
        streets::SOURCE_OVERPASS,
    )
    .await?;

    tracing::info!(territory_id, street, "Cached street geometry");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{territories, test_pool};
    use fieldmap_common::geo::Feature;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn geometry() -> FeatureCollection {
        FeatureCollection::new(vec![Feature::line_string(
            "Oak Street".to_string(),
            Some(1),
            vec![[-73.6, 45.5], [-73.59, 45.51]],
        )])
    }

    #[tokio::test]
    async fn second_store_short_circuits_without_fetching() {
        let pool = test_pool().await;
        let territory = territories::create_territory(&pool, 1, "T-01", "Test")
            .await
            .unwrap();
        let fetches = AtomicUsize::new(0);

        let wrote = store_street_geometry(&pool, territory.id, "Oak Street", || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Some(geometry())
        })
        .await
        .unwrap();
        assert!(wrote);

        // Different spelling, same normalized key: no second fetch
        let wrote = store_street_geometry(&pool, territory.id, "OAK  STREET", || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Some(geometry())
        })
        .await
        .unwrap();
        assert!(!wrote);

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(streets::count_streets(&pool, territory.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fetch_returning_none_writes_nothing() {
        let pool = test_pool().await;
        let territory = territories::create_territory(&pool, 1, "T-01", "Test")
            .await
            .unwrap();

        let wrote = store_street_geometry(&pool, territory.id, "Oak Street", || async { None })
            .await
            .unwrap();
        assert!(!wrote);
        assert_eq!(streets::count_streets(&pool, territory.id).await.unwrap(), 0);

        // A later call may retry the fetch since nothing was cached
        let wrote = store_street_geometry(&pool, territory.id, "Oak Street", || async {
            Some(geometry())
        })
        .await
        .unwrap();
        assert!(wrote);
    }

    #[tokio::test]
    async fn blank_street_is_a_noop() {
        let pool = test_pool().await;
        let territory = territories::create_territory(&pool, 1, "T-01", "Test")
            .await
            .unwrap();

        let wrote = store_street_geometry(&pool, territory.id, "  --- ", || async {
            Some(geometry())
        })
        .await
        .unwrap();
        assert!(!wrote);
    }
}
