//! Visit database operations
//!
//! Visits are the timestamped outcome log per address. The address's
//! status/do_not_call/last_visit_at are a projection of the most recent
//! visit, recomputed by the API layer on every create/update/delete.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Persisted visit row
#[derive(Debug, Clone, Serialize)]
pub struct Visit {
    pub id: i64,
    pub organization_id: i64,
    pub address_id: i64,
    pub user_id: i64,
    pub visited_at: DateTime<Utc>,
    pub result: String,
    pub action: Option<String>,
    pub openness: Option<String>,
    pub observed_language: Option<String>,
    pub notes: Option<String>,
    pub person_name: Option<String>,
    pub do_not_call: bool,
}

/// Field set written on create and update
#[derive(Debug, Clone)]
pub struct VisitFields {
    pub visited_at: DateTime<Utc>,
    pub result: String,
    pub action: Option<String>,
    pub openness: Option<String>,
    pub observed_language: Option<String>,
    pub notes: Option<String>,
    pub person_name: Option<String>,
    pub do_not_call: bool,
}

fn visit_from_row(row: &SqliteRow) -> Visit {
    Visit {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        address_id: row.get("address_id"),
        user_id: row.get("user_id"),
        visited_at: row.get("visited_at"),
        result: row.get("result"),
        action: row.get("action"),
        openness: row.get("openness"),
        observed_language: row.get("observed_language"),
        notes: row.get("notes"),
        person_name: row.get("person_name"),
        do_not_call: row.get("do_not_call"),
    }
}

/// Insert a visit and return the persisted row
pub async fn insert_visit(
    pool: &SqlitePool,
    organization_id: i64,
    address_id: i64,
    user_id: i64,
    fields: &VisitFields,
) -> Result<Visit> {
    let result = sqlx::query(
        r#"
        INSERT INTO visits (
            organization_id, address_id, user_id, visited_at, result,
            action, openness, observed_language, notes, person_name, do_not_call
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(organization_id)
    .bind(address_id)
    .bind(user_id)
    .bind(fields.visited_at)
    .bind(&fields.result)
    .bind(&fields.action)
    .bind(&fields.openness)
    .bind(&fields.observed_language)
    .bind(&fields.notes)
    .bind(&fields.person_name)
    .bind(fields.do_not_call)
    .execute(pool)
    .await?;

    let visit = find_visit(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Inserted visit row disappeared"))?;
    Ok(visit)
}

/// Overwrite a visit's editable fields
pub async fn update_visit(pool: &SqlitePool, id: i64, fields: &VisitFields) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE visits SET
            visited_at = ?, result = ?, action = ?, openness = ?,
            observed_language = ?, notes = ?, person_name = ?,
            do_not_call = ?, updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(fields.visited_at)
    .bind(&fields.result)
    .bind(&fields.action)
    .bind(&fields.openness)
    .bind(&fields.observed_language)
    .bind(&fields.notes)
    .bind(&fields.person_name)
    .bind(fields.do_not_call)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete visit by id
pub async fn delete_visit(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM visits WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Load visit by id
pub async fn find_visit(pool: &SqlitePool, id: i64) -> Result<Option<Visit>> {
    let row = sqlx::query("SELECT * FROM visits WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(visit_from_row))
}

/// The address's most recent visit by visited_at, if any
pub async fn latest_visit(pool: &SqlitePool, address_id: i64) -> Result<Option<Visit>> {
    let row = sqlx::query(
        "SELECT * FROM visits WHERE address_id = ?
         ORDER BY visited_at DESC, id DESC LIMIT 1",
    )
    .bind(address_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(visit_from_row))
}

/// All visits for an address, newest first
pub async fn visits_for_address(pool: &SqlitePool, address_id: i64) -> Result<Vec<Visit>> {
    let rows = sqlx::query(
        "SELECT * FROM visits WHERE address_id = ?
         ORDER BY visited_at DESC, id DESC",
    )
    .bind(address_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(visit_from_row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{addresses, territories, test_pool};
    use chrono::TimeZone;

    fn fields(visited_at: DateTime<Utc>, result: &str) -> VisitFields {
        VisitFields {
            visited_at,
            result: result.to_string(),
            action: None,
            openness: None,
            observed_language: None,
            notes: None,
            person_name: None,
            do_not_call: false,
        }
    }

    async fn seeded_address(pool: &SqlitePool) -> i64 {
        let territory = territories::create_territory(pool, 1, "T-01", "Test")
            .await
            .unwrap();
        let address = addresses::insert_address(
            pool,
            &addresses::NewAddress {
                organization_id: 1,
                territory_id: territory.id,
                street: Some("Oak Street".to_string()),
                status: "not_visited".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        address.id
    }

    #[tokio::test]
    async fn latest_visit_orders_by_visited_at() {
        let pool = test_pool().await;
        let address_id = seeded_address(&pool).await;

        let early = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 2, 1, 14, 30, 0).unwrap();

        // Inserted out of order on purpose
        insert_visit(&pool, 1, address_id, 7, &fields(late, "contact"))
            .await
            .unwrap();
        insert_visit(&pool, 1, address_id, 7, &fields(early, "absent"))
            .await
            .unwrap();

        let latest = latest_visit(&pool, address_id).await.unwrap().unwrap();
        assert_eq!(latest.result, "contact");
        assert_eq!(latest.visited_at, late);

        let all = visits_for_address(&pool, address_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].result, "contact");
    }

    #[tokio::test]
    async fn update_and_delete_visit() {
        let pool = test_pool().await;
        let address_id = seeded_address(&pool).await;

        let when = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        let visit = insert_visit(&pool, 1, address_id, 7, &fields(when, "absent"))
            .await
            .unwrap();

        let mut updated = fields(when, "contact");
        updated.do_not_call = true;
        update_visit(&pool, visit.id, &updated).await.unwrap();

        let loaded = find_visit(&pool, visit.id).await.unwrap().unwrap();
        assert_eq!(loaded.result, "contact");
        assert!(loaded.do_not_call);

        delete_visit(&pool, visit.id).await.unwrap();
        assert!(find_visit(&pool, visit.id).await.unwrap().is_none());
    }
}
