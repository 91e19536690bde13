//! Address database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Persisted address row
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub id: i64,
    pub organization_id: i64,
    pub territory_id: i64,
    pub civic_number: Option<String>,
    pub unit: Option<String>,
    pub label: Option<String>,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: String,
    pub do_not_call: bool,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub next_visit_at: Option<DateTime<Utc>>,
}

/// Row values for a new address insert
#[derive(Debug, Clone, Default)]
pub struct NewAddress {
    pub organization_id: i64,
    pub territory_id: i64,
    pub civic_number: Option<String>,
    pub unit: Option<String>,
    pub label: Option<String>,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub street: Option<String>,
    pub street2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: String,
    pub do_not_call: bool,
    pub next_visit_at: Option<DateTime<Utc>>,
}

/// Coordinates are stored at 7-decimal precision
pub fn round_coordinate(value: f64) -> f64 {
    (value * 1e7).round() / 1e7
}

fn address_from_row(row: &SqliteRow) -> Address {
    Address {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        territory_id: row.get("territory_id"),
        civic_number: row.get("civic_number"),
        unit: row.get("unit"),
        label: row.get("label"),
        contact_name: row.get("contact_name"),
        phone: row.get("phone"),
        notes: row.get("notes"),
        street: row.get("street"),
        street2: row.get("street2"),
        city: row.get("city"),
        region: row.get("region"),
        postal_code: row.get("postal_code"),
        country: row.get("country"),
        lat: row.get("lat"),
        lng: row.get("lng"),
        status: row.get("status"),
        do_not_call: row.get("do_not_call"),
        last_visit_at: row.get("last_visit_at"),
        next_visit_at: row.get("next_visit_at"),
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO addresses (
        organization_id, territory_id, civic_number, unit, label,
        contact_name, phone, notes, street, street2, city, region,
        postal_code, country, lat, lng, status, do_not_call, next_visit_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn bind_new_address<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    address: &'q NewAddress,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(address.organization_id)
        .bind(address.territory_id)
        .bind(&address.civic_number)
        .bind(&address.unit)
        .bind(&address.label)
        .bind(&address.contact_name)
        .bind(&address.phone)
        .bind(&address.notes)
        .bind(&address.street)
        .bind(&address.street2)
        .bind(&address.city)
        .bind(&address.region)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(address.lat.map(round_coordinate))
        .bind(address.lng.map(round_coordinate))
        .bind(&address.status)
        .bind(address.do_not_call)
        .bind(address.next_visit_at)
}

/// Insert one address and return the persisted row
pub async fn insert_address(pool: &SqlitePool, address: &NewAddress) -> Result<Address> {
    let result = bind_new_address(sqlx::query(INSERT_SQL), address)
        .execute(pool)
        .await?;

    let row = find_address(pool, result.last_insert_rowid())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Inserted address row disappeared"))?;
    Ok(row)
}

/// Insert a batch of addresses in one transaction, returning the count.
///
/// An empty batch is a no-op, not an error.
pub async fn insert_addresses(pool: &SqlitePool, addresses: &[NewAddress]) -> Result<u64> {
    if addresses.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for address in addresses {
        bind_new_address(sqlx::query(INSERT_SQL), address)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(addresses.len() as u64)
}

/// Load address by id
pub async fn find_address(pool: &SqlitePool, id: i64) -> Result<Option<Address>> {
    let row = sqlx::query("SELECT * FROM addresses WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(address_from_row))
}

/// Load all addresses in a territory, oldest first
pub async fn addresses_for_territory(pool: &SqlitePool, territory_id: i64) -> Result<Vec<Address>> {
    let rows = sqlx::query("SELECT * FROM addresses WHERE territory_id = ? ORDER BY id")
        .bind(territory_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(address_from_row).collect())
}

/// Persist the full editable field set of an existing address
pub async fn update_address(pool: &SqlitePool, address: &Address) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE addresses SET
            civic_number = ?, unit = ?, label = ?, contact_name = ?,
            phone = ?, notes = ?, street = ?, street2 = ?, city = ?,
            region = ?, postal_code = ?, country = ?, lat = ?, lng = ?,
            status = ?, do_not_call = ?, last_visit_at = ?, next_visit_at = ?,
            updated_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(&address.civic_number)
    .bind(&address.unit)
    .bind(&address.label)
    .bind(&address.contact_name)
    .bind(&address.phone)
    .bind(&address.notes)
    .bind(&address.street)
    .bind(&address.street2)
    .bind(&address.city)
    .bind(&address.region)
    .bind(&address.postal_code)
    .bind(&address.country)
    .bind(address.lat.map(round_coordinate))
    .bind(address.lng.map(round_coordinate))
    .bind(&address.status)
    .bind(address.do_not_call)
    .bind(address.last_visit_at)
    .bind(address.next_visit_at)
    .bind(address.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update only the visit-derived projection fields
pub async fn sync_visit_projection(
    pool: &SqlitePool,
    address_id: i64,
    status: &str,
    do_not_call: bool,
    last_visit_at: Option<DateTime<Utc>>,
    next_visit_at: Option<DateTime<Utc>>,
    update_next_visit: bool,
) -> Result<()> {
    if update_next_visit {
        sqlx::query(
            "UPDATE addresses SET status = ?, do_not_call = ?, last_visit_at = ?,
             next_visit_at = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status)
        .bind(do_not_call)
        .bind(last_visit_at)
        .bind(next_visit_at)
        .bind(address_id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "UPDATE addresses SET status = ?, do_not_call = ?, last_visit_at = ?,
             updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status)
        .bind(do_not_call)
        .bind(last_visit_at)
        .bind(address_id)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Delete address by id
pub async fn delete_address(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM addresses WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{territories, test_pool};

    async fn seeded_territory(pool: &SqlitePool) -> i64 {
        territories::create_territory(pool, 1, "T-01", "Test")
            .await
            .unwrap()
            .id
    }

    fn new_address(territory_id: i64) -> NewAddress {
        NewAddress {
            organization_id: 1,
            territory_id,
            civic_number: Some("123".to_string()),
            street: Some("Oak Street".to_string()),
            status: "not_visited".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_and_find_address() {
        let pool = test_pool().await;
        let territory_id = seeded_territory(&pool).await;

        let inserted = insert_address(&pool, &new_address(territory_id))
            .await
            .expect("Failed to insert address");

        assert_eq!(inserted.civic_number.as_deref(), Some("123"));
        assert_eq!(inserted.status, "not_visited");
        assert!(!inserted.do_not_call);
        assert!(inserted.lat.is_none());
    }

    #[tokio::test]
    async fn coordinates_round_to_seven_decimals() {
        let pool = test_pool().await;
        let territory_id = seeded_territory(&pool).await;

        let mut address = new_address(territory_id);
        address.lat = Some(45.123456789);
        address.lng = Some(-73.987654321);

        let inserted = insert_address(&pool, &address).await.unwrap();
        assert_eq!(inserted.lat, Some(45.1234568));
        assert_eq!(inserted.lng, Some(-73.9876543));
    }

    #[tokio::test]
    async fn batch_insert_counts_rows_and_empty_is_noop() {
        let pool = test_pool().await;
        let territory_id = seeded_territory(&pool).await;

        assert_eq!(insert_addresses(&pool, &[]).await.unwrap(), 0);

        let batch = vec![new_address(territory_id), new_address(territory_id)];
        assert_eq!(insert_addresses(&pool, &batch).await.unwrap(), 2);
        assert_eq!(
            addresses_for_territory(&pool, territory_id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn update_round_trips_fields() {
        let pool = test_pool().await;
        let territory_id = seeded_territory(&pool).await;

        let mut address = insert_address(&pool, &new_address(territory_id)).await.unwrap();
        address.status = "contact".to_string();
        address.city = Some("Springfield".to_string());

        update_address(&pool, &address).await.unwrap();

        let loaded = find_address(&pool, address.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, "contact");
        assert_eq!(loaded.city.as_deref(), Some("Springfield"));
    }
}
