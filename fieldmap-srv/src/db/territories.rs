//! Territory database operations
//!
//! Territory CRUD proper lives outside this subsystem; the import pipeline
//! only needs to resolve a territory row for organization scoping, plus a
//! create used by seeding and tests.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

/// Territory record (scoping fields only)
#[derive(Debug, Clone)]
pub struct Territory {
    pub id: i64,
    pub organization_id: i64,
    pub code: String,
    pub name: String,
}

/// Insert a territory and return it
pub async fn create_territory(
    pool: &SqlitePool,
    organization_id: i64,
    code: &str,
    name: &str,
) -> Result<Territory> {
    let result = sqlx::query(
        "INSERT INTO territories (organization_id, code, name) VALUES (?, ?, ?)",
    )
    .bind(organization_id)
    .bind(code)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(Territory {
        id: result.last_insert_rowid(),
        organization_id,
        code: code.to_string(),
        name: name.to_string(),
    })
}

/// Load territory by id
pub async fn find_territory(pool: &SqlitePool, id: i64) -> Result<Option<Territory>> {
    let row = sqlx::query("SELECT id, organization_id, code, name FROM territories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| Territory {
        id: row.get("id"),
        organization_id: row.get("organization_id"),
        code: row.get("code"),
        name: row.get("name"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn create_and_find_territory() {
        let pool = test_pool().await;

        let territory = create_territory(&pool, 1, "T-01", "Downtown North")
            .await
            .expect("Failed to create territory");

        let loaded = find_territory(&pool, territory.id)
            .await
            .expect("Failed to load territory")
            .expect("Territory not found");

        assert_eq!(loaded.organization_id, 1);
        assert_eq!(loaded.code, "T-01");
        assert_eq!(loaded.name, "Downtown North");
    }

    #[tokio::test]
    async fn code_is_unique_per_organization() {
        let pool = test_pool().await;

        create_territory(&pool, 1, "T-01", "A").await.unwrap();
        assert!(create_territory(&pool, 1, "T-01", "B").await.is_err());
        // Same code under another organization is fine
        create_territory(&pool, 2, "T-01", "C").await.unwrap();
    }
}
