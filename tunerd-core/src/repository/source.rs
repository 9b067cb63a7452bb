use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::models::{AccountId, Source, SourceId};
use crate::store::SourceCatalog;
use crate::Result;

/// Source catalog repository for database operations
#[derive(Clone)]
pub struct SourceRepository {
    pool: PgPool,
}

const SOURCE_COLUMNS: &str = "id, account_id, provider_stream_id, name, icon_url, category, \
                              qualities, first_seen_at, last_seen_at";

impl SourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database row to Source
    fn row_to_source(&self, row: PgRow) -> Result<Source> {
        let qualities_json: serde_json::Value = row.try_get("qualities")?;
        let qualities: Vec<String> = serde_json::from_value(qualities_json)?;

        Ok(Source {
            id: SourceId::from_string(row.try_get("id")?),
            account_id: AccountId::from_string(row.try_get("account_id")?),
            provider_stream_id: row.try_get("provider_stream_id")?,
            name: row.try_get("name")?,
            icon_url: row.try_get("icon_url")?,
            category: row.try_get("category")?,
            qualities,
            first_seen_at: row.try_get("first_seen_at")?,
            last_seen_at: row.try_get("last_seen_at")?,
        })
    }
}

#[async_trait]
impl SourceCatalog for SourceRepository {
    async fn get_source(&self, source_id: &SourceId) -> Result<Option<Source>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"
        ))
        .bind(source_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_source(row)?)),
            None => Ok(None),
        }
    }

    async fn sources_for_account(&self, account_id: &AccountId) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE account_id = $1"
        ))
        .bind(account_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_source(row)).collect()
    }

    async fn insert_source(&self, source: Source) -> Result<Source> {
        let qualities_json = serde_json::to_value(&source.qualities)?;

        let row = sqlx::query(&format!(
            "INSERT INTO sources ({SOURCE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {SOURCE_COLUMNS}"
        ))
        .bind(source.id.as_str())
        .bind(source.account_id.as_str())
        .bind(source.provider_stream_id)
        .bind(&source.name)
        .bind(&source.icon_url)
        .bind(&source.category)
        .bind(&qualities_json)
        .bind(source.first_seen_at)
        .bind(source.last_seen_at)
        .fetch_one(&self.pool)
        .await?;

        self.row_to_source(row)
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        let qualities_json = serde_json::to_value(&source.qualities)?;

        sqlx::query(
            "UPDATE sources
             SET name = $2, icon_url = $3, category = $4, qualities = $5, last_seen_at = $6
             WHERE id = $1",
        )
        .bind(source.id.as_str())
        .bind(&source.name)
        .bind(&source.icon_url)
        .bind(&source.category)
        .bind(&qualities_json)
        .bind(source.last_seen_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_source(&self, source_id: &SourceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(source_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_seen(
        &self,
        source_ids: &[SourceId],
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        if source_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = source_ids.iter().map(|id| id.as_str().to_string()).collect();
        sqlx::query("UPDATE sources SET last_seen_at = $2 WHERE id = ANY($1)")
            .bind(&ids)
            .bind(seen_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
