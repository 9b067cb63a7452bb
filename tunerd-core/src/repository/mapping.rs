use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};

use crate::models::{ChannelId, Mapping, MappingId, SourceId};
use crate::store::{MappingStore, RenumberOutcome};
use crate::Result;

/// Mapping repository for database operations
#[derive(Clone)]
pub struct MappingRepository {
    pool: PgPool,
}

const MAPPING_COLUMNS: &str =
    "id, channel_id, source_id, is_primary, priority, is_manual, match_confidence, created_at";

impl MappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Renumber one channel's mappings inside an open transaction.
    ///
    /// Rows are locked with `FOR UPDATE` so a concurrent pass for the same
    /// channel blocks until this unit commits.
    async fn renumber_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        channel_id: &ChannelId,
    ) -> Result<Option<MappingId>> {
        let rows = sqlx::query(
            "SELECT id, is_primary, priority FROM mappings
             WHERE channel_id = $1
             ORDER BY is_primary DESC, priority ASC
             FOR UPDATE",
        )
        .bind(channel_id.as_str())
        .fetch_all(&mut **tx)
        .await?;

        let has_primary = rows
            .iter()
            .any(|row| row.try_get::<bool, _>("is_primary").unwrap_or(false));

        let mut promoted = None;
        for (index, row) in rows.iter().enumerate() {
            let id: String = row.try_get("id")?;
            let make_primary = index == 0 && !has_primary;

            sqlx::query(
                "UPDATE mappings SET priority = $2, is_primary = is_primary OR $3 WHERE id = $1",
            )
            .bind(&id)
            .bind(index as i32)
            .bind(make_primary)
            .execute(&mut **tx)
            .await?;

            if make_primary {
                promoted = Some(MappingId::from_string(id));
            }
        }

        Ok(promoted)
    }

    /// Convert database row to Mapping
    fn row_to_mapping(&self, row: PgRow) -> Result<Mapping> {
        Ok(Mapping {
            id: MappingId::from_string(row.try_get("id")?),
            channel_id: ChannelId::from_string(row.try_get("channel_id")?),
            source_id: SourceId::from_string(row.try_get("source_id")?),
            is_primary: row.try_get("is_primary")?,
            priority: row.try_get("priority")?,
            is_manual: row.try_get("is_manual")?,
            match_confidence: row.try_get("match_confidence")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl MappingStore for MappingRepository {
    async fn get(&self, mapping_id: &MappingId) -> Result<Option<Mapping>> {
        let row = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS} FROM mappings WHERE id = $1"
        ))
        .bind(mapping_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_mapping(row)?)),
            None => Ok(None),
        }
    }

    async fn get_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Mapping>> {
        let rows = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS} FROM mappings
             WHERE channel_id = $1
             ORDER BY is_primary DESC, priority ASC"
        ))
        .bind(channel_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_mapping(row)).collect()
    }

    async fn get_by_source(&self, source_id: &SourceId) -> Result<Vec<Mapping>> {
        let rows = sqlx::query(&format!(
            "SELECT {MAPPING_COLUMNS} FROM mappings WHERE source_id = $1"
        ))
        .bind(source_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_mapping(row)).collect()
    }

    async fn insert(&self, mapping: Mapping) -> Result<Mapping> {
        let row = sqlx::query(&format!(
            "INSERT INTO mappings ({MAPPING_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {MAPPING_COLUMNS}"
        ))
        .bind(mapping.id.as_str())
        .bind(mapping.channel_id.as_str())
        .bind(mapping.source_id.as_str())
        .bind(mapping.is_primary)
        .bind(mapping.priority)
        .bind(mapping.is_manual)
        .bind(mapping.match_confidence)
        .bind(mapping.created_at)
        .fetch_one(&self.pool)
        .await?;

        self.row_to_mapping(row)
    }

    async fn delete(&self, mapping_id: &MappingId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM mappings WHERE id = $1")
            .bind(mapping_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn max_priority(&self, channel_id: &ChannelId) -> Result<Option<i32>> {
        let max: Option<i32> =
            sqlx::query_scalar("SELECT MAX(priority) FROM mappings WHERE channel_id = $1")
                .bind(channel_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(max)
    }

    async fn renumber_priorities(&self, channel_id: &ChannelId) -> Result<RenumberOutcome> {
        let mut tx = self.pool.begin().await?;
        let promoted = Self::renumber_in_tx(&mut tx, channel_id).await?;
        tx.commit().await?;

        Ok(RenumberOutcome {
            removed: 0,
            promoted,
        })
    }

    async fn remove_and_renumber(
        &self,
        channel_id: &ChannelId,
        remove: &[MappingId],
    ) -> Result<RenumberOutcome> {
        let mut tx = self.pool.begin().await?;

        let mut removed = 0;
        for mapping_id in remove {
            let result = sqlx::query("DELETE FROM mappings WHERE id = $1 AND channel_id = $2")
                .bind(mapping_id.as_str())
                .bind(channel_id.as_str())
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected() as usize;
        }

        let promoted = Self::renumber_in_tx(&mut tx, channel_id).await?;
        tx.commit().await?;

        Ok(RenumberOutcome { removed, promoted })
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_remove_and_renumber_transactional() {
        // Integration test placeholder
    }
}
