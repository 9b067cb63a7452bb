use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::models::{Channel, ChannelId};
use crate::store::ChannelDirectory;
use crate::Result;

/// Channel lineup repository (read-only from this crate's point of view;
/// lifecycle is owned by the external catalog import)
#[derive(Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

const CHANNEL_COLUMNS: &str =
    "id, key, name, icon_url, enabled, sort_order, is_synthetic, created_at";

impl ChannelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database row to Channel
    fn row_to_channel(&self, row: PgRow) -> Result<Channel> {
        Ok(Channel {
            id: ChannelId::from_string(row.try_get("id")?),
            key: row.try_get("key")?,
            name: row.try_get("name")?,
            icon_url: row.try_get("icon_url")?,
            enabled: row.try_get("enabled")?,
            sort_order: row.try_get("sort_order")?,
            is_synthetic: row.try_get("is_synthetic")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl ChannelDirectory for ChannelRepository {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY sort_order ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_channel(row)).collect()
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>> {
        let row = sqlx::query(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = $1"
        ))
        .bind(channel_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_channel(row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_list_channels() {
        // Integration test placeholder
    }
}
