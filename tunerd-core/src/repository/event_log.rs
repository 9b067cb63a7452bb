use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;

use crate::models::{EventCategory, EventDetails, EventLevel, EventLogEntry};
use crate::store::{EventFilter, EventQuery, EventSink};
use crate::{Error, Result};

/// Append-only event log repository
#[derive(Clone)]
pub struct EventLogRepository {
    pool: PgPool,
}

impl EventLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database row to EventLogEntry
    fn row_to_entry(&self, row: PgRow) -> Result<EventLogEntry> {
        let level_str: String = row.try_get("level")?;
        let category_str: String = row.try_get("category")?;
        let details_json: serde_json::Value = row.try_get("details")?;

        Ok(EventLogEntry {
            id: row.try_get("id")?,
            level: EventLevel::from_str(&level_str).map_err(Error::Internal)?,
            category: EventCategory::from_str(&category_str).map_err(Error::Internal)?,
            message: row.try_get("message")?,
            details: serde_json::from_value::<EventDetails>(details_json)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl EventSink for EventLogRepository {
    async fn record(&self, entry: EventLogEntry) -> Result<()> {
        let details_json = serde_json::to_value(&entry.details)?;

        sqlx::query(
            "INSERT INTO event_log (id, level, category, message, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&entry.id)
        .bind(entry.level.as_str())
        .bind(entry.category.as_str())
        .bind(&entry.message)
        .bind(&details_json)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            level = entry.level.as_str(),
            category = entry.category.as_str(),
            "Event log entry recorded"
        );

        Ok(())
    }
}

#[async_trait]
impl EventQuery for EventLogRepository {
    async fn query(&self, filter: EventFilter) -> Result<Vec<EventLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, level, category, message, details, created_at
             FROM event_log
             WHERE ($1::text IS NULL OR level = $1)
               AND ($2::text IS NULL OR category = $2)
               AND ($3::timestamptz IS NULL OR created_at >= $3)
             ORDER BY created_at DESC
             LIMIT $4",
        )
        .bind(filter.level.map(EventLevel::as_str))
        .bind(filter.category.map(EventCategory::as_str))
        .bind(filter.since)
        .bind(filter.limit.unwrap_or(500))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|row| self.row_to_entry(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_record_and_query() {
        // Integration test placeholder
    }
}
