use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::models::{Account, AccountId};
use crate::store::AccountDirectory;
use crate::Result;

/// Provider account repository (read-only; credential management owns the
/// lifecycle)
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert database row to Account
    fn row_to_account(&self, row: PgRow) -> Result<Account> {
        Ok(Account {
            id: AccountId::from_string(row.try_get("id")?),
            name: row.try_get("name")?,
            base_url: row.try_get("base_url")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl AccountDirectory for AccountRepository {
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, name, base_url, is_active, created_at
             FROM accounts
             WHERE id = $1",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_account(row)?)),
            None => Ok(None),
        }
    }
}
