use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::AccountId;

/// Provider account (credential set)
///
/// Lifecycle is owned by external credential management; this crate only
/// reads `is_active` when filtering failover candidates and building
/// upstream URLs from `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub base_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn new(name: String, base_url: String) -> Self {
        Self {
            id: AccountId::new(),
            name,
            base_url,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
