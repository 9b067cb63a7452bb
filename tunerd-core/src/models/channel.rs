use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::ChannelId;

/// Channel in the consumer-facing lineup
///
/// Downstream guide/player software addresses a channel by its stable
/// `key`. Lifecycle is owned by the external catalog import; reconciliation
/// and failover only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    /// External channel key (e.g. the guide's channel identifier)
    pub key: String,
    pub name: String,
    pub icon_url: Option<String>,
    pub enabled: bool,
    /// Display-order hint for the external guide
    pub sort_order: i32,
    /// Created ad hoc from an unmatched source rather than a canonical guide
    pub is_synthetic: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    #[must_use]
    pub fn new(key: String, name: String) -> Self {
        Self {
            id: ChannelId::new(),
            key,
            name,
            icon_url: None,
            enabled: true,
            sort_order: 0,
            is_synthetic: false,
            created_at: Utc::now(),
        }
    }
}
