use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{AccountId, SourceId};

/// One provider-supplied upstream stream, identified by the
/// provider-assigned `provider_stream_id` within one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub account_id: AccountId,
    /// Provider-assigned stream id, unique within the account
    pub provider_stream_id: i64,
    pub name: String,
    pub icon_url: Option<String>,
    pub category: Option<String>,
    /// Quality tags reported by the provider (e.g. "HD", "4K").
    /// Kept sorted so tag order reported by the provider never registers
    /// as a metadata change.
    pub qualities: Vec<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Source {
    /// Materialize a scanned catalog entry as a stored source.
    #[must_use]
    pub fn from_scan(account_id: AccountId, scanned: &ScannedSource) -> Self {
        let now = Utc::now();
        Self {
            id: SourceId::new(),
            account_id,
            provider_stream_id: scanned.provider_stream_id,
            name: scanned.name.clone(),
            icon_url: scanned.icon_url.clone(),
            category: scanned.category.clone(),
            qualities: normalize_qualities(&scanned.qualities),
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Whether a fresh scan entry carries different name/icon/quality
    /// metadata than this stored row.
    #[must_use]
    pub fn metadata_differs(&self, scanned: &ScannedSource) -> bool {
        self.name != scanned.name
            || self.icon_url != scanned.icon_url
            || self.qualities != normalize_qualities(&scanned.qualities)
    }

    /// Apply a fresh scan entry's metadata in place.
    pub fn apply_scan(&mut self, scanned: &ScannedSource) {
        self.name = scanned.name.clone();
        self.icon_url = scanned.icon_url.clone();
        self.category = scanned.category.clone();
        self.qualities = normalize_qualities(&scanned.qualities);
        self.last_seen_at = Utc::now();
    }
}

/// Catalog entry as fetched from a provider scan, before it has a stored
/// identity. Produced by the external provider client, consumed by the
/// change detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannedSource {
    pub provider_stream_id: i64,
    pub name: String,
    pub icon_url: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub qualities: Vec<String>,
}

impl ScannedSource {
    #[must_use]
    pub fn new(provider_stream_id: i64, name: impl Into<String>) -> Self {
        Self {
            provider_stream_id,
            name: name.into(),
            icon_url: None,
            category: None,
            qualities: Vec::new(),
        }
    }
}

fn normalize_qualities(qualities: &[String]) -> Vec<String> {
    let mut out: Vec<String> = qualities.to_vec();
    out.sort();
    out.dedup();
    out
}
