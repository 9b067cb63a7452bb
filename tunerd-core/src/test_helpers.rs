//! Test helpers and fixtures for tunerd-core tests
//!
//! Common fixtures to reduce boilerplate across the unit test modules.

use chrono::Utc;

use crate::models::{Account, AccountId, Channel, ChannelId, ScannedSource, Source, SourceId};

/// Create a test channel ID
pub fn test_channel_id(id: &str) -> ChannelId {
    ChannelId::from_string(id.to_string())
}

/// Generate a random account ID for testing
pub fn random_account_id() -> AccountId {
    AccountId::new()
}

/// Test fixture builder for Channel
pub struct ChannelFixture {
    id: ChannelId,
    key: String,
    name: String,
    enabled: bool,
}

impl ChannelFixture {
    pub fn new(name: &str) -> Self {
        Self {
            id: ChannelId::new(),
            key: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            enabled: true,
        }
    }

    pub fn with_id(mut self, id: ChannelId) -> Self {
        self.id = id;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn build(self) -> Channel {
        Channel {
            id: self.id,
            key: self.key,
            name: self.name,
            icon_url: None,
            enabled: self.enabled,
            sort_order: 0,
            is_synthetic: false,
            created_at: Utc::now(),
        }
    }
}

/// Test fixture builder for Source
pub struct SourceFixture {
    id: SourceId,
    account_id: AccountId,
    provider_stream_id: i64,
    name: String,
    qualities: Vec<String>,
}

impl SourceFixture {
    pub fn new(account_id: AccountId, provider_stream_id: i64, name: &str) -> Self {
        Self {
            id: SourceId::new(),
            account_id,
            provider_stream_id,
            name: name.to_string(),
            qualities: Vec::new(),
        }
    }

    pub fn with_qualities(mut self, qualities: &[&str]) -> Self {
        self.qualities = qualities.iter().map(|q| (*q).to_string()).collect();
        self
    }

    pub fn build(self) -> Source {
        let now = Utc::now();
        Source {
            id: self.id,
            account_id: self.account_id,
            provider_stream_id: self.provider_stream_id,
            name: self.name,
            icon_url: None,
            category: None,
            qualities: self.qualities,
            first_seen_at: now,
            last_seen_at: now,
        }
    }
}

/// Scanned catalog entry shorthand
pub fn scanned(provider_stream_id: i64, name: &str) -> ScannedSource {
    ScannedSource::new(provider_stream_id, name)
}

/// Active provider account shorthand
pub fn active_account(name: &str) -> Account {
    Account::new(name.to_string(), format!("http://{name}.example.com"))
}
