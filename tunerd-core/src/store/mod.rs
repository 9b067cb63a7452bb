//! Storage contracts for the mapping engine
//!
//! All state shared between reconciliation (writer) and failover serving
//! (reader) sits behind these traits, so the same services run against the
//! in-memory store in tests and the Postgres repositories in production.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{
    Account, AccountId, Channel, ChannelId, EventCategory, EventLevel, EventLogEntry, Mapping,
    MappingId, Source, SourceId,
};
use crate::Result;

pub use memory::MemoryStore;

/// Outcome of a renumbering pass over one channel's mappings
#[derive(Debug, Clone, Default)]
pub struct RenumberOutcome {
    /// Mappings deleted as part of the pass
    pub removed: usize,
    /// Mapping promoted to primary/priority 0, if the pass promoted one
    pub promoted: Option<MappingId>,
}

/// Durable table of channel-to-source links.
///
/// `get_for_channel` returns a consistent snapshot ordered by
/// `(is_primary desc, priority asc)`. The compound mutation
/// `remove_and_renumber` is atomic with respect to reads: no reader can
/// observe a channel with zero primaries or a priority gap mid-update.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get(&self, mapping_id: &MappingId) -> Result<Option<Mapping>>;

    async fn get_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Mapping>>;

    async fn get_by_source(&self, source_id: &SourceId) -> Result<Vec<Mapping>>;

    async fn insert(&self, mapping: Mapping) -> Result<Mapping>;

    async fn delete(&self, mapping_id: &MappingId) -> Result<bool>;

    async fn max_priority(&self, channel_id: &ChannelId) -> Result<Option<i32>>;

    /// Re-assign contiguous priorities 0..N-1 to the channel's mappings,
    /// preserving relative order, and promote the lowest-priority survivor
    /// to primary if none is currently primary.
    async fn renumber_priorities(&self, channel_id: &ChannelId) -> Result<RenumberOutcome>;

    /// Delete the given mappings of one channel and renumber the survivors
    /// in the same atomic unit.
    async fn remove_and_renumber(
        &self,
        channel_id: &ChannelId,
        remove: &[MappingId],
    ) -> Result<RenumberOutcome>;
}

/// Stored per-provider source catalog
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn get_source(&self, source_id: &SourceId) -> Result<Option<Source>>;

    async fn sources_for_account(&self, account_id: &AccountId) -> Result<Vec<Source>>;

    async fn insert_source(&self, source: Source) -> Result<Source>;

    async fn update_source(&self, source: &Source) -> Result<()>;

    async fn delete_source(&self, source_id: &SourceId) -> Result<bool>;

    /// Stamp `last_seen_at` on sources that survived a scan unchanged.
    async fn touch_last_seen(&self, source_ids: &[SourceId], seen_at: DateTime<Utc>) -> Result<()>;
}

/// Read-only view of the channel lineup
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>>;
}

/// Read-only view of provider accounts
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;
}

/// Append-only event sink. Core services only write; the external viewer
/// queries through [`EventQuery`].
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, entry: EventLogEntry) -> Result<()>;
}

/// Filter for the external log viewer's read-only query
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub level: Option<EventLevel>,
    pub category: Option<EventCategory>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Read-only event log query, consumed by the external viewer
#[async_trait]
pub trait EventQuery: Send + Sync {
    async fn query(&self, filter: EventFilter) -> Result<Vec<EventLogEntry>>;
}

/// Per-channel mutual-exclusion boundary around mapping writes.
///
/// Two write sequences for the same channel (a reconciliation pass and a
/// manual override, or two reconciliation passes touching a shared channel)
/// must not interleave. Reads never take these locks.
#[derive(Default)]
pub struct ChannelLocks {
    locks: DashMap<ChannelId, Arc<Mutex<()>>>,
}

impl ChannelLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock guarding one channel's mapping writes.
    #[must_use]
    pub fn for_channel(&self, channel_id: &ChannelId) -> Arc<Mutex<()>> {
        self.locks
            .entry(channel_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Sort mappings into failover attempt order: primary first, then
/// ascending priority. Ties on priority cannot occur by invariant; if one
/// is ever encountered, the primary wins.
pub fn sort_attempt_order(mappings: &mut [Mapping]) {
    mappings.sort_by(|a, b| {
        b.is_primary
            .cmp(&a.is_primary)
            .then(a.priority.cmp(&b.priority))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Mapping;

    #[test]
    fn test_attempt_order_is_invariant_to_storage_order() {
        let channel_id = ChannelId::new();
        let mut mappings = vec![
            Mapping::auto(channel_id.clone(), SourceId::new(), false, 2, 0.9),
            Mapping::auto(channel_id.clone(), SourceId::new(), true, 0, 0.9),
            Mapping::auto(channel_id, SourceId::new(), false, 1, 0.9),
        ];

        sort_attempt_order(&mut mappings);

        let priorities: Vec<i32> = mappings.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2]);
        assert!(mappings[0].is_primary);
    }

    #[test]
    fn test_primary_wins_priority_tie() {
        let channel_id = ChannelId::new();
        let mut mappings = vec![
            Mapping::auto(channel_id.clone(), SourceId::new(), false, 0, 0.9),
            Mapping::auto(channel_id, SourceId::new(), true, 0, 0.9),
        ];

        sort_attempt_order(&mut mappings);
        assert!(mappings[0].is_primary);
    }
}
