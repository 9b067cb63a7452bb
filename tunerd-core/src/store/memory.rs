//! In-memory store implementation
//!
//! Backs deterministic tests and embedded deployments. Every trait method
//! takes a consistent snapshot or performs its mutation under a single
//! write guard, so the atomicity contract matches the Postgres
//! repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::{
    Account, AccountId, Channel, ChannelId, EventLogEntry, Mapping, MappingId, Source, SourceId,
};
use crate::store::{
    AccountDirectory, ChannelDirectory, EventFilter, EventQuery, EventSink, MappingStore,
    RenumberOutcome, SourceCatalog,
};
use crate::{Error, Result};

#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountId, Account>>,
    channels: RwLock<HashMap<ChannelId, Channel>>,
    sources: RwLock<HashMap<SourceId, Source>>,
    mappings: RwLock<HashMap<MappingId, Mapping>>,
    events: RwLock<Vec<EventLogEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account (accounts are externally owned; tests and embedded
    /// callers populate them directly).
    pub fn put_account(&self, account: Account) {
        self.accounts.write().insert(account.id.clone(), account);
    }

    /// Seed a channel.
    pub fn put_channel(&self, channel: Channel) {
        self.channels.write().insert(channel.id.clone(), channel);
    }

    pub fn set_account_active(&self, account_id: &AccountId, is_active: bool) {
        if let Some(account) = self.accounts.write().get_mut(account_id) {
            account.is_active = is_active;
        }
    }

    pub fn set_channel_enabled(&self, channel_id: &ChannelId, enabled: bool) {
        if let Some(channel) = self.channels.write().get_mut(channel_id) {
            channel.enabled = enabled;
        }
    }

    /// Renumber under an already-held write guard so delete + renumber +
    /// promote is one atomic unit.
    fn renumber_locked(
        mappings: &mut HashMap<MappingId, Mapping>,
        channel_id: &ChannelId,
    ) -> Option<MappingId> {
        let mut survivors: Vec<MappingId> = mappings
            .values()
            .filter(|m| &m.channel_id == channel_id)
            .map(|m| m.id.clone())
            .collect();
        survivors.sort_by_key(|id| {
            let m = &mappings[id];
            (!m.is_primary, m.priority)
        });

        let has_primary = survivors
            .iter()
            .any(|id| mappings[id].is_primary);

        let mut promoted = None;
        for (index, id) in survivors.iter().enumerate() {
            if let Some(mapping) = mappings.get_mut(id) {
                mapping.priority = index as i32;
                if index == 0 && !has_primary {
                    mapping.is_primary = true;
                    promoted = Some(mapping.id.clone());
                }
            }
        }
        promoted
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn get(&self, mapping_id: &MappingId) -> Result<Option<Mapping>> {
        Ok(self.mappings.read().get(mapping_id).cloned())
    }

    async fn get_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Mapping>> {
        let mappings = self.mappings.read();
        let mut out: Vec<Mapping> = mappings
            .values()
            .filter(|m| &m.channel_id == channel_id)
            .cloned()
            .collect();
        crate::store::sort_attempt_order(&mut out);
        Ok(out)
    }

    async fn get_by_source(&self, source_id: &SourceId) -> Result<Vec<Mapping>> {
        let mappings = self.mappings.read();
        Ok(mappings
            .values()
            .filter(|m| &m.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, mapping: Mapping) -> Result<Mapping> {
        let mut mappings = self.mappings.write();
        if mappings.contains_key(&mapping.id) {
            return Err(Error::AlreadyExists(format!(
                "Mapping {} already exists",
                mapping.id
            )));
        }
        mappings.insert(mapping.id.clone(), mapping.clone());
        Ok(mapping)
    }

    async fn delete(&self, mapping_id: &MappingId) -> Result<bool> {
        Ok(self.mappings.write().remove(mapping_id).is_some())
    }

    async fn max_priority(&self, channel_id: &ChannelId) -> Result<Option<i32>> {
        let mappings = self.mappings.read();
        Ok(mappings
            .values()
            .filter(|m| &m.channel_id == channel_id)
            .map(|m| m.priority)
            .max())
    }

    async fn renumber_priorities(&self, channel_id: &ChannelId) -> Result<RenumberOutcome> {
        let mut mappings = self.mappings.write();
        let promoted = Self::renumber_locked(&mut mappings, channel_id);
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
        let mut mappings = self.mappings.write();
        let mut removed = 0;
        for id in remove {
            let belongs = mappings
                .get(id)
                .is_some_and(|m| &m.channel_id == channel_id);
            if belongs && mappings.remove(id).is_some() {
                removed += 1;
            }
        }
        let promoted = Self::renumber_locked(&mut mappings, channel_id);
        Ok(RenumberOutcome { removed, promoted })
    }
}

#[async_trait]
impl SourceCatalog for MemoryStore {
    async fn get_source(&self, source_id: &SourceId) -> Result<Option<Source>> {
        Ok(self.sources.read().get(source_id).cloned())
    }

    async fn sources_for_account(&self, account_id: &AccountId) -> Result<Vec<Source>> {
        Ok(self
            .sources
            .read()
            .values()
            .filter(|s| &s.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn insert_source(&self, source: Source) -> Result<Source> {
        let mut sources = self.sources.write();
        if sources.contains_key(&source.id) {
            return Err(Error::AlreadyExists(format!(
                "Source {} already exists",
                source.id
            )));
        }
        sources.insert(source.id.clone(), source.clone());
        Ok(source)
    }

    async fn update_source(&self, source: &Source) -> Result<()> {
        let mut sources = self.sources.write();
        match sources.get_mut(&source.id) {
            Some(existing) => {
                *existing = source.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("Source {}", source.id))),
        }
    }

    async fn delete_source(&self, source_id: &SourceId) -> Result<bool> {
        Ok(self.sources.write().remove(source_id).is_some())
    }

    async fn touch_last_seen(
        &self,
        source_ids: &[SourceId],
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut sources = self.sources.write();
        for id in source_ids {
            if let Some(source) = sources.get_mut(id) {
                source.last_seen_at = seen_at;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelDirectory for MemoryStore {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let mut channels: Vec<Channel> = self.channels.read().values().cloned().collect();
        channels.sort_by_key(|c| c.sort_order);
        Ok(channels)
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>> {
        Ok(self.channels.read().get(channel_id).cloned())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        Ok(self.accounts.read().get(account_id).cloned())
    }
}

#[async_trait]
impl EventSink for MemoryStore {
    async fn record(&self, entry: EventLogEntry) -> Result<()> {
        self.events.write().push(entry);
        Ok(())
    }
}

#[async_trait]
impl EventQuery for MemoryStore {
    async fn query(&self, filter: EventFilter) -> Result<Vec<EventLogEntry>> {
        let events = self.events.read();
        let mut out: Vec<EventLogEntry> = events
            .iter()
            .filter(|e| filter.level.map_or(true, |l| e.level == l))
            .filter(|e| filter.category.map_or(true, |c| e.category == c))
            .filter(|e| filter.since.map_or(true, |s| e.created_at >= s))
            .cloned()
            .collect();
        out.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventCategory, EventDetails, EventLevel, Mapping};

    #[tokio::test]
    async fn test_remove_and_renumber_promotes_next_backup() {
        let store = MemoryStore::new();
        let channel_id = ChannelId::new();

        let primary = Mapping::auto(channel_id.clone(), SourceId::new(), true, 0, 0.9);
        let backup1 = Mapping::auto(channel_id.clone(), SourceId::new(), false, 1, 0.9);
        let backup2 = Mapping::auto(channel_id.clone(), SourceId::new(), false, 2, 0.9);
        store.insert(primary.clone()).await.unwrap();
        store.insert(backup1.clone()).await.unwrap();
        store.insert(backup2.clone()).await.unwrap();

        let outcome = store
            .remove_and_renumber(&channel_id, &[primary.id.clone()])
            .await
            .unwrap();
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.promoted, Some(backup1.id.clone()));

        let remaining = store.get_for_channel(&channel_id).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining[0].is_primary);
        assert_eq!(remaining[0].id, backup1.id);
        assert_eq!(remaining[0].priority, 0);
        assert_eq!(remaining[1].priority, 1);
        assert!(!remaining[1].is_primary);
    }

    #[tokio::test]
    async fn test_renumber_closes_priority_gaps() {
        let store = MemoryStore::new();
        let channel_id = ChannelId::new();

        let primary = Mapping::auto(channel_id.clone(), SourceId::new(), true, 0, 0.9);
        let middle = Mapping::auto(channel_id.clone(), SourceId::new(), false, 1, 0.9);
        let tail = Mapping::auto(channel_id.clone(), SourceId::new(), false, 2, 0.9);
        store.insert(primary.clone()).await.unwrap();
        store.insert(middle.clone()).await.unwrap();
        store.insert(tail.clone()).await.unwrap();

        store.delete(&middle.id).await.unwrap();
        let outcome = store.renumber_priorities(&channel_id).await.unwrap();
        assert!(outcome.promoted.is_none());

        let remaining = store.get_for_channel(&channel_id).await.unwrap();
        let priorities: Vec<i32> = remaining.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![0, 1]);
        assert_eq!(remaining[1].id, tail.id);
    }

    #[tokio::test]
    async fn test_get_for_channel_orders_by_attempt_order() {
        let store = MemoryStore::new();
        let channel_id = ChannelId::new();

        // Inserted out of order on purpose
        store
            .insert(Mapping::auto(channel_id.clone(), SourceId::new(), false, 2, 0.9))
            .await
            .unwrap();
        store
            .insert(Mapping::auto(channel_id.clone(), SourceId::new(), true, 0, 0.9))
            .await
            .unwrap();
        store
            .insert(Mapping::auto(channel_id.clone(), SourceId::new(), false, 1, 0.9))
            .await
            .unwrap();

        let mappings = store.get_for_channel(&channel_id).await.unwrap();
        let priorities: Vec<i32> = mappings.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_event_query_filters_by_level() {
        let store = MemoryStore::new();
        store
            .record(EventLogEntry::new(
                EventLevel::Info,
                EventCategory::Provider,
                "scan finished",
                EventDetails::default(),
            ))
            .await
            .unwrap();
        store
            .record(EventLogEntry::new(
                EventLevel::Error,
                EventCategory::Failover,
                "stream unavailable",
                EventDetails::default(),
            ))
            .await
            .unwrap();

        let errors = store
            .query(EventFilter {
                level: Some(EventLevel::Error),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, EventCategory::Failover);
    }
}
