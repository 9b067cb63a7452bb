//! Mapping inspection and manual overrides
//!
//! The external UI reads a channel's mappings through this service and
//! applies explicit human actions: pinning a source to a channel or
//! removing a link. Manual writes bypass the reconciler but run under the
//! same per-channel boundary and keep the same priority/primary
//! invariants.

use std::sync::Arc;

use crate::models::{
    ChannelId, EventCategory, EventDetails, EventLevel, EventLogEntry, Mapping, MappingId,
    ReasonCode, SourceId,
};
use crate::store::{ChannelDirectory, ChannelLocks, EventSink, MappingStore, SourceCatalog};
use crate::{Error, Result};

pub struct MappingService {
    mappings: Arc<dyn MappingStore>,
    channels: Arc<dyn ChannelDirectory>,
    sources: Arc<dyn SourceCatalog>,
    events: Arc<dyn EventSink>,
    channel_locks: Arc<ChannelLocks>,
}

impl MappingService {
    pub fn new(
        mappings: Arc<dyn MappingStore>,
        channels: Arc<dyn ChannelDirectory>,
        sources: Arc<dyn SourceCatalog>,
        events: Arc<dyn EventSink>,
        channel_locks: Arc<ChannelLocks>,
    ) -> Self {
        Self {
            mappings,
            channels,
            sources,
            events,
            channel_locks,
        }
    }

    /// Read-only snapshot of a channel's mappings in attempt order.
    pub async fn get_mappings(&self, channel_id: &ChannelId) -> Result<Vec<Mapping>> {
        self.mappings.get_for_channel(channel_id).await
    }

    /// Pin a source to a channel by explicit human action.
    ///
    /// The new mapping becomes primary only when the channel has none;
    /// otherwise it is appended after the existing mappings.
    pub async fn create_manual(
        &self,
        channel_id: &ChannelId,
        source_id: &SourceId,
    ) -> Result<Mapping> {
        if self.channels.get_channel(channel_id).await?.is_none() {
            return Err(Error::NotFound(format!("Channel {channel_id}")));
        }
        if self.sources.get_source(source_id).await?.is_none() {
            return Err(Error::NotFound(format!("Source {source_id}")));
        }

        let lock = self.channel_locks.for_channel(channel_id);
        let _guard = lock.lock().await;

        let existing = self.mappings.get_for_channel(channel_id).await?;
        if existing.iter().any(|m| &m.source_id == source_id) {
            return Err(Error::AlreadyExists(format!(
                "Source {source_id} is already mapped to channel {channel_id}"
            )));
        }

        let has_primary = existing.iter().any(|m| m.is_primary);
        let mapping = if has_primary {
            let next = existing.iter().map(|m| m.priority).max().unwrap_or(-1) + 1;
            Mapping::manual(channel_id.clone(), source_id.clone(), false, next)
        } else {
            Mapping::manual(channel_id.clone(), source_id.clone(), true, 0)
        };

        let mapping = self.mappings.insert(mapping).await?;

        self.events
            .record(EventLogEntry::new(
                EventLevel::Info,
                EventCategory::Mapping,
                "Manual mapping created",
                EventDetails::for_channel(channel_id.clone())
                    .to_source(source_id.clone())
                    .with_reason(ReasonCode::ManualOverride),
            ))
            .await?;

        Ok(mapping)
    }

    /// Remove a mapping by explicit human action and close the priority
    /// gap, promoting the next backup if the primary was removed.
    pub async fn delete_mapping(&self, mapping_id: &MappingId) -> Result<()> {
        // Resolve the owning channel first so the delete + renumber unit
        // runs under that channel's lock.
        let mapping = self
            .mappings
            .get(mapping_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Mapping {mapping_id}")))?;

        let lock = self.channel_locks.for_channel(&mapping.channel_id);
        let _guard = lock.lock().await;

        let outcome = self
            .mappings
            .remove_and_renumber(&mapping.channel_id, std::slice::from_ref(mapping_id))
            .await?;
        if outcome.removed == 0 {
            return Err(Error::NotFound(format!("Mapping {mapping_id}")));
        }

        self.events
            .record(EventLogEntry::new(
                EventLevel::Info,
                EventCategory::Mapping,
                "Mapping removed by operator",
                EventDetails::for_channel(mapping.channel_id.clone())
                    .from_source(mapping.source_id.clone())
                    .with_reason(if outcome.promoted.is_some() {
                        ReasonCode::PrimaryPromoted
                    } else {
                        ReasonCode::ManualOverride
                    }),
            ))
            .await?;

        Ok(())
    }
}
