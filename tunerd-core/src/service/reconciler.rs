//! Reconciliation of provider catalog changes into the mapping table
//!
//! Applies a [`ChangeSet`] for one account: source metadata updates,
//! auto-matching of new sources, and removal handling with manual-mapping
//! preservation and primary promotion. Passes for one account are
//! serialized; passes for different accounts run concurrently. All mapping
//! writes for a single channel happen under that channel's lock, and a
//! failure on one channel never aborts the rest of the scan.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::MatchingConfig;
use crate::matching::{best_match, NameMatcher};
use crate::models::{
    AccountId, ChangeSet, ChannelId, EventCategory, EventDetails, EventLevel, EventLogEntry,
    Mapping, MappingId, ReasonCode, ScannedSource, Source, SourceId,
};
use crate::service::change_detector::detect_changes;
use crate::store::{ChannelDirectory, ChannelLocks, EventSink, MappingStore, SourceCatalog};
use crate::Result;

/// Count summary returned to the external scan trigger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub new_matches_created: usize,
    pub mappings_removed: usize,
    pub mappings_updated: usize,
    pub manual_matches_preserved: usize,
}

/// What one scan did to one channel, accumulated for event emission
#[derive(Default)]
struct ChannelOutcome {
    matched_sources: Vec<SourceId>,
    removed_sources: Vec<SourceId>,
    preserved_sources: Vec<SourceId>,
    promoted_to: Option<SourceId>,
    failed: bool,
}

pub struct Reconciler {
    sources: Arc<dyn SourceCatalog>,
    mappings: Arc<dyn MappingStore>,
    channels: Arc<dyn ChannelDirectory>,
    events: Arc<dyn EventSink>,
    matcher: Arc<dyn NameMatcher>,
    channel_locks: Arc<ChannelLocks>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    matching: MatchingConfig,
}

impl Reconciler {
    pub fn new(
        sources: Arc<dyn SourceCatalog>,
        mappings: Arc<dyn MappingStore>,
        channels: Arc<dyn ChannelDirectory>,
        events: Arc<dyn EventSink>,
        matcher: Arc<dyn NameMatcher>,
        channel_locks: Arc<ChannelLocks>,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            sources,
            mappings,
            channels,
            events,
            matcher,
            channel_locks,
            account_locks: DashMap::new(),
            matching,
        }
    }

    /// Run one reconciliation pass: diff the fresh catalog against the
    /// stored one and apply the resulting change set.
    ///
    /// Serialized per account — a second pass for the same account waits
    /// for the first to finish.
    pub async fn scan(
        &self,
        account_id: &AccountId,
        fresh: Vec<ScannedSource>,
    ) -> Result<ScanSummary> {
        let account_lock = self
            .account_locks
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = account_lock.lock().await;

        let stored = self.sources.sources_for_account(account_id).await?;
        let changeset = detect_changes(account_id.clone(), &stored, &fresh);

        // Stamp last-seen on sources that survived the scan unchanged;
        // changed sources get theirs when the metadata update lands.
        let changed_ids: Vec<&SourceId> = changeset
            .changed_sources
            .iter()
            .map(|c| &c.before.id)
            .collect();
        let unchanged: Vec<SourceId> = stored
            .iter()
            .filter(|s| !changeset.removed_source_ids.contains(&s.id))
            .filter(|s| !changed_ids.contains(&&s.id))
            .map(|s| s.id.clone())
            .collect();
        if let Err(e) = self.sources.touch_last_seen(&unchanged, Utc::now()).await {
            tracing::error!(account_id = %account_id, error = %e, "Failed to stamp last-seen");
        }

        self.apply(changeset).await
    }

    /// Apply a change set produced by the change detector.
    pub async fn apply(&self, changeset: ChangeSet) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        let mut outcomes: HashMap<ChannelId, ChannelOutcome> = HashMap::new();

        self.apply_changed_sources(&changeset, &mut summary).await;
        self.apply_new_sources(&changeset, &mut summary, &mut outcomes)
            .await;
        self.apply_removed_sources(&changeset, &mut summary, &mut outcomes)
            .await;

        for (channel_id, outcome) in &outcomes {
            self.emit_channel_event(channel_id, outcome).await;
        }

        let scan_entry = EventLogEntry::new(
            EventLevel::Info,
            EventCategory::Provider,
            format!(
                "Provider scan completed: {} new matches, {} mappings removed, {} updated, {} manual preserved",
                summary.new_matches_created,
                summary.mappings_removed,
                summary.mappings_updated,
                summary.manual_matches_preserved
            ),
            EventDetails::default().with_reason(ReasonCode::ScanCompleted),
        );
        if let Err(e) = self.events.record(scan_entry).await {
            tracing::error!(error = %e, "Failed to record scan summary event");
        }

        tracing::info!(
            account_id = %changeset.account_id,
            new_matches = summary.new_matches_created,
            removed = summary.mappings_removed,
            updated = summary.mappings_updated,
            preserved = summary.manual_matches_preserved,
            "Reconciliation pass finished"
        );

        Ok(summary)
    }

    /// Changed sources: metadata lands in place, no mapping is touched.
    async fn apply_changed_sources(&self, changeset: &ChangeSet, summary: &mut ScanSummary) {
        for change in &changeset.changed_sources {
            let mut updated = change.before.clone();
            updated.apply_scan(&change.after);

            if let Err(e) = self.sources.update_source(&updated).await {
                tracing::error!(
                    source_id = %updated.id,
                    error = %e,
                    "Failed to update source metadata; skipping"
                );
                continue;
            }

            match self.mappings.get_by_source(&updated.id).await {
                Ok(mapped) if !mapped.is_empty() => summary.mappings_updated += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(source_id = %updated.id, error = %e, "Mapping lookup failed");
                }
            }
        }
    }

    /// New sources: store them, then auto-match by name. A new match is
    /// appended after every existing mapping; it never displaces one.
    async fn apply_new_sources(
        &self,
        changeset: &ChangeSet,
        summary: &mut ScanSummary,
        outcomes: &mut HashMap<ChannelId, ChannelOutcome>,
    ) {
        let lineup = match self.channels.list_channels().await {
            Ok(lineup) => lineup,
            Err(e) => {
                tracing::error!(error = %e, "Channel lineup unavailable; skipping auto-match");
                return;
            }
        };

        for scanned in &changeset.new_sources {
            let source = Source::from_scan(changeset.account_id.clone(), scanned);
            let source = match self.sources.insert_source(source).await {
                Ok(source) => source,
                Err(e) => {
                    tracing::error!(
                        provider_stream_id = scanned.provider_stream_id,
                        error = %e,
                        "Failed to store scanned source; skipping"
                    );
                    continue;
                }
            };

            let Some((channel, confidence)) = best_match(&*self.matcher, &lineup, &source.name)
            else {
                continue;
            };

            if confidence <= self.matching.auto_match_threshold {
                // Orphan: left unmapped for the external promotion workflow
                tracing::debug!(
                    source_id = %source.id,
                    best_channel = %channel.id,
                    confidence,
                    "No auto-match above threshold"
                );
                continue;
            }

            match self
                .create_auto_mapping(&channel.id, &source.id, confidence)
                .await
            {
                Ok(()) => {
                    summary.new_matches_created += 1;
                    outcomes
                        .entry(channel.id.clone())
                        .or_default()
                        .matched_sources
                        .push(source.id.clone());
                }
                Err(e) => {
                    tracing::error!(
                        channel_id = %channel.id,
                        source_id = %source.id,
                        error = %e,
                        "Auto-match failed; channel skipped"
                    );
                    outcomes.entry(channel.id.clone()).or_default().failed = true;
                }
            }
        }
    }

    async fn create_auto_mapping(
        &self,
        channel_id: &ChannelId,
        source_id: &SourceId,
        confidence: f64,
    ) -> Result<()> {
        let lock = self.channel_locks.for_channel(channel_id);
        let _guard = lock.lock().await;

        let existing = self.mappings.get_for_channel(channel_id).await?;
        let has_primary = existing.iter().any(|m| m.is_primary);

        let mapping = if has_primary {
            let next = existing.iter().map(|m| m.priority).max().unwrap_or(-1) + 1;
            Mapping::auto(channel_id.clone(), source_id.clone(), false, next, confidence)
        } else {
            Mapping::auto(channel_id.clone(), source_id.clone(), true, 0, confidence)
        };

        self.mappings.insert(mapping).await?;
        Ok(())
    }

    /// Removed sources: manual mappings survive untouched; automatic
    /// mappings are deleted per channel as one atomic unit, promoting the
    /// next backup when the primary went away.
    async fn apply_removed_sources(
        &self,
        changeset: &ChangeSet,
        summary: &mut ScanSummary,
        outcomes: &mut HashMap<ChannelId, ChannelOutcome>,
    ) {
        // Group automatic mappings by channel so each channel gets exactly
        // one delete + renumber + promote unit.
        let mut auto_by_channel: HashMap<ChannelId, Vec<(MappingId, SourceId)>> = HashMap::new();

        for source_id in &changeset.removed_source_ids {
            let mapped = match self.mappings.get_by_source(source_id).await {
                Ok(mapped) => mapped,
                Err(e) => {
                    tracing::error!(source_id = %source_id, error = %e, "Mapping lookup failed");
                    continue;
                }
            };

            let mut has_manual = false;
            for mapping in mapped {
                if mapping.is_manual {
                    has_manual = true;
                    summary.manual_matches_preserved += 1;
                    outcomes
                        .entry(mapping.channel_id.clone())
                        .or_default()
                        .preserved_sources
                        .push(source_id.clone());
                } else {
                    auto_by_channel
                        .entry(mapping.channel_id.clone())
                        .or_default()
                        .push((mapping.id.clone(), source_id.clone()));
                }
            }

            // The source row survives while a manual mapping still pins it;
            // its stale last_seen_at marks it missing from the catalog.
            if !has_manual {
                if let Err(e) = self.sources.delete_source(source_id).await {
                    tracing::error!(source_id = %source_id, error = %e, "Failed to delete source");
                }
            }
        }

        for (channel_id, removals) in auto_by_channel {
            let outcome = outcomes.entry(channel_id.clone()).or_default();
            if let Err(e) = self
                .remove_channel_mappings(&channel_id, &removals, summary, outcome)
                .await
            {
                tracing::error!(
                    channel_id = %channel_id,
                    error = %e,
                    "Removal pass failed for channel; continuing with remaining channels"
                );
                outcome.failed = true;
            }
        }
    }

    async fn remove_channel_mappings(
        &self,
        channel_id: &ChannelId,
        removals: &[(MappingId, SourceId)],
        summary: &mut ScanSummary,
        outcome: &mut ChannelOutcome,
    ) -> Result<()> {
        let lock = self.channel_locks.for_channel(channel_id);
        let _guard = lock.lock().await;

        let mapping_ids: Vec<MappingId> = removals.iter().map(|(id, _)| id.clone()).collect();
        let result = self
            .mappings
            .remove_and_renumber(channel_id, &mapping_ids)
            .await?;

        summary.mappings_removed += result.removed;
        outcome
            .removed_sources
            .extend(removals.iter().map(|(_, source_id)| source_id.clone()));

        if let Some(promoted_id) = result.promoted {
            summary.mappings_updated += 1;
            let promoted_source = self
                .mappings
                .get_for_channel(channel_id)
                .await?
                .into_iter()
                .find(|m| m.id == promoted_id)
                .map(|m| m.source_id);
            outcome.promoted_to = promoted_source;
        }

        Ok(())
    }

    /// One event per distinct channel a scan touched.
    async fn emit_channel_event(&self, channel_id: &ChannelId, outcome: &ChannelOutcome) {
        let (level, reason) = if outcome.failed {
            (EventLevel::Error, ReasonCode::ChannelFailed)
        } else if outcome.promoted_to.is_some() {
            (EventLevel::Warn, ReasonCode::PrimaryPromoted)
        } else if !outcome.removed_sources.is_empty() {
            (EventLevel::Warn, ReasonCode::SourceRemoved)
        } else if !outcome.preserved_sources.is_empty() {
            (EventLevel::Warn, ReasonCode::ManualPreserved)
        } else {
            (EventLevel::Info, ReasonCode::AutoMatched)
        };

        let mut details = EventDetails::for_channel(channel_id.clone()).with_reason(reason);
        if let Some(from) = outcome
            .removed_sources
            .first()
            .or(outcome.preserved_sources.first())
        {
            details = details.from_source(from.clone());
        }
        if let Some(to) = outcome
            .promoted_to
            .as_ref()
            .or(outcome.matched_sources.first())
        {
            details = details.to_source(to.clone());
        }

        let message = format!(
            "Channel mappings reconciled: {} matched, {} removed, {} preserved{}",
            outcome.matched_sources.len(),
            outcome.removed_sources.len(),
            outcome.preserved_sources.len(),
            if outcome.promoted_to.is_some() {
                ", backup promoted to primary"
            } else {
                ""
            }
        );

        if let Err(e) = self
            .events
            .record(EventLogEntry::new(
                level,
                EventCategory::Provider,
                message,
                details,
            ))
            .await
        {
            tracing::error!(channel_id = %channel_id, error = %e, "Failed to record event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::JaroWinklerMatcher;
    use crate::store::{EventFilter, EventQuery, MemoryStore};
    use crate::test_helpers::*;

    fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
        Reconciler::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(JaroWinklerMatcher),
            Arc::new(ChannelLocks::new()),
            MatchingConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_new_source_becomes_primary_for_unmapped_channel() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let summary = reconciler(&store)
            .scan(&account_id, vec![scanned(200, "ESPN HD")])
            .await
            .unwrap();

        assert_eq!(summary.new_matches_created, 1);
        assert_eq!(summary.mappings_removed, 0);

        let mappings = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert!(mappings[0].is_primary);
        assert_eq!(mappings[0].priority, 0);
        assert!(!mappings[0].is_manual);
        assert!(mappings[0].match_confidence > 0.85);
    }

    #[tokio::test]
    async fn test_new_source_appends_as_backup_behind_existing_primary() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let existing = SourceFixture::new(account_id.clone(), 100, "ESPN").build();
        store.insert_source(existing.clone()).await.unwrap();
        store
            .insert(Mapping::auto(channel.id.clone(), existing.id.clone(), true, 0, 0.95))
            .await
            .unwrap();

        let summary = reconciler(&store)
            .scan(
                &account_id,
                vec![scanned(100, "ESPN"), scanned(200, "ESPN FHD")],
            )
            .await
            .unwrap();

        assert_eq!(summary.new_matches_created, 1);

        let mappings = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(mappings.len(), 2);
        // Existing primary untouched; the new match never displaces it
        assert_eq!(mappings[0].source_id, existing.id);
        assert!(mappings[0].is_primary);
        assert!(!mappings[1].is_primary);
        assert_eq!(mappings[1].priority, 1);
    }

    #[tokio::test]
    async fn test_sub_threshold_source_stays_an_orphan() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let summary = reconciler(&store)
            .scan(&account_id, vec![scanned(300, "Cartoon Network")])
            .await
            .unwrap();

        assert_eq!(summary.new_matches_created, 0);
        assert!(store.get_for_channel(&channel.id).await.unwrap().is_empty());
        // The source itself is stored for the external promotion workflow
        assert_eq!(store.sources_for_account(&account_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_mapping_survives_source_removal() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let pinned = SourceFixture::new(account_id.clone(), 100, "ESPN").build();
        store.insert_source(pinned.clone()).await.unwrap();
        let manual = Mapping::manual(channel.id.clone(), pinned.id.clone(), true, 0);
        store.insert(manual.clone()).await.unwrap();

        let summary = reconciler(&store).scan(&account_id, vec![]).await.unwrap();

        assert_eq!(summary.manual_matches_preserved, 1);
        assert_eq!(summary.mappings_removed, 0);

        let mappings = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].id, manual.id);
        // The pinned source row is retained so serving can still resolve it
        assert!(store.get_source(&pinned.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_removed_primary_promotes_next_backup() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let gone = SourceFixture::new(account_id.clone(), 100, "ESPN").build();
        let kept = SourceFixture::new(account_id.clone(), 101, "ESPN HD").build();
        store.insert_source(gone.clone()).await.unwrap();
        store.insert_source(kept.clone()).await.unwrap();
        store
            .insert(Mapping::auto(channel.id.clone(), gone.id.clone(), true, 0, 0.95))
            .await
            .unwrap();
        store
            .insert(Mapping::auto(channel.id.clone(), kept.id.clone(), false, 1, 0.9))
            .await
            .unwrap();

        let summary = reconciler(&store)
            .scan(&account_id, vec![scanned(101, "ESPN HD")])
            .await
            .unwrap();

        assert_eq!(summary.mappings_removed, 1);
        assert_eq!(summary.mappings_updated, 1);

        let mappings = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].source_id, kept.id);
        assert!(mappings[0].is_primary);
        assert_eq!(mappings[0].priority, 0);

        // The vanished source row is gone along with its mapping
        assert!(store.get_source(&gone.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unchanged_catalog_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();
        let r = reconciler(&store);

        let fresh = vec![scanned(200, "ESPN HD")];
        r.scan(&account_id, fresh.clone()).await.unwrap();
        let first = store.get_for_channel(&channel.id).await.unwrap();

        let summary = r.scan(&account_id, fresh).await.unwrap();
        assert_eq!(summary, ScanSummary::default());

        let second = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(second.len(), first.len());
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].created_at, first[0].created_at);
    }

    #[tokio::test]
    async fn test_changed_source_updates_metadata_without_touching_mappings() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let source = SourceFixture::new(account_id.clone(), 100, "ESPN").build();
        store.insert_source(source.clone()).await.unwrap();
        let mapping = Mapping::auto(channel.id.clone(), source.id.clone(), true, 0, 0.95);
        store.insert(mapping.clone()).await.unwrap();

        let mut renamed = scanned(100, "ESPN US");
        renamed.qualities = vec!["HD".to_string()];
        let summary = reconciler(&store)
            .scan(&account_id, vec![renamed])
            .await
            .unwrap();

        assert_eq!(summary.mappings_updated, 1);
        assert_eq!(summary.new_matches_created, 0);
        assert_eq!(summary.mappings_removed, 0);

        let updated = store.get_source(&source.id).await.unwrap().unwrap();
        assert_eq!(updated.name, "ESPN US");
        assert_eq!(updated.qualities, vec!["HD".to_string()]);

        let mappings = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].id, mapping.id);
        assert_eq!(mappings[0].priority, 0);
    }

    #[tokio::test]
    async fn test_new_match_never_displaces_manual_primary() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let pinned = SourceFixture::new(account_id.clone(), 100, "ESPN").build();
        store.insert_source(pinned.clone()).await.unwrap();
        let manual = Mapping::manual(channel.id.clone(), pinned.id.clone(), true, 0);
        store.insert(manual.clone()).await.unwrap();

        reconciler(&store)
            .scan(
                &account_id,
                vec![scanned(100, "ESPN"), scanned(200, "ESPN 4K")],
            )
            .await
            .unwrap();

        let mappings = store.get_for_channel(&channel.id).await.unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].id, manual.id);
        assert!(mappings[0].is_primary);
        assert_eq!(mappings[1].priority, 1);
        assert!(!mappings[1].is_manual);
    }

    #[tokio::test]
    async fn test_scan_emits_summary_and_channel_events() {
        let store = Arc::new(MemoryStore::new());
        let channel = ChannelFixture::new("ESPN").build();
        store.put_channel(channel.clone());
        let account_id = random_account_id();

        let gone = SourceFixture::new(account_id.clone(), 100, "ESPN").build();
        let kept = SourceFixture::new(account_id.clone(), 101, "ESPN HD").build();
        store.insert_source(gone.clone()).await.unwrap();
        store.insert_source(kept.clone()).await.unwrap();
        store
            .insert(Mapping::auto(channel.id.clone(), gone.id.clone(), true, 0, 0.95))
            .await
            .unwrap();
        store
            .insert(Mapping::auto(channel.id.clone(), kept.id.clone(), false, 1, 0.9))
            .await
            .unwrap();

        reconciler(&store)
            .scan(&account_id, vec![scanned(101, "ESPN HD")])
            .await
            .unwrap();

        let provider_events = store
            .query(EventFilter {
                category: Some(EventCategory::Provider),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(provider_events.len(), 2);

        let channel_event = provider_events
            .iter()
            .find(|e| e.details.channel_id.as_ref() == Some(&channel.id))
            .expect("per-channel event");
        assert_eq!(channel_event.level, EventLevel::Warn);
        assert_eq!(channel_event.details.reason, Some(ReasonCode::PrimaryPromoted));
        assert_eq!(channel_event.details.from_source_id, Some(gone.id));
        assert_eq!(channel_event.details.to_source_id, Some(kept.id));

        let summary_event = provider_events
            .iter()
            .find(|e| e.details.reason == Some(ReasonCode::ScanCompleted))
            .expect("scan summary event");
        assert_eq!(summary_event.level, EventLevel::Info);
    }
}
