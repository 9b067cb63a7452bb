//! Failover candidate selection
//!
//! Orders a channel's mapped sources, filters out inactive accounts, and
//! walks the list under a per-attempt timeout and an overall deadline.
//! The first candidate that answers starts serving; everything else is
//! classified and logged, never surfaced to the caller.

use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};

use tunerd_core::models::{
    Account, ChannelId, EventCategory, EventDetails, EventLevel, EventLogEntry, Mapping,
    ReasonCode, Source, SourceId,
};
use tunerd_core::store::{AccountDirectory, EventSink, MappingStore, SourceCatalog};
use tunerd_core::config::FailoverConfig;

use crate::error::{StreamError, StreamResult};
use crate::upstream::{UpstreamClient, UpstreamStream};

/// One serveable mapping with its resolved source and account.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mapping: Mapping,
    pub source: Source,
    pub account: Account,
    /// Position in attempt order after filtering (0 = best)
    pub rank: usize,
}

/// A live upstream plus the ordered candidate list it was chosen from,
/// kept for background quality upgrades and mid-transfer failover.
pub struct Selection {
    pub upstream: UpstreamStream,
    pub candidates: Vec<Candidate>,
    pub serving: usize,
}

pub struct FailoverSelector {
    mappings: Arc<dyn MappingStore>,
    sources: Arc<dyn SourceCatalog>,
    accounts: Arc<dyn AccountDirectory>,
    events: Arc<dyn EventSink>,
    client: Arc<dyn UpstreamClient>,
    config: FailoverConfig,
}

impl FailoverSelector {
    pub fn new(
        mappings: Arc<dyn MappingStore>,
        sources: Arc<dyn SourceCatalog>,
        accounts: Arc<dyn AccountDirectory>,
        events: Arc<dyn EventSink>,
        client: Arc<dyn UpstreamClient>,
        config: FailoverConfig,
    ) -> Self {
        Self {
            mappings,
            sources,
            accounts,
            events,
            client,
            config,
        }
    }

    pub(crate) fn client(&self) -> Arc<dyn UpstreamClient> {
        self.client.clone()
    }

    pub(crate) fn events(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }

    pub(crate) const fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Resolve a channel's candidates in attempt order, dropping mappings
    /// whose source is gone or whose owning account is inactive.
    pub async fn candidates(&self, channel_id: &ChannelId) -> StreamResult<Vec<Candidate>> {
        let mappings = self
            .mappings
            .get_for_channel(channel_id)
            .await
            .map_err(|e| {
                tracing::error!(channel_id = %channel_id, error = %e, "Mapping read failed");
                StreamError::Unavailable
            })?;

        let mut candidates = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let Ok(Some(source)) = self.sources.get_source(&mapping.source_id).await else {
                continue;
            };
            let Ok(Some(account)) = self.accounts.get_account(&source.account_id).await else {
                continue;
            };
            if !account.is_active {
                continue;
            }
            let rank = candidates.len();
            candidates.push(Candidate {
                mapping,
                source,
                account,
                rank,
            });
        }

        Ok(candidates)
    }

    /// Attempt candidates in order until one answers or the deadline runs
    /// out. Candidates that cannot be attempted within the remaining
    /// budget are skipped, not retried.
    pub async fn select(&self, channel_id: &ChannelId) -> StreamResult<Selection> {
        let candidates = self.candidates(channel_id).await?;
        let attempt_timeout = Duration::from_millis(self.config.attempt_timeout_ms);
        let deadline = Instant::now() + Duration::from_millis(self.config.overall_deadline_ms);

        let mut last_failure: Option<(SourceId, StreamError)> = None;

        for candidate in &candidates {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    channel_id = %channel_id,
                    rank = candidate.rank,
                    "Overall deadline exhausted; skipping remaining candidates"
                );
                break;
            }
            let budget = attempt_timeout.min(deadline - now);

            let attempt = timeout(
                budget,
                self.client.open(&candidate.account, &candidate.source),
            )
            .await;

            let failure = match attempt {
                Ok(Ok(upstream)) => {
                    if !candidate.mapping.is_primary {
                        self.record_failover(channel_id, candidate, last_failure.as_ref())
                            .await;
                    }
                    return Ok(Selection {
                        upstream,
                        serving: candidate.rank,
                        candidates: candidates.clone(),
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => StreamError::ConnectionTimeout,
            };

            tracing::warn!(
                channel_id = %channel_id,
                source_id = %candidate.source.id,
                rank = candidate.rank,
                error = %failure,
                "Candidate attempt failed"
            );
            last_failure = Some((candidate.source.id.clone(), failure));
        }

        self.record_exhaustion(channel_id, last_failure.as_ref())
            .await;
        Err(StreamError::Unavailable)
    }

    /// Warn entry when a request is served from a non-primary source,
    /// naming the skipped source and the failure that caused the skip.
    async fn record_failover(
        &self,
        channel_id: &ChannelId,
        serving: &Candidate,
        last_failure: Option<&(SourceId, StreamError)>,
    ) {
        let mut details = EventDetails::for_channel(channel_id.clone())
            .to_source(serving.source.id.clone());
        if let Some((from, failure)) = last_failure {
            details = details.from_source(from.clone()).with_reason(failure.reason_code());
        }

        let entry = EventLogEntry::new(
            EventLevel::Warn,
            EventCategory::Failover,
            "Serving from backup source after higher-priority failure",
            details,
        );
        if let Err(e) = self.events.record(entry).await {
            tracing::error!(channel_id = %channel_id, error = %e, "Failed to record event");
        }
    }

    /// Error entry when every candidate failed (or none existed).
    async fn record_exhaustion(
        &self,
        channel_id: &ChannelId,
        last_failure: Option<&(SourceId, StreamError)>,
    ) {
        let mut details = EventDetails::for_channel(channel_id.clone())
            .with_reason(ReasonCode::AllStreamsExhausted);
        if let Some((from, _)) = last_failure {
            details = details.from_source(from.clone());
        }

        let entry = EventLogEntry::new(
            EventLevel::Error,
            EventCategory::Failover,
            "All upstream sources exhausted",
            details,
        );
        if let Err(e) = self.events.record(entry).await {
            tracing::error!(channel_id = %channel_id, error = %e, "Failed to record event");
        }
    }
}
