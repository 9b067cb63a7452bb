//! Active stream relay
//!
//! One relay per served request: a spawned task pumps upstream chunks into
//! a bounded channel the caller drains. While serving from a non-primary
//! source, a timer periodically dials the sources ranked ahead and swaps
//! the upstream in place when one answers — the caller sees an unbroken
//! byte stream either way. Dropping the handle cancels the task and any
//! in-flight upgrade dial.

use bytes::Bytes;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

use tunerd_core::config::FailoverConfig;
use tunerd_core::models::{
    ChannelId, EventCategory, EventDetails, EventLevel, EventLogEntry, ReasonCode,
};
use tunerd_core::store::EventSink;

use crate::error::{StreamError, StreamResult};
use crate::selector::{Candidate, Selection};
use crate::upstream::{UpstreamClient, UpstreamStream};

/// Byte stream handed to the caller. Dropping it tears down the relay
/// task, the upstream connection, and any pending upgrade dial.
pub struct RelayHandle {
    content_type: Option<String>,
    stream: ReceiverStream<StreamResult<Bytes>>,
    _cancel: DropGuard,
}

impl RelayHandle {
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl std::fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandle")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl futures::Stream for RelayHandle {
    type Item = StreamResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}

/// Spawn the relay task for a completed selection.
pub(crate) fn spawn_relay(
    channel_id: ChannelId,
    selection: Selection,
    client: Arc<dyn UpstreamClient>,
    events: Arc<dyn EventSink>,
    config: &FailoverConfig,
) -> RelayHandle {
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let content_type = selection.upstream.content_type.clone();

    let task = RelayTask {
        channel_id,
        client,
        events,
        tx,
        cancel,
        candidates: selection.candidates,
        serving: selection.serving,
        attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
        upgrade_window: Duration::from_secs(config.upgrade_window_secs),
    };
    tokio::spawn(task.run(selection.upstream));

    RelayHandle {
        content_type,
        stream: ReceiverStream::new(rx),
        _cancel: guard,
    }
}

struct RelayTask {
    channel_id: ChannelId,
    client: Arc<dyn UpstreamClient>,
    events: Arc<dyn EventSink>,
    tx: mpsc::Sender<StreamResult<Bytes>>,
    cancel: CancellationToken,
    candidates: Vec<Candidate>,
    serving: usize,
    attempt_timeout: Duration,
    upgrade_window: Duration,
}

impl RelayTask {
    async fn run(mut self, mut upstream: UpstreamStream) {
        // The upgrade timer only runs while something better exists. A
        // dial in flight reports back over its own channel so the relay
        // never blocks on it.
        let mut next_upgrade_at = self.upgrade_deadline();
        let (upgrade_tx, mut upgrade_rx) = mpsc::channel::<Option<(usize, UpstreamStream)>>(1);
        let mut dial: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,

                chunk = upstream.chunks.next() => match chunk {
                    Some(Ok(bytes)) => {
                        if self.tx.send(Ok(bytes)).await.is_err() {
                            // Caller disconnected
                            break;
                        }
                    }
                    Some(Err(failure)) => {
                        match self.redial_behind().await {
                            Some((rank, replacement)) => {
                                self.record_midstream_failover(rank, &failure).await;
                                self.serving = rank;
                                upstream = replacement;
                                next_upgrade_at = self.upgrade_deadline();
                            }
                            None => {
                                self.record_midstream_exhaustion(&failure).await;
                                break;
                            }
                        }
                    }
                    None => break,
                },

                () = sleep_until(next_upgrade_at.unwrap_or_else(Instant::now)),
                    if next_upgrade_at.is_some() && dial.is_none() =>
                {
                    next_upgrade_at = None;
                    dial = Some(self.spawn_upgrade_dial(upgrade_tx.clone()));
                }

                outcome = upgrade_rx.recv() => {
                    dial = None;
                    match outcome.flatten() {
                        Some((rank, replacement)) => {
                            self.record_upgrade(rank).await;
                            self.serving = rank;
                            upstream = replacement;
                            next_upgrade_at = self.upgrade_deadline();
                        }
                        // Upgrade failed; serving continues uninterrupted
                        // and the window restarts.
                        None => next_upgrade_at = self.upgrade_deadline(),
                    }
                }
            }
        }

        if let Some(handle) = dial {
            handle.abort();
        }
    }

    fn upgrade_deadline(&self) -> Option<Instant> {
        if self.serving == 0 {
            None
        } else {
            Some(Instant::now() + self.upgrade_window)
        }
    }

    /// Dial the candidates ranked ahead of the one presently serving,
    /// off the relay path so the in-flight stream is never stalled.
    fn spawn_upgrade_dial(
        &self,
        outcome_tx: mpsc::Sender<Option<(usize, UpstreamStream)>>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let ahead: Vec<Candidate> = self.candidates[..self.serving].to_vec();
        let attempt_timeout = self.attempt_timeout;

        tokio::spawn(async move {
            for candidate in &ahead {
                let attempt = timeout(
                    attempt_timeout,
                    client.open(&candidate.account, &candidate.source),
                )
                .await;
                if let Ok(Ok(upstream)) = attempt {
                    let _ = outcome_tx.send(Some((candidate.rank, upstream))).await;
                    return;
                }
            }
            let _ = outcome_tx.send(None).await;
        })
    }

    /// After a mid-transfer failure, try the candidates ranked behind the
    /// one that just failed.
    async fn redial_behind(&self) -> Option<(usize, UpstreamStream)> {
        for candidate in self.candidates.iter().skip(self.serving + 1) {
            let attempt = timeout(
                self.attempt_timeout,
                self.client.open(&candidate.account, &candidate.source),
            )
            .await;
            if let Ok(Ok(upstream)) = attempt {
                return Some((candidate.rank, upstream));
            }
        }
        None
    }

    async fn record_upgrade(&self, to_rank: usize) {
        let details = EventDetails::for_channel(self.channel_id.clone())
            .from_source(self.candidates[self.serving].source.id.clone())
            .to_source(self.candidates[to_rank].source.id.clone())
            .with_reason(ReasonCode::QualityUpgraded);

        self.record(EventLogEntry::new(
            EventLevel::Info,
            EventCategory::Failover,
            "Relay switched back to a higher-priority source",
            details,
        ))
        .await;
    }

    async fn record_midstream_failover(&self, to_rank: usize, failure: &StreamError) {
        let details = EventDetails::for_channel(self.channel_id.clone())
            .from_source(self.candidates[self.serving].source.id.clone())
            .to_source(self.candidates[to_rank].source.id.clone())
            .with_reason(failure.reason_code());

        self.record(EventLogEntry::new(
            EventLevel::Warn,
            EventCategory::Failover,
            "Relay failed over to a backup source mid-transfer",
            details,
        ))
        .await;
    }

    async fn record_midstream_exhaustion(&self, failure: &StreamError) {
        let details = EventDetails::for_channel(self.channel_id.clone())
            .from_source(self.candidates[self.serving].source.id.clone())
            .with_reason(ReasonCode::AllStreamsExhausted);

        tracing::warn!(
            channel_id = %self.channel_id,
            error = %failure,
            "Relay ended: no remaining candidate answered"
        );
        self.record(EventLogEntry::new(
            EventLevel::Error,
            EventCategory::Failover,
            "All upstream sources exhausted",
            details,
        ))
        .await;
    }

    async fn record(&self, entry: EventLogEntry) {
        if let Err(e) = self.events.record(entry).await {
            tracing::error!(channel_id = %self.channel_id, error = %e, "Failed to record event");
        }
    }
}
