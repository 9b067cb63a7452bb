//! Stream request entry point
//!
//! The external HTTP-facing proxy layer calls [`StreamService::request_stream`]
//! with a channel id and forwards the resulting byte stream to its client.
//! Disabled channels are rejected before any selection work, and every
//! internal failure reaches the caller as an opaque unavailable outcome.

use std::sync::Arc;

use tunerd_core::config::FailoverConfig;
use tunerd_core::models::ChannelId;
use tunerd_core::store::{AccountDirectory, ChannelDirectory, EventSink, MappingStore, SourceCatalog};

use crate::error::{StreamError, StreamResult};
use crate::relay::{spawn_relay, RelayHandle};
use crate::selector::FailoverSelector;
use crate::upstream::UpstreamClient;

/// A live stream for one request
pub type StreamHandle = RelayHandle;

pub struct StreamService {
    channels: Arc<dyn ChannelDirectory>,
    selector: FailoverSelector,
}

impl StreamService {
    pub fn new(
        channels: Arc<dyn ChannelDirectory>,
        mappings: Arc<dyn MappingStore>,
        sources: Arc<dyn SourceCatalog>,
        accounts: Arc<dyn AccountDirectory>,
        events: Arc<dyn EventSink>,
        client: Arc<dyn UpstreamClient>,
        config: FailoverConfig,
    ) -> Self {
        let selector = FailoverSelector::new(mappings, sources, accounts, events, client, config);
        Self { channels, selector }
    }

    /// Serve one request for a channel.
    ///
    /// Returns a relay handle streaming the chosen source's bytes, or a
    /// failure carrying no internal detail. Failover between candidates
    /// and later quality upgrades happen behind the handle, invisible to
    /// the caller.
    pub async fn request_stream(&self, channel_id: &ChannelId) -> StreamResult<StreamHandle> {
        let channel = self
            .channels
            .get_channel(channel_id)
            .await
            .map_err(|e| {
                tracing::error!(channel_id = %channel_id, error = %e, "Channel lookup failed");
                StreamError::Unavailable
            })?
            .ok_or(StreamError::ChannelNotFound)?;

        if !channel.enabled {
            return Err(StreamError::ChannelDisabled);
        }

        let selection = self.selector.select(channel_id).await?;

        tracing::info!(
            channel_id = %channel_id,
            source_id = %selection.candidates[selection.serving].source.id,
            rank = selection.serving,
            "Serving channel stream"
        );

        Ok(spawn_relay(
            channel_id.clone(),
            selection,
            self.selector.client(),
            self.selector.events(),
            self.selector.config(),
        ))
    }
}
