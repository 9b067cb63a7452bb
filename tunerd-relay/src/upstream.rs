//! Upstream source client
//!
//! Opens one provider stream over HTTP and exposes it as a chunk stream.
//! The per-attempt and overall time budgets are enforced by the selector;
//! this client only applies a connect timeout and classifies failures.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;

use tunerd_core::models::{Account, Source};

use crate::error::{StreamError, StreamResult};

/// One opened upstream stream
pub struct UpstreamStream {
    pub content_type: Option<String>,
    pub chunks: BoxStream<'static, StreamResult<Bytes>>,
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Dials upstream sources. Behind a trait so tests can script connect
/// failures and hand-fed chunk streams.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn open(&self, account: &Account, source: &Source) -> StreamResult<UpstreamStream>;
}

/// Production client: plain HTTP GET against the provider account's base
/// URL, streaming the response body.
pub struct HttpUpstreamClient {
    client: reqwest::Client,
}

impl HttpUpstreamClient {
    pub fn new(connect_timeout: Duration) -> StreamResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StreamError::Connection(e.to_string()))?;
        Ok(Self { client })
    }

    /// Stream URL for a source within its owning account.
    fn stream_url(account: &Account, source: &Source) -> String {
        format!(
            "{}/stream/{}",
            account.base_url.trim_end_matches('/'),
            source.provider_stream_id
        )
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn open(&self, account: &Account, source: &Source) -> StreamResult<UpstreamStream> {
        let url = Self::stream_url(account, source);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StreamError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Http(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::Transfer(e.to_string())))
            .boxed();

        Ok(UpstreamStream {
            content_type,
            chunks,
        })
    }
}
