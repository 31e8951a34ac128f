//! Tracing wrapper around any [`MessagingClient`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use super::{ChannelMetadata, ClientError, GroupMetadata, MessagingClient};

/// Wrapper that logs every external call with its elapsed time.
#[derive(Clone)]
pub struct TracedClient {
    inner: Arc<dyn MessagingClient>,
}

impl TracedClient {
    /// Wraps `inner`.
    pub fn new(inner: Arc<dyn MessagingClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MessagingClient for TracedClient {
    async fn is_ready(&self) -> bool {
        let ready = self.inner.is_ready().await;
        tracing::trace!(ready, "checked client readiness");
        ready
    }

    async fn fetch_channel_metadata(&self, target: &str) -> Result<ChannelMetadata, ClientError> {
        let span = tracing::debug_span!("client.channel_metadata", chat = target);

        let start = std::time::Instant::now();
        let result = self.inner.fetch_channel_metadata(target).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let _guard = span.enter();
        match &result {
            Ok(meta) => tracing::debug!(elapsed_ms, followers = meta.follower_count, "fetched"),
            Err(e) => tracing::warn!(elapsed_ms, error = %e, "metadata fetch failed"),
        }
        result
    }

    async fn fetch_group_metadata(&self, target: &str) -> Result<GroupMetadata, ClientError> {
        let span = tracing::debug_span!("client.group_metadata", chat = target);

        let start = std::time::Instant::now();
        let result = self.inner.fetch_group_metadata(target).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let _guard = span.enter();
        match &result {
            Ok(meta) => tracing::debug!(
                elapsed_ms,
                participants = meta.participant_count,
                capacity = ?meta.capacity,
                "fetched"
            ),
            Err(e) => tracing::warn!(elapsed_ms, error = %e, "metadata fetch failed"),
        }
        result
    }

    async fn follow_channel(&self, target: &str, recipient: &str) -> Result<(), ClientError> {
        let span = tracing::debug_span!("client.follow", chat = target, recipient);

        let start = std::time::Instant::now();
        let result = self.inner.follow_channel(target, recipient).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let _guard = span.enter();
        match &result {
            Ok(()) => tracing::debug!(elapsed_ms, "followed"),
            Err(e) => tracing::info!(elapsed_ms, error = %e, "follow rejected"),
        }
        result
    }

    async fn add_group_participant(&self, target: &str, recipient: &str) -> Result<(), ClientError> {
        let span = tracing::debug_span!("client.add_participant", chat = target, recipient);

        let start = std::time::Instant::now();
        let result = self.inner.add_group_participant(target, recipient).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let _guard = span.enter();
        match &result {
            Ok(()) => tracing::debug!(elapsed_ms, "added"),
            Err(e) => tracing::info!(elapsed_ms, error = %e, "add rejected"),
        }
        result
    }
}
