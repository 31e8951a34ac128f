//! Contract for the external messaging client that performs protocol actions.

mod traced;

pub use traced::TracedClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by a [`MessagingClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The client is not connected or not yet paired.
    #[error("client not connected")]
    NotConnected,
    /// The connection dropped while a call was in flight.
    #[error("connection lost: {0}")]
    Disconnected(String),
    /// The target could not be resolved or read.
    #[error("target unreachable: {0}")]
    Unreachable(String),
    /// The network refused the action for this recipient.
    #[error("{0}")]
    Rejected(String),
    /// The call did not resolve within the configured bound.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl ClientError {
    /// Errors after which no further call on the connection can succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Disconnected(_))
    }

    /// True when the reason text reports a full group.
    pub fn indicates_full(&self) -> bool {
        let text = self.to_string().to_ascii_lowercase();
        text.contains("full") || text.contains("maximum")
    }
}

/// Channel (newsletter) metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMetadata {
    /// Display name.
    pub name: String,
    /// Current follower count.
    pub follower_count: u64,
}

/// Group metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    /// Group subject line.
    pub subject: String,
    /// Current participant count.
    pub participant_count: u32,
    /// Capacity reported by the network, when it reports one.
    pub capacity: Option<u32>,
}

impl GroupMetadata {
    /// Effective ceiling: the configured one, lowered by a reported capacity.
    pub fn ceiling(&self, configured: u32) -> u32 {
        self.capacity.map_or(configured, |reported| reported.min(configured))
    }

    /// True when no more participants fit under `configured`.
    pub fn is_full(&self, configured: u32) -> bool {
        self.participant_count >= self.ceiling(configured)
    }

    /// Free slots under `configured`.
    pub fn open_slots(&self, configured: u32) -> u32 {
        self.ceiling(configured).saturating_sub(self.participant_count)
    }
}

/// External client that talks to the messaging network.
///
/// Implementations own the connection; the tracker only issues one call at a
/// time and never subscribes to raw connection events.
#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    /// True when the connection is open and paired.
    async fn is_ready(&self) -> bool;

    /// Fetch metadata for a channel.
    async fn fetch_channel_metadata(&self, target: &str) -> Result<ChannelMetadata, ClientError>;

    /// Fetch metadata for a group.
    async fn fetch_group_metadata(&self, target: &str) -> Result<GroupMetadata, ClientError>;

    /// Make `recipient` follow the channel.
    async fn follow_channel(&self, target: &str, recipient: &str) -> Result<(), ClientError>;

    /// Add `recipient` to the group.
    async fn add_group_participant(&self, target: &str, recipient: &str) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullness_is_detected_from_reason_text() {
        assert!(ClientError::Rejected("Group is FULL".into()).indicates_full());
        assert!(ClientError::Rejected("maximum participants reached".into()).indicates_full());
        assert!(!ClientError::Rejected("not on network".into()).indicates_full());
    }

    #[test]
    fn reported_capacity_lowers_the_ceiling() {
        let meta = GroupMetadata {
            subject: "g".into(),
            participant_count: 250,
            capacity: Some(256),
        };
        assert_eq!(meta.ceiling(1024), 256);
        assert_eq!(meta.open_slots(1024), 6);
        assert!(!meta.is_full(1024));
        assert!(meta.is_full(200));
        assert_eq!(meta.open_slots(200), 0);
    }

    #[test]
    fn only_connection_errors_are_fatal() {
        assert!(ClientError::NotConnected.is_fatal());
        assert!(ClientError::Disconnected("socket closed".into()).is_fatal());
        assert!(!ClientError::Timeout(Duration::from_millis(5)).is_fatal());
        assert!(!ClientError::Rejected("privacy settings".into()).is_fatal());
    }
}
