//! Tracked, rate-limited boost runs against channels and groups.
//!
//! A boost drives a list of recipients at one target through an injected
//! [`client::MessagingClient`], one external call at a time with a fixed
//! delay between calls. Progress is recorded in an in-memory
//! [`core::store::OperationStore`] owned by a single-writer runtime loop and
//! can be polled or observed as [`runtime::events::BoostEvent`]s.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use boostlog::{
//!     client::{ChannelMetadata, ClientError, GroupMetadata, MessagingClient},
//!     config::TrackerConfig,
//!     runtime::handle::spawn_tracker,
//! };
//!
//! struct Connected;
//!
//! #[async_trait]
//! impl MessagingClient for Connected {
//!     async fn is_ready(&self) -> bool {
//!         true
//!     }
//!     async fn fetch_channel_metadata(&self, _: &str) -> Result<ChannelMetadata, ClientError> {
//!         Ok(ChannelMetadata { name: "news".into(), follower_count: 10 })
//!     }
//!     async fn fetch_group_metadata(&self, _: &str) -> Result<GroupMetadata, ClientError> {
//!         Ok(GroupMetadata { subject: "team".into(), participant_count: 3, capacity: None })
//!     }
//!     async fn follow_channel(&self, _: &str, _: &str) -> Result<(), ClientError> {
//!         Ok(())
//!     }
//!     async fn add_group_participant(&self, _: &str, _: &str) -> Result<(), ClientError> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let handle =
//!     spawn_tracker(Arc::new(Connected), None, TrackerConfig::default()).expect("config");
//! let id = handle
//!     .start_channel_boost(
//!         "https://whatsapp.com/channel/0029VaABC123",
//!         vec!["+15550001".to_string(), "+15550002".to_string()],
//!     )
//!     .await
//!     .expect("start");
//! let op = handle.get_operation(id).await.expect("get").expect("operation");
//! println!("{}: {}/{}", op.id, op.completed_count, op.total);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// External messaging client contract and tracing wrapper.
pub mod client;
/// Tracker configuration and TOML loading.
pub mod config;
/// Core in-memory operation store.
pub mod core;
/// Operation record, outcomes, and summaries.
pub mod operation;
/// Archive abstraction and SQLite implementation.
pub mod persist;
/// Request validation and target normalization.
pub mod request;
/// Single-writer runtime, driver loops, and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
