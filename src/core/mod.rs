//! Core in-memory state container.

/// Authoritative operation store.
pub mod store;
